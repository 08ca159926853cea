//! Missing-value normalization

use crate::table::{CellValue, Table};
use log::debug;

/// Replace empty-string cells with missing in every text-like column.
///
/// A column is text-like when at least one of its cells is a string.
/// Numeric and boolean columns are returned untouched.
pub fn normalize(table: &Table) -> Table {
    let text_like: Vec<bool> = (0..table.column_count())
        .map(|idx| is_text_like(table, idx))
        .collect();

    let mut replaced = 0usize;
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            for (idx, cell) in row.cells.iter_mut().enumerate() {
                if text_like.get(idx).copied().unwrap_or(false) && cell.is_empty_text() {
                    *cell = CellValue::Missing;
                    replaced += 1;
                }
            }
            row
        })
        .collect();

    if replaced > 0 {
        debug!("normalized {} empty-string cell(s) to missing", replaced);
    }
    table.with_rows(rows)
}

/// Whether any cell in the column is a string
pub fn is_text_like(table: &Table, column: usize) -> bool {
    table
        .column_cells(column)
        .any(|c| matches!(c, CellValue::String(_)))
}
