//! Single-column substring row filter

use crate::error::FilterError;
use crate::table::{CellValue, Table};
use log::debug;

/// Filter column value that means "no column filter"
pub const NO_FILTER_COLUMN: &str = "None";

/// Keep rows whose `column` value contains `needle`, ignoring case.
///
/// An empty needle returns the table unchanged. Missing cells never match.
pub fn filter_rows(table: &Table, column: &str, needle: &str) -> Result<Table, FilterError> {
    if needle.is_empty() {
        return Ok(table.clone());
    }

    let idx = table
        .column_index(column)
        .ok_or_else(|| FilterError::UnknownColumn {
            column: column.to_string(),
        })?;

    let needle = needle.to_lowercase();
    let rows: Vec<_> = table
        .rows
        .iter()
        .filter(|row| row.get(idx).is_some_and(|cell| matches_cell(cell, &needle)))
        .cloned()
        .collect();

    debug!(
        "filter '{}' on column '{}' kept {} of {} rows",
        needle,
        column,
        rows.len(),
        table.row_count()
    );
    Ok(table.with_rows(rows))
}

/// Case-insensitive containment on the stringified cell; `needle` is lowercase
fn matches_cell(cell: &CellValue, needle: &str) -> bool {
    cell.as_text()
        .is_some_and(|text| text.to_lowercase().contains(needle))
}
