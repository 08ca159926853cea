//! Category prefixes derived from the record identifier

use crate::error::FilterError;
use crate::table::{CellValue, Column, Table};
use std::collections::BTreeSet;

/// Name of the identifier column
pub const ID_COLUMN: &str = "ID";

/// Name of the synthesized prefix column
pub const PREFIX_COLUMN: &str = "ID_prefix";

/// Sentinel choice that selects every row
pub const ALL_PREFIXES: &str = "All";

/// Uppercased first two alphabetic characters of an identifier.
///
/// Digits and separators are skipped wherever they occur, so the result has
/// fewer than two letters when the identifier does.
///
/// ```
/// use sv_core::extract_prefix;
///
/// assert_eq!(extract_prefix("1a2b3c"), "AB");
/// assert_eq!(extract_prefix("99"), "");
/// ```
pub fn extract_prefix(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_alphabetic())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

/// Add (or recompute) the `ID_prefix` column.
///
/// Tables without an `ID` column are returned unchanged. Missing IDs get a
/// missing prefix.
pub fn classify(table: &Table) -> Table {
    let Some(id_idx) = table.column_index(ID_COLUMN) else {
        return table.clone();
    };

    let mut classified = table.clone();
    let prefix_idx = match classified.column_index(PREFIX_COLUMN) {
        Some(idx) => idx,
        None => {
            classified.columns.push(Column::new(PREFIX_COLUMN));
            classified.columns.len() - 1
        }
    };

    for row in &mut classified.rows {
        let prefix = match row.get(id_idx).and_then(CellValue::as_text) {
            Some(id) => CellValue::String(extract_prefix(&id)),
            None => CellValue::Missing,
        };
        row.cells.resize(classified.columns.len(), CellValue::Missing);
        row.cells[prefix_idx] = prefix;
    }

    classified
}

/// Prefix choices for presentation: `All` followed by the sorted distinct
/// non-empty prefixes present in the table.
pub fn prefix_choices(table: &Table) -> Vec<String> {
    let mut choices = vec![ALL_PREFIXES.to_string()];

    if let Some(idx) = table.column_index(PREFIX_COLUMN) {
        let distinct: BTreeSet<String> = table
            .column_cells(idx)
            .filter_map(CellValue::as_text)
            .filter(|p| !p.is_empty())
            .collect();
        choices.extend(distinct);
    }

    choices
}

/// Keep rows whose `ID_prefix` equals the selection; `All` keeps everything
pub fn select_prefix(table: &Table, selected: &str) -> Result<Table, FilterError> {
    if selected == ALL_PREFIXES {
        return Ok(table.clone());
    }

    let idx = table
        .column_index(PREFIX_COLUMN)
        .ok_or_else(|| FilterError::UnknownColumn {
            column: PREFIX_COLUMN.to_string(),
        })?;

    let rows = table
        .rows
        .iter()
        .filter(|row| matches!(row.get(idx), Some(CellValue::String(p)) if p == selected))
        .cloned()
        .collect();

    Ok(table.with_rows(rows))
}
