//! Export tables as downloadable byte buffers

use crate::error::Result;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output formats for an exported table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Single-sheet CSV with a header row; missing cells are empty
    #[default]
    Csv,
    /// Pretty-printed JSON of the whole table
    Json,
}

impl ExportFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!(
                "unknown format '{}', supported formats: csv, json",
                other
            )),
        }
    }
}

/// Export a table in the given format
pub fn export_table(table: &Table, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => export_csv(table),
        ExportFormat::Json => export_json(table),
    }
}

/// Encode a table as CSV: header row, then rows in table order
pub fn export_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(table.columns.iter().map(|c| c.name.as_str()))
        .map_err(std::io::Error::from)?;

    for row in &table.rows {
        let values = (0..table.column_count())
            .map(|i| row.get(i).map(|c| c.to_string_value()).unwrap_or_default());
        writer
            .write_record(values)
            .map_err(std::io::Error::from)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(bytes)
}

/// Encode a table as pretty-printed JSON
pub fn export_json(table: &Table) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(table)?)
}
