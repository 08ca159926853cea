//! Core table types for representing loaded spreadsheet data

use serde::{Deserialize, Serialize};

static MISSING: CellValue = CellValue::Missing;

/// An in-memory table: named columns and position-aligned rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column definitions, in display order
    pub columns: Vec<Column>,
    /// Row data, each row holding one cell per column
    pub rows: Vec<Row>,
    /// Names of the sources the rows were loaded from
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Table {
    /// Create an empty table with the given column names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names.into_iter().map(Column::new).collect(),
            rows: Vec::new(),
            sources: Vec::new(),
        }
    }

    /// Build a table with the same columns and sources but different rows
    pub fn with_rows(&self, rows: Vec<Row>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
            sources: self.sources.clone(),
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All column names, in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get a cell by row position and column name
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Iterate over the cells of one column
    pub fn column_cells(&self, index: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows
            .iter()
            .map(move |r| r.get(index).unwrap_or(&MISSING))
    }

    /// Append a row, padding or truncating it to the column count
    pub fn push_row(&mut self, mut row: Row) {
        row.cells.resize(self.columns.len(), CellValue::Missing);
        self.rows.push(row);
    }
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name (e.g., "ID" or "Region")
    pub name: String,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A row of data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Cell values for each column
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }
}

/// A cell value with type detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// String value, possibly empty
    String(String),
    /// Absent value, distinct from the empty string
    Missing,
}

impl CellValue {
    /// Parse a raw text field into a CellValue, detecting the type.
    ///
    /// An empty field is missing; whitespace around numbers and booleans is
    /// ignored, while text keeps its original spelling.
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return CellValue::Missing;
        }

        let trimmed = s.trim();

        // Try parsing as integer first
        if let Ok(i) = trimmed.parse::<i64>() {
            return CellValue::Integer(i);
        }

        // Try parsing as float; "nan"/"inf" spellings stay text
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return CellValue::Float(f);
            }
        }

        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Boolean(false);
        }

        CellValue::String(s.to_string())
    }

    /// Text cell helper
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::String(s.into())
    }

    /// Check if the cell is missing
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Check if the cell is an empty string (not missing)
    pub fn is_empty_text(&self) -> bool {
        matches!(self, CellValue::String(s) if s.is_empty())
    }

    /// Stringified value, or None when missing
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Missing => None,
            other => Some(other.to_string_value()),
        }
    }

    /// Convert to a display string; missing renders as empty
    pub fn to_string_value(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{}", i),
            // whole floats keep their decimal point
            CellValue::Float(fl) if fl.is_finite() && fl.fract() == 0.0 => {
                write!(f, "{:.1}", fl)
            }
            CellValue::Float(fl) => write!(f, "{}", fl),
            CellValue::Boolean(b) => write!(f, "{}", b),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Missing => write!(f, ""),
        }
    }
}
