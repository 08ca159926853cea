//! Table loader: turns uploaded CSV and spreadsheet byte sources into one table

use crate::error::{LoadError, Result};
use crate::table::{CellValue, Row, Table};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use walkdir::WalkDir;

/// Spreadsheet extensions handled by calamine
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Format used for date-time cells read from spreadsheets
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A named, in-memory byte source (an uploaded file)
#[derive(Debug, Clone)]
pub struct Source {
    /// File name or path the bytes came from
    pub name: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

impl Source {
    /// Create a new source
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a source from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| LoadError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::new(path.to_string_lossy(), bytes))
    }

    /// Detect how this source should be parsed
    pub fn format(&self) -> SourceFormat {
        SourceFormat::detect(&self.name, &self.bytes)
    }
}

/// Tabular file formats understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    /// Choose a format from the file extension, falling back to magic bytes
    pub fn detect(name: &str, bytes: &[u8]) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if ext == "csv" {
            return SourceFormat::Csv;
        }
        if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
            return SourceFormat::Spreadsheet;
        }

        // ZIP container (xlsx, ods) or OLE compound file (xls)
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            SourceFormat::Spreadsheet
        } else {
            SourceFormat::Csv
        }
    }
}

/// Loader settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// When set, only sources whose name starts with this prefix are accepted
    pub allowed_prefix: Option<String>,
}

impl LoaderConfig {
    /// Reject a source whose name is outside the allowed prefix
    pub fn check(&self, source: &Source) -> std::result::Result<(), LoadError> {
        match &self.allowed_prefix {
            Some(prefix) if !source.name.starts_with(prefix.as_str()) => {
                Err(LoadError::DisallowedSource {
                    source_name: source.name.clone(),
                    prefix: prefix.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Load one or more sources into a single table.
///
/// Rows are concatenated in source order over the union of all column names.
pub fn load_sources(sources: &[Source], config: &LoaderConfig) -> Result<Table> {
    if sources.is_empty() {
        return Err(LoadError::NoSources.into());
    }

    let mut tables = Vec::with_capacity(sources.len());
    for source in sources {
        config.check(source)?;
        tables.push(parse_source(source)?);
    }

    let table = concat_tables(tables);
    info!(
        "loaded {} rows x {} columns from {} source(s)",
        table.row_count(),
        table.column_count(),
        sources.len()
    );
    Ok(table)
}

/// Parse a single source, dispatching on its format
pub fn parse_source(source: &Source) -> Result<Table> {
    let table = match source.format() {
        SourceFormat::Csv => parse_csv_bytes(&source.bytes, &source.name)?,
        SourceFormat::Spreadsheet => parse_spreadsheet_bytes(&source.bytes, &source.name)?,
    };
    debug!(
        "parsed '{}': {} rows x {} columns",
        source.name,
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

/// Parse CSV bytes into a Table
pub fn parse_csv_bytes(bytes: &[u8], source_name: &str) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // Allow varying number of fields
        .from_reader(bytes);

    let csv_error = |e: csv::Error| LoadError::Csv {
        source_name: source_name.to_string(),
        source: e,
    };

    let headers = csv_reader.headers().map_err(csv_error)?;
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(LoadError::NoColumns {
            source_name: source_name.to_string(),
        }
        .into());
    }

    let names = unique_column_names(headers.iter().map(str::to_string));
    let mut table = Table::new(names);
    table.sources.push(source_name.to_string());

    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(csv_error)?;
        let cells: Vec<CellValue> = record.iter().map(CellValue::parse).collect();
        push_checked(&mut table, cells, row_idx, source_name);
    }

    Ok(table)
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str) -> Result<Table> {
    parse_csv_bytes(content.as_bytes(), source_name)
}

/// Parse the first worksheet of a workbook into a Table.
///
/// The first row of the sheet is the header row.
pub fn parse_spreadsheet_bytes(bytes: &[u8], source_name: &str) -> Result<Table> {
    let spreadsheet_error = |message: String| LoadError::Spreadsheet {
        source_name: source_name.to_string(),
        message,
    };

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| spreadsheet_error(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::NoWorksheet {
            source_name: source_name.to_string(),
        })?
        .map_err(|e| spreadsheet_error(e.to_string()))?;

    let mut sheet_rows = range.rows();
    let header = sheet_rows.next().ok_or_else(|| LoadError::NoColumns {
        source_name: source_name.to_string(),
    })?;

    let names = unique_column_names(
        header
            .iter()
            .map(|c| spreadsheet_cell(c).to_string_value()),
    );
    let mut table = Table::new(names);
    table.sources.push(source_name.to_string());

    for (row_idx, sheet_row) in sheet_rows.enumerate() {
        let cells: Vec<CellValue> = sheet_row.iter().map(spreadsheet_cell).collect();
        push_checked(&mut table, cells, row_idx, source_name);
    }

    Ok(table)
}

/// Convert a calamine cell into a CellValue
fn spreadsheet_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Missing,
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) => whole_float(*f),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::String(s) if s.is_empty() => CellValue::Missing,
        Data::String(s) => CellValue::String(s.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => CellValue::String(format_datetime(dt)),
            None => CellValue::String(cell.to_string()),
        },
        Data::DurationIso(s) => CellValue::String(s.clone()),
    }
}

fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Whole-number floats become integers, matching what CSV parsing yields
fn whole_float(f: f64) -> CellValue {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        CellValue::Integer(f as i64)
    } else {
        CellValue::Float(f)
    }
}

/// Push a parsed row, padding short rows and truncating long ones
fn push_checked(table: &mut Table, cells: Vec<CellValue>, row_idx: usize, source_name: &str) {
    if cells.len() > table.column_count() {
        warn!(
            "row {} in {} has more cells than columns, truncating",
            row_idx + 1,
            source_name
        );
    }
    table.push_row(Row::new(cells));
}

/// Make header names unique and non-empty.
///
/// Blank headers become `Unnamed: <index>`; repeats get `.1`, `.2`, ...
fn unique_column_names<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut names = Vec::new();

    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name
        };

        let mut candidate = base.clone();
        while seen.contains(&candidate) {
            let n = counts.entry(base.clone()).or_insert(0);
            *n += 1;
            candidate = format!("{}.{}", base, n);
        }

        seen.insert(candidate.clone());
        names.push(candidate);
    }

    names
}

/// Concatenate tables row-wise over the union of their columns.
///
/// Columns appear in first-seen order; cells a source lacks are missing.
pub fn concat_tables(tables: Vec<Table>) -> Table {
    // Build unified column list (union of all columns)
    let mut column_names: Vec<String> = Vec::new();
    let mut seen_columns: HashSet<String> = HashSet::new();

    for table in &tables {
        for col in &table.columns {
            if seen_columns.insert(col.name.clone()) {
                column_names.push(col.name.clone());
            }
        }
    }

    let mut merged = Table::new(column_names);

    for table in tables {
        // Unified position -> position in this table
        let mapping: Vec<Option<usize>> = merged
            .columns
            .iter()
            .map(|c| table.column_index(&c.name))
            .collect();

        for row in table.rows {
            let cells = mapping
                .iter()
                .map(|idx| {
                    idx.and_then(|i| row.get(i).cloned())
                        .unwrap_or(CellValue::Missing)
                })
                .collect();
            merged.rows.push(Row::new(cells));
        }

        merged.sources.extend(table.sources);
    }

    merged
}

/// Read every CSV or spreadsheet file directly inside a folder.
///
/// Files are returned sorted by name; subfolders are not visited.
pub fn read_directory_sources<P: AsRef<Path>>(dir: P) -> Result<Vec<Source>> {
    let mut sources = Vec::new();

    for entry in WalkDir::new(dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(LoadError::WalkDir)?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_tabular_file(path) {
            continue;
        }
        sources.push(Source::from_path(path)?);
    }

    debug!(
        "found {} tabular file(s) in {}",
        sources.len(),
        dir.as_ref().display()
    );
    Ok(sources)
}

/// Load every tabular file in a folder into a single table
pub fn load_directory<P: AsRef<Path>>(dir: P, config: &LoaderConfig) -> Result<Table> {
    let sources = read_directory_sources(dir)?;
    load_sources(&sources, config)
}

fn is_tabular_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| e == "csv" || SPREADSHEET_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_parse_simple_csv() {
        let csv = "ID,Name,Value\nAB1,foo,100\nCD2,bar,200\n";
        let table = parse_csv_str(csv, "test.csv").unwrap();

        assert_eq!(table.column_names(), vec!["ID", "Name", "Value"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "ID"), Some(&CellValue::text("AB1")));
        assert_eq!(table.cell(1, "Value"), Some(&CellValue::Integer(200)));
        assert_eq!(table.sources, vec!["test.csv".to_string()]);
    }

    #[test]
    fn test_parse_with_empty_cells() {
        let csv = "ID,Name,Value\n1,,100\n2,bar,\n";
        let table = parse_csv_str(csv, "test.csv").unwrap();

        assert_eq!(table.rows[0].cells[1], CellValue::Missing);
        assert_eq!(table.rows[1].cells[2], CellValue::Missing);
    }

    #[test]
    fn test_parse_ragged_rows() {
        let csv = "ID,Name,Value\n1,foo\n2,bar,200,extra\n";
        let table = parse_csv_str(csv, "test.csv").unwrap();

        assert_eq!(table.rows[0].cells.len(), 3);
        assert_eq!(table.rows[0].cells[2], CellValue::Missing);
        assert_eq!(table.rows[1].cells.len(), 3);
        assert_eq!(table.rows[1].cells[2], CellValue::Integer(200));
    }

    #[test]
    fn test_header_names_made_unique() {
        let csv = "ID,Name,Name,,Name\n1,a,b,c,d\n";
        let table = parse_csv_str(csv, "test.csv").unwrap();

        assert_eq!(
            table.column_names(),
            vec!["ID", "Name", "Name.1", "Unnamed: 3", "Name.2"]
        );
    }

    #[test]
    fn test_empty_csv_is_load_error() {
        let result = parse_csv_str("", "empty.csv");
        assert!(matches!(
            result,
            Err(Error::Load(LoadError::NoColumns { .. }))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_load_error() {
        let bytes = b"ID,Name\n1,\xff\xfe\n";
        let result = parse_csv_bytes(bytes, "bad.csv");
        assert!(matches!(result, Err(Error::Load(LoadError::Csv { .. }))));
    }

    #[test]
    fn test_corrupt_spreadsheet_is_load_error() {
        let source = Source::new("broken.xlsx", b"PK\x03\x04 definitely not a zip".to_vec());
        let result = parse_source(&source);
        assert!(matches!(
            result,
            Err(Error::Load(LoadError::Spreadsheet { .. }))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SourceFormat::detect("a.CSV", b"PK\x03\x04"), SourceFormat::Csv);
        assert_eq!(SourceFormat::detect("a.xlsx", b""), SourceFormat::Spreadsheet);
        assert_eq!(SourceFormat::detect("a.xls", b""), SourceFormat::Spreadsheet);
        assert_eq!(
            SourceFormat::detect("upload", &[0xD0, 0xCF, 0x11, 0xE0, 0xA1]),
            SourceFormat::Spreadsheet
        );
        assert_eq!(SourceFormat::detect("upload", b"ID,Name\n"), SourceFormat::Csv);
    }

    #[test]
    fn test_whole_float_becomes_integer() {
        assert_eq!(whole_float(12.0), CellValue::Integer(12));
        assert_eq!(whole_float(1.5), CellValue::Float(1.5));
        assert_eq!(spreadsheet_cell(&Data::Empty), CellValue::Missing);
        assert_eq!(
            spreadsheet_cell(&Data::String("x".to_string())),
            CellValue::text("x")
        );
    }

    #[test]
    fn test_empty_spreadsheet_string_is_missing() {
        use crate::merger::{merge_tables, MergePolicy};

        assert_eq!(
            spreadsheet_cell(&Data::String(String::new())),
            CellValue::Missing
        );

        let mut old = Table::new(["ID", "A"]);
        old.push_row(Row::new(vec![CellValue::Integer(1), CellValue::text("x")]));
        let mut latest = Table::new(["ID", "A"]);
        latest.push_row(Row::new(
            [Data::Int(1), Data::String(String::new())]
                .iter()
                .map(spreadsheet_cell)
                .collect(),
        ));

        let result = merge_tables(&old, &latest, MergePolicy::PreserveExisting).unwrap();
        assert_eq!(result.table.cell(0, "A"), Some(&CellValue::text("x")));
    }

    #[test]
    fn test_datetime_rendering() {
        let dt = NaiveDateTime::parse_from_str("2024-03-05 14:30:00", DATETIME_FORMAT).unwrap();
        assert_eq!(format_datetime(dt), "2024-03-05 14:30:00");
    }

    #[test]
    fn test_load_no_sources() {
        let result = load_sources(&[], &LoaderConfig::default());
        assert!(matches!(result, Err(Error::Load(LoadError::NoSources))));
    }

    #[test]
    fn test_load_concatenates_with_column_union() {
        let sources = vec![
            Source::new("a.csv", "ID,Name\nAB1,foo\n"),
            Source::new("b.csv", "ID,Extra\nCD2,bonus\n"),
        ];
        let table = load_sources(&sources, &LoaderConfig::default()).unwrap();

        assert_eq!(table.column_names(), vec!["ID", "Name", "Extra"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "Extra"), Some(&CellValue::Missing));
        assert_eq!(table.cell(1, "Name"), Some(&CellValue::Missing));
        assert_eq!(table.cell(1, "Extra"), Some(&CellValue::text("bonus")));
        assert_eq!(table.sources, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_allowed_prefix_guard() {
        let config = LoaderConfig {
            allowed_prefix: Some("shared/reports".to_string()),
        };
        let ok = Source::new("shared/reports/q1.csv", "ID\nAB1\n");
        let rejected = Source::new("home/q1.csv", "ID\nAB1\n");

        assert!(load_sources(&[ok.clone()], &config).is_ok());
        let result = load_sources(&[ok, rejected], &config);
        assert!(matches!(
            result,
            Err(Error::Load(LoadError::DisallowedSource { .. }))
        ));
    }

    #[test]
    fn test_load_directory_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "ID,Name\nCD2,bar\n").unwrap();
        fs::write(dir.path().join("a.csv"), "ID,Name\nAB1,foo\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.csv"), "ID\nEF3\n").unwrap();

        let table = load_directory(dir.path(), &LoaderConfig::default()).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, "ID"), Some(&CellValue::text("AB1")));
        assert_eq!(table.cell(1, "ID"), Some(&CellValue::text("CD2")));
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_directory(dir.path(), &LoaderConfig::default());
        assert!(matches!(result, Err(Error::Load(LoadError::NoSources))));
    }
}
