//! sv-core: Core library for querying and merging spreadsheet tables
//!
//! This library provides functionality to:
//! - Load CSV and spreadsheet sources into one in-memory table
//! - Normalize empty strings to a single missing marker
//! - Derive category prefixes from the `ID` column and select by them
//! - Filter rows by a case-insensitive substring on one column
//! - Merge an old and a latest table keyed by `ID` under a conflict policy
//! - Export tables back to CSV or JSON bytes

pub mod error;
pub mod export;
pub mod filter;
pub mod loader;
pub mod merger;
pub mod normalize;
pub mod prefix;
pub mod session;
pub mod table;

pub use error::{Error, FilterError, LoadError, MergeError, MergeSide, Result};
pub use export::{export_csv, export_json, export_table, ExportFormat};
pub use filter::{filter_rows, NO_FILTER_COLUMN};
pub use loader::{
    concat_tables, load_directory, load_sources, parse_csv_str, parse_source,
    read_directory_sources, LoaderConfig, Source, SourceFormat,
};
pub use merger::{merge_tables, resolve, CellSource, MergePolicy, MergeResult, MergeStats};
pub use normalize::normalize;
pub use prefix::{
    classify, extract_prefix, prefix_choices, select_prefix, ALL_PREFIXES, ID_COLUMN,
    PREFIX_COLUMN,
};
pub use session::{
    merge_loaded, merge_view, query_table, query_view, MergeConfig, MergeView, QueryConfig,
    QueryView, SessionConfig,
};
pub use table::{CellValue, Column, Row, Table};
