//! Error types for sv-core

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sv-core
#[derive(Debug, Error)]
pub enum Error {
    /// A source could not be turned into a table
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A row filter referenced something the table does not have
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Merge inputs did not satisfy the merge precondition
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while loading tabular sources
#[derive(Debug, Error)]
pub enum LoadError {
    /// Nothing to load
    #[error("no sources were supplied")]
    NoSources,

    /// Failed to read a file from disk
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{source_name}': {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    /// The workbook could not be opened or read
    #[error("failed to read spreadsheet '{source_name}': {message}")]
    Spreadsheet {
        source_name: String,
        message: String,
    },

    /// Workbook without a single worksheet
    #[error("spreadsheet '{source_name}' has no worksheets")]
    NoWorksheet { source_name: String },

    /// Header row missing or empty
    #[error("no columns found in '{source_name}'")]
    NoColumns { source_name: String },

    /// Source name rejected by the configured path prefix
    #[error("'{source_name}' is not under the allowed path '{prefix}'")]
    DisallowedSource { source_name: String, prefix: String },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),
}

/// Errors raised by the row filter
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },
}

/// Errors raised by the merge engine
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("the {side} table has no 'ID' column")]
    MissingIdColumn { side: MergeSide },
}

/// Which merge input an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    Old,
    Latest,
}

impl fmt::Display for MergeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeSide::Old => write!(f, "old"),
            MergeSide::Latest => write!(f, "latest"),
        }
    }
}
