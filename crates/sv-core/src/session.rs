//! Interaction-scoped configuration and the query/merge pipelines
//!
//! Each pipeline call is a pure function of the supplied sources and a
//! [`SessionConfig`]; nothing is kept between calls.

use crate::error::{Error, Result};
use crate::export::export_csv;
use crate::filter::{filter_rows, NO_FILTER_COLUMN};
use crate::loader::{load_sources, LoaderConfig, Source};
use crate::merger::{merge_tables, MergePolicy, MergeResult};
use crate::normalize::normalize;
use crate::prefix::{classify, prefix_choices, select_prefix, ALL_PREFIXES};
use crate::table::Table;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Query view selections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Selected category prefix, or `All`
    pub prefix: String,
    /// Column to filter on, or `None` for no filtering
    pub filter_column: String,
    /// Substring to look for; empty disables the filter
    pub filter_text: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            prefix: ALL_PREFIXES.to_string(),
            filter_column: NO_FILTER_COLUMN.to_string(),
            filter_text: String::new(),
        }
    }
}

impl QueryConfig {
    /// Whether the column filter does anything
    pub fn filter_active(&self) -> bool {
        self.filter_column != NO_FILTER_COLUMN && !self.filter_text.is_empty()
    }
}

/// Merge view selections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Let missing values in latest overwrite old values
    pub replace_with_empty: bool,
}

impl MergeConfig {
    pub fn policy(&self) -> MergePolicy {
        MergePolicy::from_flag(self.replace_with_empty)
    }
}

/// All settings for one interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub loader: LoaderConfig,
    pub query: QueryConfig,
    pub merge: MergeConfig,
}

impl SessionConfig {
    /// Load a config file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the config file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// What the query view renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryView {
    /// Rows left after prefix selection and column filter
    pub table: Table,
    /// `All` followed by the prefixes found in the loaded data
    pub prefix_choices: Vec<String>,
}

/// What the merge view renders
#[derive(Debug, Clone)]
pub struct MergeView {
    pub merged: MergeResult,
    /// CSV bytes of the merged table
    pub download: Vec<u8>,
}

/// Load, normalize, classify and filter uploaded sources
pub fn query_view(sources: &[Source], config: &SessionConfig) -> Result<QueryView> {
    let table = load_sources(sources, &config.loader)?;
    query_table(&table, &config.query)
}

/// Run the query pipeline over an already loaded table
pub fn query_table(table: &Table, query: &QueryConfig) -> Result<QueryView> {
    let classified = classify(&normalize(table));
    let prefix_choices = prefix_choices(&classified);

    let mut view = select_prefix(&classified, &query.prefix)?;
    if query.filter_active() {
        view = filter_rows(&view, &query.filter_column, &query.filter_text)?;
    }

    debug!(
        "query view: prefix '{}', {} of {} rows",
        query.prefix,
        view.row_count(),
        classified.row_count()
    );
    Ok(QueryView {
        table: view,
        prefix_choices,
    })
}

/// Load old and latest sources, merge them and prepare the download
pub fn merge_view(old: &Source, latest: &Source, config: &SessionConfig) -> Result<MergeView> {
    let old = load_sources(std::slice::from_ref(old), &config.loader)?;
    let latest = load_sources(std::slice::from_ref(latest), &config.loader)?;
    merge_loaded(&old, &latest, &config.merge)
}

/// Merge two loaded tables and export the result
pub fn merge_loaded(old: &Table, latest: &Table, merge: &MergeConfig) -> Result<MergeView> {
    let merged = merge_tables(old, latest, merge.policy())?;
    let download = export_csv(&merged.table)?;
    Ok(MergeView { merged, download })
}
