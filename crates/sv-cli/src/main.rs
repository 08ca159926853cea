//! Sheet Viewer CLI
//!
//! Command-line shell for querying and merging spreadsheet tables.

use clap::{Args, Parser, Subcommand};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use sv_core::{
    export_table, load_sources, merge_loaded, query_table, read_directory_sources, CellSource,
    ExportFormat, SessionConfig, Source, Table,
};

#[derive(Parser)]
#[command(name = "sv-cli")]
#[command(about = "Spreadsheet query and merge tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load files, then filter by ID prefix and column substring
    Query {
        /// Spreadsheet or CSV files to load
        #[arg(short, long)]
        file: Vec<PathBuf>,

        /// Load every spreadsheet or CSV file in this folder
        #[arg(short, long)]
        dir: Option<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,

        /// ID prefix to select ("All" for every row)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Column to filter on ("None" for no filtering)
        #[arg(short, long)]
        column: Option<String>,

        /// Case-insensitive text the column must contain
        #[arg(short, long)]
        text: Option<String>,

        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only list the available ID prefixes
        #[arg(long)]
        list_prefixes: bool,
    },

    /// Merge a latest table into an old one, keyed by ID
    Merge {
        #[command(flatten)]
        inputs: MergeArgs,

        /// Output file path; prints the table when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (csv or json)
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Explain which input a merged cell came from
    Explain {
        #[command(flatten)]
        inputs: MergeArgs,

        /// Row ID
        #[arg(long)]
        id: String,

        /// Column name
        #[arg(long)]
        col: String,
    },

    /// Write a config file with default settings
    InitConfig {
        /// Output path for the config file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct SettingsArgs {
    /// Session config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only accept files whose path starts with this prefix
    #[arg(long)]
    allowed_prefix: Option<String>,
}

#[derive(Args)]
struct MergeArgs {
    /// The old version of the table
    #[arg(long)]
    old: PathBuf,

    /// The latest version of the table
    #[arg(long)]
    latest: PathBuf,

    /// Let empty cells in latest overwrite old values
    #[arg(long)]
    replace_with_empty: bool,

    #[command(flatten)]
    settings: SettingsArgs,
}

impl SettingsArgs {
    /// Config file (or defaults) with command-line overrides applied
    fn session(&self) -> sv_core::Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };
        if let Some(prefix) = &self.allowed_prefix {
            config.loader.allowed_prefix = Some(prefix.clone());
        }
        Ok(config)
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> sv_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            file,
            dir,
            settings,
            prefix,
            column,
            text,
            limit,
            list_prefixes,
        } => {
            let mut config = settings.session()?;
            if let Some(prefix) = prefix {
                config.query.prefix = prefix;
            }
            if let Some(column) = column {
                config.query.filter_column = column;
            }
            if let Some(text) = text {
                config.query.filter_text = text;
            }
            cmd_query(&file, dir.as_deref(), &config, limit, list_prefixes)
        }
        Commands::Merge {
            inputs,
            output,
            format,
            limit,
        } => cmd_merge(&inputs, output.as_deref(), format, limit),
        Commands::Explain { inputs, id, col } => cmd_explain(&inputs, &id, &col),
        Commands::InitConfig { output } => cmd_init_config(&output),
    }
}

fn cmd_query(
    files: &[PathBuf],
    dir: Option<&Path>,
    config: &SessionConfig,
    limit: Option<usize>,
    list_prefixes: bool,
) -> sv_core::Result<()> {
    let mut sources = Vec::new();
    if let Some(dir) = dir {
        sources.extend(read_directory_sources(dir)?);
    }
    for file in files {
        sources.push(Source::from_path(file)?);
    }

    let table = load_sources(&sources, &config.loader)?;
    let view = query_table(&table, &config.query)?;

    if list_prefixes {
        println!("Prefixes ({}):", view.prefix_choices.len());
        for choice in &view.prefix_choices {
            println!("  {}", choice);
        }
        return Ok(());
    }

    println!(
        "Prefix: {}  Column: {}  Text: '{}'",
        config.query.prefix, config.query.filter_column, config.query.filter_text
    );
    println!();
    print_table(&view.table, limit);

    Ok(())
}

/// Load both merge inputs and merge them under the selected policy
fn merge_inputs(inputs: &MergeArgs) -> sv_core::Result<sv_core::MergeView> {
    let mut config = inputs.settings.session()?;
    if inputs.replace_with_empty {
        config.merge.replace_with_empty = true;
    }

    let old = load_sources(&[Source::from_path(&inputs.old)?], &config.loader)?;
    let latest = load_sources(&[Source::from_path(&inputs.latest)?], &config.loader)?;
    merge_loaded(&old, &latest, &config.merge)
}

fn cmd_merge(
    inputs: &MergeArgs,
    output: Option<&Path>,
    format: ExportFormat,
    limit: Option<usize>,
) -> sv_core::Result<()> {
    let view = merge_inputs(inputs)?;
    let stats = &view.merged.stats;

    println!(
        "Merged {} rows: {} matched, {} added from latest, {} kept from old",
        view.merged.table.row_count(),
        stats.matched,
        stats.added,
        stats.retained
    );
    if stats.duplicate_ids > 0 {
        println!("Dropped {} duplicate ID row(s)", stats.duplicate_ids);
    }

    match output {
        Some(path) => {
            let bytes = match format {
                ExportFormat::Csv => view.download,
                other => export_table(&view.merged.table, other)?,
            };
            fs::write(path, bytes)?;
            info!("wrote {} export to {}", format.extension(), path.display());
            println!("Exported {} rows to {}", view.merged.table.row_count(), path.display());
        }
        None => {
            println!();
            print_table(&view.merged.table, limit);
        }
    }

    Ok(())
}

fn cmd_explain(inputs: &MergeArgs, id: &str, col: &str) -> sv_core::Result<()> {
    let view = merge_inputs(inputs)?;
    let merged = &view.merged;

    if merged.table.find_column(col).is_none() {
        return Err(sv_core::FilterError::UnknownColumn {
            column: col.to_string(),
        }
        .into());
    }

    let Some(row) = merged.find_row(id) else {
        println!("ID '{}' is not in either table", id);
        return Ok(());
    };

    let value = merged
        .table
        .cell(row, col)
        .map(|c| c.to_string_value())
        .unwrap_or_default();
    let source = match merged.source_of(row, col) {
        Some(CellSource::Old) => inputs.old.display().to_string(),
        Some(CellSource::Latest) => inputs.latest.display().to_string(),
        Some(CellSource::Absent) | None => "(neither input)".to_string(),
    };

    println!("Row ID: {}", id);
    println!("Column: {}", col);
    println!();
    println!("Value: {}", value);
    println!("Source: {}", source);

    Ok(())
}

fn cmd_init_config(output: &Path) -> sv_core::Result<()> {
    SessionConfig::default().save(output)?;
    println!("Created config file: {}", output.display());
    println!();
    println!("Edit the file to set your defaults, then run:");
    println!("  sv-cli query --config {} --file <path>", output.display());

    Ok(())
}

/// Print a table as tab-separated text
fn print_table(table: &Table, limit: Option<usize>) {
    let header = table.column_names();
    println!("{}", header.join("\t"));
    println!("{}", "-".repeat(header.len() * 12));

    let row_limit = limit.unwrap_or(table.row_count());
    for row in table.rows.iter().take(row_limit) {
        let values: Vec<String> = row.cells.iter().map(|c| c.to_string_value()).collect();
        println!("{}", values.join("\t"));
    }

    if table.row_count() > row_limit {
        println!("... ({} more rows)", table.row_count() - row_limit);
    }
}
