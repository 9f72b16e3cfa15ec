use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::filter::FilterCommandOptions;
use crate::commands::group::GroupGenerateOptions;
use crate::commands::index::IndexOptions;
use crate::commands::map::MapOptions;
use crate::commands::{self, CommandReport};
use crate::env_loader;
use crate::logging;
use crate::migrate::filter::FilterOptions;
use crate::migrate::matcher::MappingKind;
use crate::migrate::paths::resolve_paths;

#[derive(Debug, Parser)]
#[command(
    name = "cdm-migrate",
    version,
    about = "Index exported collection records and reconcile them with files on disk"
)]
pub struct Cli {
    /// Project directory (defaults to CDM_MIGRATE_PROJECT, then the current directory)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log at debug level unless CDM_MIGRATE_LOG or RUST_LOG is set
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load exported records into the index
    Index {
        /// Replace an existing index
        #[arg(long)]
        force: bool,
    },
    /// Delete the index
    IndexRemove,
    /// Write the group mapping for one index field
    GroupGenerate {
        #[arg(long)]
        field: String,
        #[arg(long)]
        force: bool,
    },
    /// Create grouped works from the group mapping
    GroupSync,
    /// Keep only the records selected on one field
    Filter(FilterArgs),
    /// Match index records to files and write a mapping
    Map(MapArgs),
    /// Show project progress
    Status,
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    #[arg(long)]
    pub field: String,
    /// Keep records whose value is one of these
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,
    /// Remove records whose value is one of these
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    #[arg(long)]
    pub include_range_start: Option<String>,
    #[arg(long)]
    pub include_range_end: Option<String>,
    #[arg(long)]
    pub exclude_range_start: Option<String>,
    #[arg(long)]
    pub exclude_range_end: Option<String>,
    /// Report the remaining count without changing the index
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    #[arg(value_enum)]
    pub kind: MappingKind,
    /// Directory holding the candidate files
    #[arg(long)]
    pub base_path: Option<PathBuf>,
    /// Index field supplying the matching value
    #[arg(long = "field")]
    pub export_field: Option<String>,
    /// Capture pattern applied to the field value
    #[arg(long)]
    pub field_pattern: Option<String>,
    /// Expected filename built from the pattern's captures, e.g. `$1.pdf`
    #[arg(long)]
    pub filename_template: Option<String>,
    /// Glob over paths relative to the base path, e.g. `**/*.tif`
    #[arg(long)]
    pub path_pattern: Option<String>,
    /// Compare filenames case-insensitively
    #[arg(long)]
    pub lower: bool,
    /// Merge into the existing mapping
    #[arg(long)]
    pub update: bool,
    /// Overwrite the existing mapping, or with --update replace resolved rows
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dry_run: bool,
    /// Write one empty row per eligible record
    #[arg(long, conflicts_with_all = ["base_path", "field_pattern", "filename_template"])]
    pub blank: bool,
}

impl From<FilterArgs> for FilterCommandOptions {
    fn from(args: FilterArgs) -> Self {
        Self {
            filter: FilterOptions {
                field: args.field,
                include: args.include,
                exclude: args.exclude,
                include_range_start: args.include_range_start,
                include_range_end: args.include_range_end,
                exclude_range_start: args.exclude_range_start,
                exclude_range_end: args.exclude_range_end,
            },
            dry_run: args.dry_run,
        }
    }
}

impl From<MapArgs> for MapOptions {
    fn from(args: MapArgs) -> Self {
        Self {
            kind: args.kind,
            base_path: args.base_path,
            export_field: args.export_field,
            field_pattern: args.field_pattern,
            filename_template: args.filename_template,
            path_pattern: args.path_pattern,
            lowercase: args.lower,
            update: args.update,
            force: args.force,
            dry_run: args.dry_run,
            blank: args.blank,
        }
    }
}

fn render(report: &CommandReport, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }
    let mut lines = vec![format!("command={}", report.command), format!("ok={}", report.ok)];
    lines.extend(report.details.iter().cloned());
    lines.extend(report.issues.iter().map(|issue| format!("issue: {issue}")));
    Ok(lines.join("\n"))
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    env_loader::load_dotenv(cli.project.as_deref());
    logging::init(cli.verbose);

    let paths = resolve_paths(cli.project.as_deref())?;
    let report = match cli.command {
        Command::Index { force } => commands::index::run(&paths, &IndexOptions { force })?,
        Command::IndexRemove => commands::index::run_remove(&paths)?,
        Command::GroupGenerate { field, force } => {
            commands::group::run_generate(&paths, &GroupGenerateOptions { field, force })?
        }
        Command::GroupSync => commands::group::run_sync(&paths)?,
        Command::Filter(args) => commands::filter::run(&paths, &args.into())?,
        Command::Map(args) => commands::map::run(&paths, &args.into())?,
        Command::Status => commands::status::run(&paths)?,
    };

    println!("{}", render(&report, cli.json)?);
    if !report.ok {
        bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
