use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;

use crate::cli::validators::{validate_batch_size, validate_table_no};

/// Top-level namespace for store maintenance commands.
#[derive(Debug, Args)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommands,
}

/// Store maintenance subcommands.
#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Clear the live store and re-import every validated source in place.
    Rebuild(DbRebuildArgs),
    /// Build a fresh store at the build path without touching the live store.
    Build(DbBuildArgs),
    /// Promote a finished build store onto the live path.
    Swap(DbSwapArgs),
    /// Show row counts of the live store.
    Stats,
    /// Full-text search over reactions in the live store.
    Search(DbSearchArgs),
}

/// Arguments for `db rebuild`.
#[derive(Debug, Args)]
pub struct DbRebuildArgs {
    /// Build tasks processed between progress reports (1..=10000).
    #[arg(long = "batch-size", value_parser = validate_batch_size)]
    pub batch_size: Option<usize>,
}

/// Arguments for `db build`.
#[derive(Debug, Args)]
pub struct DbBuildArgs {
    /// Output store path (defaults to the configured build path).
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
    /// Build tasks processed between progress reports (1..=10000).
    #[arg(long = "batch-size", value_parser = validate_batch_size)]
    pub batch_size: Option<usize>,
}

/// Arguments for `db swap`.
#[derive(Debug, Args)]
pub struct DbSwapArgs {
    /// Build store to promote (defaults to the configured build path).
    #[arg(long, value_name = "PATH")]
    pub from: Option<PathBuf>,
    /// Skip moving the previous live store to the backup path.
    #[arg(long = "no-backup", action = ArgAction::SetTrue)]
    pub no_backup: bool,
}

/// Arguments for `db search`.
#[derive(Debug, Args)]
pub struct DbSearchArgs {
    /// FTS5 query string.
    pub query: String,
    /// Restrict hits to one collection id (e.g. `5`).
    #[arg(long, value_parser = validate_table_no)]
    pub table: Option<u32>,
    /// Maximum number of hits.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    /// Include measurements for every hit.
    #[arg(long, action = ArgAction::SetTrue)]
    pub details: bool,
    /// Pretty-print JSON output.
    #[arg(long, action = ArgAction::SetTrue)]
    pub pretty: bool,
}
