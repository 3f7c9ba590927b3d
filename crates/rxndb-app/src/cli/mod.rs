use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

pub mod db;
pub mod validators;

pub use db::{DbArgs, DbBuildArgs, DbCommands, DbRebuildArgs, DbSearchArgs, DbSwapArgs};
pub use validators::{validate_batch_size, validate_table_no};

/// Top-level CLI entry point.
#[derive(Debug, Default, Parser)]
#[command(
    name = "rxndb",
    version,
    author,
    about = "Rebuild, build and swap the reaction kinetics store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List build tasks and skipped entries from the validation ledgers.
    Sources(SourcesArgs),
    /// Store maintenance: rebuild, offline build, swap, stats, search.
    Db(DbArgs),
}

/// Arguments for `sources`.
#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Emit one JSON object per task instead of text.
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rebuild_with_batch_size() {
        let cli = Cli::try_parse_from(["rxndb", "-vv", "db", "rebuild", "--batch-size", "2"])
            .expect("parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Db(DbArgs {
                command: DbCommands::Rebuild(args),
            })) => assert_eq!(args.batch_size, Some(2)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_batch_size() {
        let err = Cli::try_parse_from(["rxndb", "db", "rebuild", "--batch-size", "0"])
            .expect_err("zero rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn swap_flags() {
        let cli = Cli::try_parse_from(["rxndb", "db", "swap", "--from", "/tmp/b.db", "--no-backup"])
            .expect("parse");
        match cli.command {
            Some(Commands::Db(DbArgs {
                command: DbCommands::Swap(args),
            })) => {
                assert!(args.no_backup);
                assert_eq!(args.from.as_deref(), Some(std::path::Path::new("/tmp/b.db")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
