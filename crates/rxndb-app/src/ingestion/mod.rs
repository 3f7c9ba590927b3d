//! Modules that read validation ledgers and tabular source files.

pub mod collector;
pub mod ledger;
pub mod tabular;

pub use collector::{BuildTask, Collection, CollectorIssue, collect_sources, resolve_source};
pub use ledger::{LedgerEntry, LedgerError, LedgerValue, ValidationRecord};
pub use tabular::{SourceRow, parse_rows};
