//! Cross-cutting application constants.

/// Number of build tasks processed between progress reports.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Largest batch size accepted from the CLI.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Collections managed when no configuration overrides them.
pub const DEFAULT_COLLECTIONS: [&str; 5] = ["table5", "table6", "table7", "table8", "table9"];

/// Prefix stripped from a collection name to derive its numeric id.
pub const COLLECTION_PREFIX: &str = "table";

/// Primary extension tried when resolving a ledger entry to its source file.
pub const PRIMARY_SOURCE_EXT: &str = "csv";

/// Fallback extension tried when the primary source file is absent.
pub const FALLBACK_SOURCE_EXT: &str = "tsv";

/// Ledger file name inside a collection's image directory.
pub const LEDGER_FILE: &str = "validation_db.json";

/// Default live store file name.
pub const DEFAULT_LIVE_DB: &str = "reactions.db";

/// Default offline build file name.
pub const DEFAULT_BUILD_DB: &str = "reactions_build.db";

/// Managed tables in the order the rebuild clears them.
pub const CLEAR_ORDER: [&str; 4] = ["measurements", "reactions_fts", "reactions", "references_map"];

/// Full-text shadow table over reaction names, formulas and notes.
pub const FTS_TABLE: &str = "reactions_fts";

/// Number of columns in a tabular source row.
pub const SOURCE_COLUMNS: usize = 7;

/// Human-readable category of each known collection.
pub fn table_category(table_no: u32) -> String {
    match table_no {
        5 => "water radiolysis radicals".to_string(),
        6 => "solvated electron".to_string(),
        7 => "hydrogen atom (H•)".to_string(),
        8 => "hydroxyl radical (OH•)".to_string(),
        9 => "oxide/superoxide (O•−)".to_string(),
        other => other.to_string(),
    }
}
