//! SQLite-backed reaction store: schema, import, validation and file handling.

pub mod canonical;
pub mod files;
pub mod importer;
pub mod query;
pub mod schema;
pub mod validation;

use std::path::Path;

use rusqlite::ErrorCode;
use thiserror::Error;

pub use files::{FileOpError, is_in_use, remove_store_files};
pub use importer::{ImportError, ImportOutcome, SourceImporter, TabularImporter};
pub use query::{
    MeasurementRow, ReactionDetail, ReactionRow, StoreCounts, count_rows,
    reaction_with_measurements, search_reactions,
};
pub use schema::{connect, ensure_schema, open_or_create, open_with_busy_timeout};
pub use validation::set_validated_by_source;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unknown table `{0}`")]
    UnknownTable(String),
}

impl StoreError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Sqlite(err) if is_corruption(err))
    }
}

/// True for `SQLITE_BUSY`/`SQLITE_LOCKED` ("database is locked").
pub fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// True when SQLite reports a malformed file or damaged page.
pub fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
    )
}

/// Identity under which rows remember the source file they came from.
///
/// Separators are normalized so a path recorded on one platform still
/// addresses the same rows on another.
pub fn source_identity(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn garbage_file_is_classified_as_corruption() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("reactions.db");
        fs::write(&path, vec![0x5a_u8; 8192]).expect("write garbage");
        let err = open_or_create(&path).expect_err("garbage is not a database");
        assert!(err.is_corruption(), "unexpected error {err:?}");
        assert!(!matches!(&err, StoreError::Sqlite(inner) if is_locked(inner)));
    }

    #[test]
    fn source_identity_uses_forward_slashes() {
        assert_eq!(
            source_identity(Path::new(r"C:\data\table5\x.csv")),
            "C:/data/table5/x.csv"
        );
    }
}
