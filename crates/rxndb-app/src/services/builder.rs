//! Offline build of a fresh store next to the live one.

use std::path::Path;

use thiserror::Error;

use crate::ingestion::Collection;
use crate::services::events::ProgressSink;
use crate::services::rebuild::{RebuildError, RebuildOptions, RebuildSummary, Rebuilder};
use crate::store::{FileOpError, SourceImporter, TabularImporter, remove_store_files};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("could not remove stale build store: {0}")]
    Stale(#[source] FileOpError),
    #[error(transparent)]
    Rebuild(#[from] RebuildError),
}

/// Builds a complete store at `options.store_path`, never touching the live
/// store. The build path either ends up fully populated or absent.
#[derive(Debug, Clone)]
pub struct OfflineBuilder<I = TabularImporter> {
    rebuilder: Rebuilder<I>,
}

impl OfflineBuilder<TabularImporter> {
    pub fn new(options: RebuildOptions) -> Self {
        Self {
            rebuilder: Rebuilder::new(options),
        }
    }
}

impl<I: SourceImporter> OfflineBuilder<I> {
    pub fn with_importer(options: RebuildOptions, importer: I) -> Self {
        Self {
            rebuilder: Rebuilder::with_importer(options, importer),
        }
    }

    pub fn build_path(&self) -> &Path {
        &self.rebuilder.options().store_path
    }

    pub fn build<S: ProgressSink>(
        &self,
        collection: Collection,
        sink: &mut S,
    ) -> Result<RebuildSummary, BuildError> {
        let path = self.build_path();
        let delete_retry = self.rebuilder.options().delete_retry;
        remove_store_files(path, delete_retry).map_err(BuildError::Stale)?;
        tracing::info!(path = %path.display(), "building store offline");

        match self.rebuilder.rebuild(collection, sink) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                if let Err(cleanup) = remove_store_files(path, delete_retry) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "failed to remove partial build store"
                    );
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{BuildTask, ValidationRecord};
    use crate::paths::wal_path;
    use crate::services::retry::RetryPolicy;
    use crate::store::open_or_create;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn options(path: &Path) -> RebuildOptions {
        RebuildOptions::builder()
            .store_path(path)
            .busy_timeout(Duration::from_millis(20))
            .clear_retry(RetryPolicy::new(2, Duration::from_millis(1)))
            .delete_retry(RetryPolicy::new(2, Duration::from_millis(1)))
            .build()
    }

    fn collection(dir: &Path) -> Collection {
        let source = dir.join("a.csv");
        fs::write(&source, "1\tx\tA -> B\t\t1.0\t\t\n").expect("source");
        Collection {
            tasks: vec![BuildTask {
                collection: 5,
                source,
                record: ValidationRecord::unattributed(true),
            }],
            issues: Vec::new(),
        }
    }

    #[test]
    fn stale_build_files_are_replaced() {
        let temp = TempDir::new().expect("temp dir");
        let build = temp.path().join("reactions_build.db");
        fs::write(&build, b"stale bytes").expect("stale build");
        fs::write(wal_path(&build), b"stale wal").expect("stale wal");

        let summary = OfflineBuilder::new(options(&build))
            .build(collection(temp.path()), &mut Vec::new())
            .expect("build");
        assert!(!summary.recreated);
        assert_eq!(summary.counts.reactions, 1);
    }

    #[test]
    fn build_does_not_touch_live_store() {
        let temp = TempDir::new().expect("temp dir");
        let live = temp.path().join("reactions.db");
        fs::write(&live, b"live bytes").expect("live");
        let build = temp.path().join("reactions_build.db");

        OfflineBuilder::new(options(&build))
            .build(collection(temp.path()), &mut Vec::new())
            .expect("build");
        assert_eq!(fs::read(&live).expect("live"), b"live bytes");
        let conn = open_or_create(&build).expect("open build");
        let reactions: i64 = conn
            .query_row("SELECT COUNT(*) FROM reactions", [], |r| r.get(0))
            .expect("count");
        assert_eq!(reactions, 1);
    }

    /// Imports nothing and drops a managed table so the final count fails.
    struct SabotagingImporter;

    impl SourceImporter for SabotagingImporter {
        fn import(
            &self,
            conn: &mut rusqlite::Connection,
            _source: &Path,
            _collection: u32,
        ) -> Result<crate::store::ImportOutcome, crate::store::ImportError> {
            conn.execute_batch("DROP TABLE measurements")?;
            Ok(crate::store::ImportOutcome::default())
        }
    }

    #[test]
    fn failed_build_leaves_no_partial_file() {
        let temp = TempDir::new().expect("temp dir");
        let build = temp.path().join("reactions_build.db");

        let err = OfflineBuilder::with_importer(options(&build), SabotagingImporter)
            .build(collection(temp.path()), &mut Vec::new())
            .expect_err("summary fails");
        assert!(matches!(err, BuildError::Rebuild(RebuildError::Summary(_))));
        assert!(!build.exists());
        assert!(!wal_path(&build).exists());
    }
}
