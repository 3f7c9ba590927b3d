//! In-place rebuild of a store from collected build tasks.
//!
//! A run moves through Open, Clear, Import, Reindex and Summary exactly once.
//! Store corruption found while opening or clearing replaces the store with a
//! fresh file instead of failing the run; per-task failures are reported and
//! skipped.

use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;
use rusqlite::Connection;
use thiserror::Error;

use crate::config::AppConfig;
use crate::constants::{CLEAR_ORDER, DEFAULT_BATCH_SIZE, FTS_TABLE};
use crate::ingestion::{BuildTask, Collection};
use crate::services::events::{ProgressSink, RebuildEvent, TaskStage};
use crate::services::retry::{RetryError, RetryPolicy, retry};
use crate::store::{
    FileOpError, SourceImporter, StoreCounts, StoreError, TabularImporter, is_corruption,
    is_locked, open_with_busy_timeout, remove_store_files, set_validated_by_source,
    source_identity,
};

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("failed to open store `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error(
        "table `{table}` in `{path}` is still locked after {attempts} attempts; close other connections to the store and retry"
    )]
    Locked {
        path: PathBuf,
        table: &'static str,
        attempts: usize,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to clear table `{table}` in `{path}`: {source}")]
    Clear {
        path: PathBuf,
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("could not recreate corrupted store: {0}")]
    Recreate(#[source] FileOpError),
    #[error("failed to read final row counts: {0}")]
    Summary(#[source] StoreError),
}

/// Everything a rebuild run needs; nothing is read from the environment.
#[derive(Debug, Clone, Builder)]
pub struct RebuildOptions {
    #[builder(into)]
    pub store_path: PathBuf,
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    #[builder(default = Duration::from_millis(5_000))]
    pub busy_timeout: Duration,
    #[builder(default = RetryPolicy::new(5, Duration::from_millis(300)))]
    pub clear_retry: RetryPolicy,
    #[builder(default = RetryPolicy::new(10, Duration::from_millis(200)))]
    pub delete_retry: RetryPolicy,
}

impl RebuildOptions {
    /// Options for rebuilding the store at `store_path` with configured limits.
    pub fn from_config(config: &AppConfig, store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            batch_size: config.rebuild.batch_size,
            busy_timeout: config.rebuild.busy_timeout(),
            clear_retry: config.rebuild.clear_retry(),
            delete_retry: config.rebuild.delete_retry(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub tasks: usize,
    pub failed: usize,
    pub batches: usize,
    pub rows_imported: usize,
    pub validation_updates: usize,
    pub recreated: bool,
    pub counts: StoreCounts,
}

/// Drives a rebuild of one store file.
#[derive(Debug, Clone)]
pub struct Rebuilder<I = TabularImporter> {
    options: RebuildOptions,
    importer: I,
}

impl Rebuilder<TabularImporter> {
    pub fn new(options: RebuildOptions) -> Self {
        Self::with_importer(options, TabularImporter)
    }
}

impl<I: SourceImporter> Rebuilder<I> {
    pub fn with_importer(options: RebuildOptions, importer: I) -> Self {
        Self { options, importer }
    }

    pub fn options(&self) -> &RebuildOptions {
        &self.options
    }

    /// Report collector issues, then rebuild from the collected tasks.
    pub fn rebuild<S: ProgressSink>(
        &self,
        collection: Collection,
        sink: &mut S,
    ) -> Result<RebuildSummary, RebuildError> {
        for issue in collection.issues {
            sink.emit(RebuildEvent::Collector(issue));
        }
        self.run(&collection.tasks, sink)
    }

    /// Rebuild the store from `tasks`.
    pub fn run<S: ProgressSink>(
        &self,
        tasks: &[BuildTask],
        sink: &mut S,
    ) -> Result<RebuildSummary, RebuildError> {
        let mut summary = RebuildSummary {
            tasks: tasks.len(),
            ..RebuildSummary::default()
        };

        let (mut conn, recreated) = self.open(sink)?;
        summary.recreated = recreated;

        if tasks.is_empty() {
            sink.emit(RebuildEvent::NothingToImport);
            summary.counts = StoreCounts::load(&conn).map_err(RebuildError::Summary)?;
            return Ok(summary);
        }

        if let Err(err) = self.clear(&conn) {
            match err {
                RebuildError::Clear { ref source, .. } if is_corruption(source) => {
                    let reason = source.to_string();
                    drop(conn);
                    conn = self.recreate(reason, sink)?;
                    summary.recreated = true;
                }
                other => return Err(other),
            }
        }

        let batch_size = self.options.batch_size.max(1);
        let total = tasks.len();
        sink.emit(RebuildEvent::Started {
            total,
            batches: total.div_ceil(batch_size),
            batch_size,
        });

        let mut processed = 0usize;
        for batch in tasks.chunks(batch_size) {
            let mut imported = 0usize;
            let mut validation_updates = 0usize;
            for task in batch {
                match self.process(&mut conn, task, sink) {
                    Some((rows, updated)) => {
                        imported += rows;
                        validation_updates += updated;
                    }
                    None => summary.failed += 1,
                }
            }
            processed += batch.len();
            summary.batches += 1;
            summary.rows_imported += imported;
            summary.validation_updates += validation_updates;
            sink.emit(RebuildEvent::BatchCompleted {
                processed,
                total,
                imported,
                validation_updates,
            });
        }

        match reindex(&conn) {
            Ok(()) => sink.emit(RebuildEvent::IndexRebuilt),
            Err(err) => sink.emit(RebuildEvent::IndexRebuildFailed {
                message: err.to_string(),
            }),
        }

        summary.counts = StoreCounts::load(&conn).map_err(RebuildError::Summary)?;
        sink.emit(RebuildEvent::Finished {
            reactions: summary.counts.reactions,
            measurements: summary.counts.measurements,
        });
        Ok(summary)
    }

    /// Import one task and stamp its validation record. `None` when the import
    /// failed; validation failures still count the imported rows.
    fn process<S: ProgressSink>(
        &self,
        conn: &mut Connection,
        task: &BuildTask,
        sink: &mut S,
    ) -> Option<(usize, usize)> {
        let outcome = match self.importer.import(conn, &task.source, task.collection) {
            Ok(outcome) => outcome,
            Err(err) => {
                sink.emit(RebuildEvent::TaskFailed {
                    stage: TaskStage::Import,
                    collection: task.collection,
                    source: task.source.clone(),
                    message: err.to_string(),
                });
                return None;
            }
        };

        let record = &task.record;
        let updated = match set_validated_by_source(
            conn,
            &source_identity(&task.source),
            record.validated,
            record.by.as_deref(),
            record.at.as_deref(),
        ) {
            Ok(0) if record.validated => {
                sink.emit(RebuildEvent::NoRowsValidated {
                    collection: task.collection,
                    source: task.source.clone(),
                });
                0
            }
            Ok(updated) => updated,
            Err(err) => {
                sink.emit(RebuildEvent::TaskFailed {
                    stage: TaskStage::Validate,
                    collection: task.collection,
                    source: task.source.clone(),
                    message: err.to_string(),
                });
                0
            }
        };
        Some((outcome.rows, updated))
    }

    fn open<S: ProgressSink>(&self, sink: &mut S) -> Result<(Connection, bool), RebuildError> {
        let path = &self.options.store_path;
        match open_with_busy_timeout(path, self.options.busy_timeout) {
            Ok(conn) => Ok((conn, false)),
            Err(err) if err.is_corruption() => {
                let conn = self.recreate(err.to_string(), sink)?;
                Ok((conn, true))
            }
            Err(source) => Err(RebuildError::Open {
                path: path.clone(),
                source,
            }),
        }
    }

    fn recreate<S: ProgressSink>(
        &self,
        reason: String,
        sink: &mut S,
    ) -> Result<Connection, RebuildError> {
        let path = &self.options.store_path;
        sink.emit(RebuildEvent::StoreCorrupted {
            path: path.clone(),
            reason,
        });
        remove_store_files(path, self.options.delete_retry).map_err(RebuildError::Recreate)?;
        open_with_busy_timeout(path, self.options.busy_timeout).map_err(|source| {
            RebuildError::Open {
                path: path.clone(),
                source,
            }
        })
    }

    fn clear(&self, conn: &Connection) -> Result<(), RebuildError> {
        for table in CLEAR_ORDER {
            retry(self.options.clear_retry, || clear_table(conn, table), is_locked).map_err(
                |err| match err {
                    RetryError::Exhausted { attempts, last } => RebuildError::Locked {
                        path: self.options.store_path.clone(),
                        table,
                        attempts,
                        source: last,
                    },
                    RetryError::Fatal(source) => RebuildError::Clear {
                        path: self.options.store_path.clone(),
                        table,
                        source,
                    },
                },
            )?;
            tracing::debug!(table, "cleared table");
        }
        Ok(())
    }
}

fn clear_table(conn: &Connection, table: &str) -> Result<usize, rusqlite::Error> {
    if table == FTS_TABLE {
        conn.execute(
            &format!("INSERT INTO {FTS_TABLE}({FTS_TABLE}) VALUES('delete-all')"),
            [],
        )
    } else {
        conn.execute(&format!("DELETE FROM {table}"), [])
    }
}

fn reindex(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        &format!("INSERT INTO {FTS_TABLE}({FTS_TABLE}) VALUES('rebuild')"),
        [],
    )?;
    Ok(())
}
