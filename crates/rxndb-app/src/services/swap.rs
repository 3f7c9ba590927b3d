//! Promotion of a finished build store onto the live path.
//!
//! Steps run in a fixed order: merge the build's WAL into its main file,
//! checkpoint the live WAL, drop live sidecars, move the live file to its
//! backup, rename the build file onto the live path and drop the build's
//! sidecars. The backup rename finishes before the promote rename starts.
//! Both renames retry while another process holds the file.
//!
//! Callers must make sure nothing writes to the live store during a swap.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::config::AppConfig;
use crate::paths::{default_backup_path, shm_path, wal_path};
use crate::services::retry::{RetryError, RetryPolicy, retry};
use crate::store::{FileOpError, is_in_use, remove_store_files};

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("build store `{0}` does not exist")]
    MissingBuild(PathBuf),
    #[error("build store `{path}` could not be checkpointed: {source}")]
    BuildCheckpoint {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error(
        "build store `{path}` has a write-ahead log still held by another connection; close it and retry"
    )]
    BuildBusy { path: PathBuf },
    #[error("failed to clear stale backup: {0}")]
    StaleBackup(#[source] FileOpError),
    #[error(
        "failed to move `{live}` to backup `{backup}` after {attempts} attempts; it appears to be in use by another process: {source}"
    )]
    BackupBlocked {
        live: PathBuf,
        backup: PathBuf,
        attempts: usize,
        #[source]
        source: io::Error,
    },
    #[error(
        "failed to move build `{build}` onto live `{live}` after {attempts} attempts; close any process using the database and retry: {source}"
    )]
    PromoteBlocked {
        build: PathBuf,
        live: PathBuf,
        attempts: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to rename `{from}` to `{to}`: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Builder)]
pub struct SwapOptions {
    #[builder(default = true)]
    pub backup: bool,
    /// Backup location; defaults to the live path with a `.bak` extension.
    #[builder(into)]
    pub backup_path: Option<PathBuf>,
    #[builder(default = RetryPolicy::new(15, Duration::from_millis(250)))]
    pub retry: RetryPolicy,
}

impl SwapOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            backup: config.swap.backup,
            backup_path: Some(config.backup_path()),
            retry: config.swap.rename_retry(),
        }
    }
}

/// What a completed swap did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReport {
    pub live: PathBuf,
    /// Where the previous live store went, if it was backed up.
    pub backup: Option<PathBuf>,
    pub checkpointed: bool,
}

/// Replace `live` with `build`.
pub fn swap_into_place(
    build: &Path,
    live: &Path,
    options: &SwapOptions,
) -> Result<SwapReport, SwapError> {
    if !build.is_file() {
        return Err(SwapError::MissingBuild(build.to_path_buf()));
    }

    match wal_checkpoint(build) {
        Ok(true) => {}
        Ok(false) => return Err(SwapError::BuildBusy { path: build.to_path_buf() }),
        Err(source) => {
            return Err(SwapError::BuildCheckpoint {
                path: build.to_path_buf(),
                source,
            });
        }
    }

    let checkpointed = checkpoint_live(live);
    for sidecar in [wal_path(live), shm_path(live)] {
        remove_best_effort(&sidecar);
    }

    let mut backup = None;
    if options.backup && live.exists() {
        let target = options
            .backup_path
            .clone()
            .unwrap_or_else(|| default_backup_path(live));
        remove_store_files(&target, options.retry).map_err(SwapError::StaleBackup)?;
        rename_retrying(live, &target, options.retry).map_err(|err| match err {
            RetryError::Exhausted { attempts, last } => SwapError::BackupBlocked {
                live: live.to_path_buf(),
                backup: target.clone(),
                attempts,
                source: last,
            },
            RetryError::Fatal(source) => SwapError::Rename {
                from: live.to_path_buf(),
                to: target.clone(),
                source,
            },
        })?;
        tracing::info!(live = %live.display(), backup = %target.display(), "backed up live store");
        backup = Some(target);
    }

    rename_retrying(build, live, options.retry).map_err(|err| match err {
        RetryError::Exhausted { attempts, last } => SwapError::PromoteBlocked {
            build: build.to_path_buf(),
            live: live.to_path_buf(),
            attempts,
            source: last,
        },
        RetryError::Fatal(source) => SwapError::Rename {
            from: build.to_path_buf(),
            to: live.to_path_buf(),
            source,
        },
    })?;
    tracing::info!(build = %build.display(), live = %live.display(), "promoted build store");
    for sidecar in [wal_path(build), shm_path(build)] {
        remove_best_effort(&sidecar);
    }

    Ok(SwapReport {
        live: live.to_path_buf(),
        backup,
        checkpointed,
    })
}

/// Merge a store's WAL into its main file and truncate the log. Returns
/// `false` when another connection kept the checkpoint from completing.
/// Never creates the store.
fn wal_checkpoint(path: &Path) -> Result<bool, rusqlite::Error> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
    let busy: i64 = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| row.get(0))?;
    Ok(busy == 0)
}

/// Best-effort checkpoint of the live store, if there is one.
fn checkpoint_live(live: &Path) -> bool {
    if !live.is_file() {
        return false;
    }
    match wal_checkpoint(live) {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(live = %live.display(), "wal checkpoint was blocked by a reader");
            false
        }
        Err(err) => {
            tracing::warn!(live = %live.display(), error = %err, "wal checkpoint failed");
            false
        }
    }
}

fn remove_best_effort(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "could not remove file"),
    }
}

fn rename_retrying(from: &Path, to: &Path, policy: RetryPolicy) -> Result<(), RetryError<io::Error>> {
    retry(policy, || fs::rename(from, to), is_in_use)
}
