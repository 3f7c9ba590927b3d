//! File-level operations on a store and its `-wal`/`-shm` sidecars.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::paths::store_family;
use crate::services::retry::{RetryError, RetryPolicy, retry};

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error(
        "could not remove `{path}` after {attempts} attempts; close any process using the database and retry: {source}"
    )]
    RemoveBlocked {
        path: PathBuf,
        attempts: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove `{path}`: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// True when the error means another process still holds the file.
///
/// Covers `PermissionDenied` as well as the Windows sharing (32) and lock (33)
/// violations, which surface with other error kinds.
pub fn is_in_use(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied || matches!(err.raw_os_error(), Some(32 | 33))
}

/// Remove a single file, retrying while it is in use. A missing file is not
/// an error.
pub fn remove_file_retrying(path: &Path, policy: RetryPolicy) -> Result<(), FileOpError> {
    let result = retry(
        policy,
        || match fs::remove_file(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
        is_in_use,
    );

    result.map_err(|err| match err {
        RetryError::Exhausted { attempts, last } => FileOpError::RemoveBlocked {
            path: path.to_path_buf(),
            attempts,
            source: last,
        },
        RetryError::Fatal(source) => FileOpError::Remove {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Remove the store file and both sidecars, each with lock retries.
pub fn remove_store_files(db: &Path, policy: RetryPolicy) -> Result<(), FileOpError> {
    for path in store_family(db) {
        remove_file_retrying(&path, policy)?;
        tracing::trace!(path = %path.display(), "removed store file");
    }
    Ok(())
}
