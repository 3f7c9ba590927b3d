//! Application-level error type shared by the binary and services.

use std::path::PathBuf;

use thiserror::Error;

use crate::config;
use crate::ingestion::LedgerError;
use crate::paths::PathError;
use crate::services::{BuildError, RebuildError, SwapError};
use crate::store::{FileOpError, ImportError, StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Files(#[from] FileOpError),
    #[error(transparent)]
    Rebuild(#[from] RebuildError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Swap(#[from] SwapError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store `{path}` does not exist")]
    MissingStore { path: PathBuf },
}
