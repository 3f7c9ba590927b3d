//! Filesystem path helpers for collection directories and store files.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{COLLECTION_PREFIX, LEDGER_FILE};

#[derive(Debug, Error)]
pub enum PathError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Container providing the data layout for all collections, rooted at the
/// configured `data.base_dir`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    /// Layout of a single collection (`.../{name}/sub_tables_images`).
    pub fn collection<S: AsRef<str>>(&self, name: S) -> CollectionPaths {
        CollectionPaths::new(self.base_dir.join(name.as_ref()).join("sub_tables_images"))
    }
}

/// Directories and files belonging to one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPaths {
    pub image_dir: PathBuf,
    pub source_dir: PathBuf,
    pub ledger: PathBuf,
}

impl CollectionPaths {
    fn new(image_dir: PathBuf) -> Self {
        let source_dir = image_dir.join("csv");
        let ledger = image_dir.join(LEDGER_FILE);
        Self {
            image_dir,
            source_dir,
            ledger,
        }
    }
}

/// Derive the numeric id of a collection from its name (`table7` -> 7).
///
/// Returns `None` for names that are not managed collections.
pub fn collection_id(name: &str) -> Option<u32> {
    name.trim()
        .strip_prefix(COLLECTION_PREFIX)
        .and_then(|rest| rest.parse::<u32>().ok())
}

/// Write-ahead log sidecar of a store file (`{path}-wal`).
pub fn wal_path(db: &Path) -> PathBuf {
    with_suffix(db, "-wal")
}

/// Shared-memory sidecar of a store file (`{path}-shm`).
pub fn shm_path(db: &Path) -> PathBuf {
    with_suffix(db, "-shm")
}

/// The store file followed by its sidecars.
pub fn store_family(db: &Path) -> [PathBuf; 3] {
    [db.to_path_buf(), wal_path(db), shm_path(db)]
}

/// Default backup location for a live store (`reactions.db` -> `reactions.bak`).
pub fn default_backup_path(live: &Path) -> PathBuf {
    live.with_extension("bak")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(PathError::CreateDir {
                path: path.to_path_buf(),
                source: err,
            });
        }
    }
    Ok(path.to_path_buf())
}
