//! Validation ledger reader.
//!
//! A ledger is a JSON object mapping display-image identifiers to validation
//! state. Older ledgers store a bare boolean per image; newer ones store a
//! record with reviewer and timestamp. Both shapes are accepted and folded into
//! [`ValidationRecord`] once, at load time.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ledger {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("ledger {path} entry `{image}` is neither a boolean nor a validation record")]
    InvalidEntry { path: PathBuf, image: String },
}

/// Normalized validation state of one ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub by: Option<String>,
    #[serde(default)]
    pub at: Option<String>,
}

impl ValidationRecord {
    pub fn unattributed(validated: bool) -> Self {
        Self {
            validated,
            by: None,
            at: None,
        }
    }
}

/// On-disk shape of a ledger value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LedgerValue {
    Legacy(bool),
    Record(ValidationRecord),
}

impl From<LedgerValue> for ValidationRecord {
    fn from(value: LedgerValue) -> Self {
        match value {
            LedgerValue::Legacy(flag) => ValidationRecord::unattributed(flag),
            LedgerValue::Record(record) => record,
        }
    }
}

/// One image entry of a ledger, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub image: String,
    pub record: ValidationRecord,
}

/// Read and normalize the ledger at `path`, preserving entry order.
pub fn load(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
    let raw = fs::read_to_string(path).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &raw)
}

fn parse(path: &Path, raw: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
    let object: Map<String, Value> =
        serde_json::from_str(raw).map_err(|source| LedgerError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    object
        .into_iter()
        .map(|(image, value)| {
            let value: LedgerValue =
                serde_json::from_value(value).map_err(|_| LedgerError::InvalidEntry {
                    path: path.to_path_buf(),
                    image: image.clone(),
                })?;
            Ok(LedgerEntry {
                image,
                record: value.into(),
            })
        })
        .collect()
}
