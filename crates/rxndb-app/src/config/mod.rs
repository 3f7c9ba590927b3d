//! Configuration loading and XDG path helpers.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_BUILD_DB, DEFAULT_COLLECTIONS, DEFAULT_LIVE_DB};
use crate::paths::default_backup_path;
use crate::services::retry::RetryPolicy;

const CONFIG_FILE: &str = "config/settings";
const CONFIG_FILE_ENV: &str = "RXNDB_CONFIG_FILE";
const ENV_PREFIX: &str = "RXNDB";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub data: DataConfig,
    pub store: StoreConfig,
    pub rebuild: RebuildConfig,
    pub swap: SwapConfig,
}

impl AppConfig {
    /// Resolve a configured path; relative paths live under the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data.base_dir.join(path)
        }
    }

    pub fn live_path(&self) -> PathBuf {
        self.resolve(&self.store.live_path)
    }

    pub fn build_path(&self) -> PathBuf {
        self.resolve(&self.store.build_path)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.resolve(&self.store.backup_path())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub base_dir: PathBuf,
    pub collections: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub live_path: PathBuf,
    pub build_path: PathBuf,
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Backup location, defaulting to the live path with a `.bak` extension.
    pub fn backup_path(&self) -> PathBuf {
        self.backup_path
            .clone()
            .unwrap_or_else(|| default_backup_path(&self.live_path))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RebuildConfig {
    pub batch_size: usize,
    pub busy_timeout_ms: u64,
    pub clear_attempts: usize,
    pub clear_backoff_ms: u64,
    pub delete_attempts: usize,
    pub delete_backoff_ms: u64,
}

impl RebuildConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn clear_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.clear_attempts, Duration::from_millis(self.clear_backoff_ms))
    }

    pub fn delete_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.delete_attempts, Duration::from_millis(self.delete_backoff_ms))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SwapConfig {
    pub backup: bool,
    pub rename_attempts: usize,
    pub rename_backoff_ms: u64,
}

impl SwapConfig {
    pub fn rename_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.rename_attempts, Duration::from_millis(self.rename_backoff_ms))
    }
}

/// Load configuration with precedence: environment (`RXNDB__SECTION__KEY`),
/// file named by `RXNDB_CONFIG_FILE`, `config/settings.*`, built-in defaults.
pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_data = default_data_dir()?;
    let collections: Vec<String> = DEFAULT_COLLECTIONS.iter().map(|c| c.to_string()).collect();

    let mut builder = Config::builder()
        .set_default("data.base_dir", default_data.to_string_lossy().to_string())?
        .set_default("data.collections", collections)?
        .set_default("store.live_path", DEFAULT_LIVE_DB)?
        .set_default("store.build_path", DEFAULT_BUILD_DB)?
        .set_default("rebuild.batch_size", DEFAULT_BATCH_SIZE as u64)?
        .set_default("rebuild.busy_timeout_ms", 5_000_u64)?
        .set_default("rebuild.clear_attempts", 5_u64)?
        .set_default("rebuild.clear_backoff_ms", 300_u64)?
        .set_default("rebuild.delete_attempts", 10_u64)?
        .set_default("rebuild.delete_backoff_ms", 200_u64)?
        .set_default("swap.backup", true)?
        .set_default("swap.rename_attempts", 15_u64)?
        .set_default("swap.rename_backoff_ms", 250_u64)?
        .add_source(File::with_name(CONFIG_FILE).required(false));

    if let Some(path) = env::var_os(CONFIG_FILE_ENV) {
        builder = builder.add_source(File::from(PathBuf::from(path)).required(false));
    }

    let cfg: AppConfig = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("data.collections")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    if cfg.rebuild.batch_size == 0 {
        return Err(AppConfigError::Invalid(
            "rebuild.batch_size must be > 0".to_string(),
        ));
    }
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "rxndb", "rxndb").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_data_dir() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().join("data"))
}
