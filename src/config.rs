use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use chrono::TimeDelta;

use crate::registry::{DataSource, RegistryOptions, SourcePriority, StaleThresholds};
use crate::storage::{MemoryBackend, OverrideBackend, StorageResult};

/// Override storage configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (overrides are lost on restart)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    crate::util::get_data_dir().join("overrides.db")
}

impl StorageConfig {
    /// Opens the configured backend
    pub async fn open(&self) -> StorageResult<Arc<dyn OverrideBackend>> {
        match self {
            StorageConfig::None => Ok(Arc::new(MemoryBackend::new())),
            #[cfg(feature = "storage-sqlite")]
            StorageConfig::Sqlite { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let backend = crate::storage::sqlite::SqliteBackend::new(path).await?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "storage-sqlite"))]
            StorageConfig::Sqlite { .. } => Err(crate::storage::StorageError::InvalidConfig(
                "built without the storage-sqlite feature".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    #[serde(default = "crate::util::get_bind_addr")]
    pub bind_addr: String,

    /// Largest accepted ingest request body
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Bearer token required on every route but health
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: crate::util::get_bind_addr(),
            body_limit_bytes: default_body_limit(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_body_limit() -> usize {
    8 * 1024 * 1024
}

fn default_enable_cors() -> bool {
    true
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegistryConfig {
    /// Source kinds from most to least trusted
    #[serde(default)]
    pub source_priority: Option<Vec<DataSource>>,

    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_ms: u64,

    #[serde(default = "default_ledger_retention")]
    pub ledger_retention: u32,

    /// Seconds of silence after which a source counts as stale, per kind
    #[serde(default)]
    pub stale_after_secs: BTreeMap<DataSource, u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            source_priority: None,
            pull_timeout_ms: default_pull_timeout(),
            ledger_retention: default_ledger_retention(),
            stale_after_secs: BTreeMap::new(),
        }
    }
}

fn default_pull_timeout() -> u64 {
    5000
}

fn default_ledger_retention() -> u32 {
    10
}

impl RegistryConfig {
    pub fn options(&self) -> RegistryOptions {
        let mut stale_thresholds = StaleThresholds::default();
        for (source, secs) in &self.stale_after_secs {
            let secs = i64::try_from(*secs).unwrap_or(i64::MAX);
            stale_thresholds.set(*source, TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX));
        }

        RegistryOptions {
            priority: self
                .source_priority
                .clone()
                .map(SourcePriority::new)
                .unwrap_or_default(),
            pull_timeout: Duration::from_millis(self.pull_timeout_ms),
            ledger_retention: self.ledger_retention,
            stale_thresholds,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Override storage (defaults to SQLite in the data directory)
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
