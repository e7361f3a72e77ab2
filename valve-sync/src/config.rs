//! Sync core configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file,
//! then `VALVE_SYNC_*` environment variables (`__` separates nested keys,
//! e.g. `VALVE_SYNC_LOGGING__JSON=true`).

use crate::error::{SyncError, SyncResult};
use crate::retention::MAX_RETENTION_DAYS;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the on-device store and sync behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Path to the SQLite file backing the local store
    pub db_path: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether to enable WAL mode
    pub enable_wal: bool,
    /// Overwrite freed pages so soft-deleted payloads do not linger on disk
    pub enable_secure_delete: bool,
    /// Device storage key holding the base64 encryption key
    pub encryption_key_name: String,
    /// Device storage key of the pre-encryption record array
    pub legacy_records_key: String,
    /// Device storage key of the settings blob
    pub settings_key: String,
    /// Blob storage bucket for photos and attachments
    pub storage_bucket: String,
    /// Rows per upsert in the bulk sync driver
    pub bulk_batch_size: usize,
    /// Days a soft-deleted record stays in the trash before it may be purged
    pub retention_days: i64,
    pub logging: LoggerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: "valve_records.db".to_string(),
            max_connections: 5,
            enable_wal: true,
            enable_secure_delete: true,
            encryption_key_name: "valve_sync.encryption_key".to_string(),
            legacy_records_key: "valve_records".to_string(),
            settings_key: "valve_sync.settings".to_string(),
            storage_bucket: "valve-files".to_string(),
            bulk_batch_size: 1,
            retention_days: 5,
            logging: LoggerConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(SyncConfig::default()));

        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        let config: SyncConfig = figment
            .merge(Env::prefixed("VALVE_SYNC_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the store and drivers cannot work with
    pub fn validate(&self) -> SyncResult<()> {
        if self.db_path.trim().is_empty() {
            return Err(SyncError::Config("db_path must not be empty".into()));
        }
        if self.max_connections == 0 {
            return Err(SyncError::Config("max_connections must be at least 1".into()));
        }
        if self.bulk_batch_size == 0 {
            return Err(SyncError::Config("bulk_batch_size must be at least 1".into()));
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(SyncError::Config(format!(
                "retention_days must be between 0 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        for (name, value) in [
            ("encryption_key_name", &self.encryption_key_name),
            ("legacy_records_key", &self.legacy_records_key),
            ("settings_key", &self.settings_key),
        ] {
            if value.is_empty() {
                return Err(SyncError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}
