//! Offline-first sync core for valve inspection records
//!
//! Records, jobs, inspections and test reports are kept in an encrypted
//! on-device store and mirrored to a remote row-based backend. Reads merge
//! the two sides by last-write-wins on `updatedAt`; writes land locally
//! first and reach the remote when it is available.
//!
//! ```no_run
//! use std::sync::Arc;
//! use valve_sync::{MemoryGateway, SyncConfig, ValveRecord, ValveSync};
//!
//! # async fn demo() -> valve_sync::SyncResult<()> {
//! let config = SyncConfig::load(None)?;
//! let sync = ValveSync::open(config, Arc::new(MemoryGateway::new())).await?;
//!
//! let saved = sync
//!     .synchronizer()
//!     .save(ValveRecord { serial_number: Some("SN-100".into()), ..Default::default() })
//!     .await?;
//! let active = sync.synchronizer().get_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod attachments;
pub mod bulk_sync;
pub mod config;
pub mod encryption;
pub mod error;
pub mod key_storage;
pub mod local_store;
pub mod merge;
pub mod migration;
pub mod model;
pub mod remote;
pub mod retention;
pub mod schema;
pub mod settings;
pub mod synchronizer;

pub use bulk_sync::{BulkSyncDriver, BulkSyncReport};
pub use config::SyncConfig;
pub use encryption::RecordCipher;
pub use error::{SyncError, SyncResult};
pub use key_storage::{KeyValueStorage, MemoryKeyValueStorage, SqliteKeyValueStorage};
pub use local_store::{EncryptedEnvelope, LocalStore, Partition};
pub use migration::{LegacyMigration, MigrationOutcome};
pub use model::{Attachment, FileRef, HistorySnapshot, Inspection, Job, PendingUpload, SyncEntity, TestReport, ValveRecord};
pub use remote::{ChangeEvent, ChangeKind, Filter, MemoryGateway, Order, RemoteGateway, Subscription};
pub use retention::RetentionPolicy;
pub use settings::{AppSettings, SettingsService, UnitSystem};
pub use synchronizer::{RecordsCallback, Synchronizer};

use std::sync::Arc;

/// Install the process-wide tracing subscriber described by `config.logging`
pub fn init_logging(config: &SyncConfig) -> SyncResult<()> {
    logger_redacted::init_logging(&config.logging).map_err(|e| SyncError::Config(e.to_string()))
}

/// Wired-up sync core: one per process
pub struct ValveSync {
    config: SyncConfig,
    store: LocalStore,
    device_storage: Arc<dyn KeyValueStorage>,
    cipher: Arc<RecordCipher>,
    gateway: Arc<dyn RemoteGateway>,
    migration: Arc<LegacyMigration>,
    synchronizer: Synchronizer,
    settings: SettingsService,
}

impl ValveSync {
    /// Open the local store at `config.db_path`, keeping device storage in the same file
    pub async fn open(config: SyncConfig, gateway: Arc<dyn RemoteGateway>) -> SyncResult<Self> {
        config.validate()?;

        let store = LocalStore::open(&config).await?;
        let device_storage: Arc<dyn KeyValueStorage> = Arc::new(store.device_storage().await?);

        let sync = Self::with_device_storage(config, store, device_storage, gateway);
        let settings = sync.settings.init().await;
        sync.synchronizer
            .set_retention(RetentionPolicy::new(settings.retention_days));

        tracing::info!(db_path = %sync.config.db_path, "Valve sync core ready");
        Ok(sync)
    }

    /// Assemble the core over an explicit device storage (the settings service is left uninitialized)
    ///
    /// Settings updates made through [`ValveSync::settings`] take effect on the
    /// synchronizer's trash window immediately.
    pub fn with_device_storage(
        config: SyncConfig,
        store: LocalStore,
        device_storage: Arc<dyn KeyValueStorage>,
        gateway: Arc<dyn RemoteGateway>,
    ) -> Self {
        let cipher = Arc::new(RecordCipher::new(device_storage.clone(), config.encryption_key_name.clone()));
        let migration = Arc::new(LegacyMigration::new(
            device_storage.clone(),
            store.clone(),
            cipher.clone(),
            config.legacy_records_key.clone(),
        ));
        let synchronizer = Synchronizer::new(
            store.clone(),
            cipher.clone(),
            gateway.clone(),
            migration.clone(),
            &config,
        );
        let settings = SettingsService::new(device_storage.clone(), config.settings_key.clone()).with_defaults(
            AppSettings {
                retention_days: config.retention_days,
                ..Default::default()
            },
        );
        let follower = synchronizer.clone();
        settings.subscribe(move |settings| {
            follower.set_retention(RetentionPolicy::new(settings.retention_days));
        });

        Self {
            config,
            store,
            device_storage,
            cipher,
            gateway,
            migration,
            synchronizer,
            settings,
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn bulk_sync(&self) -> BulkSyncDriver {
        BulkSyncDriver::new(
            self.store.clone(),
            self.cipher.clone(),
            self.gateway.clone(),
            self.config.bulk_batch_size,
        )
    }

    pub fn migration(&self) -> &LegacyMigration {
        &self.migration
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn cipher(&self) -> &RecordCipher {
        &self.cipher
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn device_storage(&self) -> Arc<dyn KeyValueStorage> {
        self.device_storage.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Release the store; settings listeners, including the retention follower, are dropped
    pub async fn close(&self) {
        self.settings.teardown();
        self.store.close().await;
    }
}
