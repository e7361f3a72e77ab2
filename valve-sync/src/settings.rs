//! Application settings service
//!
//! One instance per process, passed to whoever needs it. Settings live as a
//! JSON blob in device storage; the service caches them after `init` and
//! notifies listeners on every successful update.

use crate::error::{SyncError, SyncResult};
use crate::key_storage::KeyValueStorage;
use crate::retention::MAX_RETENTION_DAYS;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Imperial,
    Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub unit_system: UnitSystem,
    pub company_name: Option<String>,
    pub default_technician: Option<String>,
    pub auto_sync: bool,
    pub retention_days: i64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            unit_system: UnitSystem::Imperial,
            company_name: None,
            default_technician: None,
            auto_sync: true,
            retention_days: 5,
        }
    }
}

pub type SettingsListener = Arc<dyn Fn(&AppSettings) + Send + Sync>;

pub struct SettingsService {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    defaults: AppSettings,
    cache: RwLock<Option<AppSettings>>,
    listeners: RwLock<HashMap<String, SettingsListener>>,
}

impl SettingsService {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            defaults: AppSettings::default(),
            cache: RwLock::new(None),
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Settings used when nothing readable is stored
    pub fn with_defaults(mut self, defaults: AppSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Load settings into the cache; missing or unreadable settings fall back to defaults
    pub async fn init(&self) -> AppSettings {
        let settings = match self.storage.get(&self.key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored settings are unreadable; using defaults");
                self.defaults.clone()
            }),
            Ok(None) => self.defaults.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read settings; using defaults");
                self.defaults.clone()
            }
        };

        *self.cache.write() = Some(settings.clone());
        settings
    }

    pub fn is_initialized(&self) -> bool {
        self.cache.read().is_some()
    }

    pub fn get(&self) -> SyncResult<AppSettings> {
        self.cache
            .read()
            .clone()
            .ok_or_else(|| SyncError::InvalidOperation("settings service is not initialized".into()))
    }

    /// Apply `change`, persist, then notify listeners
    ///
    /// On a persistence failure the cached settings are left as they were.
    pub async fn update<F>(&self, change: F) -> SyncResult<AppSettings>
    where
        F: FnOnce(&mut AppSettings),
    {
        let mut next = self.get()?;
        change(&mut next);

        if !(0..=MAX_RETENTION_DAYS).contains(&next.retention_days) {
            return Err(SyncError::InvalidOperation(format!(
                "retention_days must be between 0 and {}",
                MAX_RETENTION_DAYS
            )));
        }

        let raw = serde_json::to_string(&next)?;
        self.storage.set(&self.key, &raw).await?;
        *self.cache.write() = Some(next.clone());

        let listeners: Vec<SettingsListener> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(&next);
        }

        Ok(next)
    }

    /// Register a listener; returns the id to unsubscribe with
    pub fn subscribe<F>(&self, listener: F) -> String
    where
        F: Fn(&AppSettings) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4().to_string();
        self.listeners.write().insert(id.clone(), Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.listeners.write().remove(subscription_id).is_some()
    }

    /// Drop listeners and the cache; `init` must be called again before use
    pub fn teardown(&self) {
        self.listeners.write().clear();
        *self.cache.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_storage::MemoryKeyValueStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "settings";

    #[tokio::test]
    async fn test_lifecycle() {
        let service = SettingsService::new(Arc::new(MemoryKeyValueStorage::new()), KEY);

        assert!(service.get().is_err());
        assert_eq!(service.init().await, AppSettings::default());
        assert!(service.is_initialized());

        service.teardown();
        assert!(!service.is_initialized());
        assert!(service.update(|s| s.auto_sync = false).await.is_err());
    }

    #[tokio::test]
    async fn test_update_persists_and_notifies() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        let service = SettingsService::new(storage.clone(), KEY);
        service.init().await;

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let id = service.subscribe(move |settings| {
            assert_eq!(settings.unit_system, UnitSystem::Metric);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.update(|s| s.unit_system = UnitSystem::Metric).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        assert!(service.unsubscribe(&id));
        assert!(!service.unsubscribe(&id));
        service.update(|s| s.company_name = Some("Gulf Valve".into())).await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // A fresh service sees the persisted values
        let reloaded = SettingsService::new(storage, KEY).init().await;
        assert_eq!(reloaded.unit_system, UnitSystem::Metric);
        assert_eq!(reloaded.company_name.as_deref(), Some("Gulf Valve"));
    }

    #[tokio::test]
    async fn test_corrupt_blob_uses_defaults() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        storage.set(KEY, "{oops").await.unwrap();

        let service = SettingsService::new(storage, KEY);
        assert_eq!(service.init().await, AppSettings::default());
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_cache() {
        let storage = Arc::new(MemoryKeyValueStorage::new());
        let service = SettingsService::new(storage.clone(), KEY);
        service.init().await;

        storage.set_read_only(true);
        assert!(service.update(|s| s.auto_sync = false).await.is_err());
        assert!(service.get().unwrap().auto_sync);

        storage.set_read_only(false);
        assert!(service.update(|s| s.retention_days = -1).await.is_err());
        assert!(service.update(|s| s.retention_days = MAX_RETENTION_DAYS + 1).await.is_err());
        assert_eq!(service.get().unwrap().retention_days, 5);
    }

    #[tokio::test]
    async fn test_custom_defaults_apply_when_nothing_stored() {
        let service = SettingsService::new(Arc::new(MemoryKeyValueStorage::new()), KEY)
            .with_defaults(AppSettings { retention_days: 14, ..Default::default() });

        assert_eq!(service.init().await.retention_days, 14);
    }
}
