//! One-time move of the pre-encryption record array into the local store
//!
//! Older app versions kept every valve record as one plaintext JSON array
//! under a device storage key. The array is re-encrypted into the records
//! partition and the key is removed only after that write has committed, so
//! an interrupted run is simply repeated.

use crate::encryption::RecordCipher;
use crate::error::{SyncError, SyncResult};
use crate::key_storage::KeyValueStorage;
use crate::local_store::{EncryptedEnvelope, LocalStore, Partition};
use crate::model::ValveRecord;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No legacy data present
    NotNeeded,
    Migrated { count: usize },
}

pub struct LegacyMigration {
    storage: Arc<dyn KeyValueStorage>,
    store: LocalStore,
    cipher: Arc<RecordCipher>,
    legacy_key: String,
}

impl LegacyMigration {
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        store: LocalStore,
        cipher: Arc<RecordCipher>,
        legacy_key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            store,
            cipher,
            legacy_key: legacy_key.into(),
        }
    }

    pub async fn run(&self) -> SyncResult<MigrationOutcome> {
        let raw = match self.storage.get(&self.legacy_key).await? {
            Some(raw) => raw,
            None => return Ok(MigrationOutcome::NotNeeded),
        };

        let entries: Vec<Value> = serde_json::from_str(&raw).map_err(|e| {
            SyncError::Migration(format!("legacy records are not a JSON array: {}", e))
        })?;

        let total = entries.len();
        let mut envelopes = Vec::with_capacity(total);
        let mut already_present = 0;

        for (index, entry) in entries.into_iter().enumerate() {
            let fallback_id = legacy_id(index, &entry);

            let mut record: ValveRecord = match serde_json::from_value(entry) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable legacy record");
                    continue;
                }
            };

            let id = match record.id.as_deref() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    record.id = Some(fallback_id.clone());
                    fallback_id
                }
            };

            // Copied by an earlier run whose key removal failed; may have been edited since
            if self.store.get(&id, Partition::Records).await?.is_some() {
                already_present += 1;
                continue;
            }

            envelopes.push(EncryptedEnvelope {
                encrypted_blob: self.cipher.encrypt(&record).await?,
                id,
            });
        }

        self.store.bulk_put(&envelopes, Partition::Records).await?;

        // Only now is the plaintext safe to drop
        self.storage.remove(&self.legacy_key).await?;

        tracing::info!(
            migrated = envelopes.len(),
            already_present,
            skipped = total - envelopes.len() - already_present,
            "Migrated legacy valve records into encrypted store"
        );

        Ok(MigrationOutcome::Migrated { count: envelopes.len() })
    }
}

/// Stable id for a legacy entry without one, so a repeated run maps it to the same record
fn legacy_id(index: usize, entry: &Value) -> String {
    let name = format!("{}:{}", index, entry);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
