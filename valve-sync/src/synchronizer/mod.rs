//! Record synchronizer
//!
//! Local-first reads and writes over the encrypted store, mirrored to the
//! remote gateway on a best-effort basis. Local failures propagate; remote
//! failures are logged and the call carries on in offline mode.

mod children;
mod jobs;
mod records;

pub use records::RecordsCallback;

use crate::config::SyncConfig;
use crate::encryption::RecordCipher;
use crate::error::{SyncError, SyncResult};
use crate::local_store::{EncryptedEnvelope, LocalStore};
use crate::merge;
use crate::migration::LegacyMigration;
use crate::model::SyncEntity;
use crate::remote::{Filter, RemoteGateway};
use crate::retention::RetentionPolicy;
use crate::schema;
use logger_redacted::redact;
use parking_lot::RwLock;
use std::sync::Arc;

/// Remote column every synchronized table is keyed on
const CONFLICT_KEY: &str = "id";

#[derive(Clone)]
pub struct Synchronizer {
    store: LocalStore,
    cipher: Arc<RecordCipher>,
    gateway: Arc<dyn RemoteGateway>,
    migration: Arc<LegacyMigration>,
    bucket: String,
    retention: Arc<RwLock<RetentionPolicy>>,
}

impl Synchronizer {
    pub fn new(
        store: LocalStore,
        cipher: Arc<RecordCipher>,
        gateway: Arc<dyn RemoteGateway>,
        migration: Arc<LegacyMigration>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            cipher,
            gateway,
            migration,
            bucket: config.storage_bucket.clone(),
            retention: Arc::new(RwLock::new(RetentionPolicy::new(config.retention_days))),
        }
    }

    /// Trash window in effect; shared by every clone of this synchronizer
    pub fn retention(&self) -> RetentionPolicy {
        *self.retention.read()
    }

    pub fn set_retention(&self, policy: RetentionPolicy) {
        *self.retention.write() = policy;
    }

    /// Decrypt every local entity of a type; unreadable entries are skipped
    async fn load_local<E: SyncEntity>(&self) -> SyncResult<Vec<E>> {
        let envelopes = self.store.get_all(E::PARTITION).await?;
        let total = envelopes.len();

        let mut entities = Vec::with_capacity(total);
        for envelope in envelopes {
            if let Some(entity) = self.open_envelope::<E>(envelope).await {
                entities.push(entity);
            }
        }

        let unreadable = total - entities.len();
        if unreadable > 0 {
            tracing::warn!(
                partition = %E::PARTITION,
                unreadable,
                total,
                "Skipped local entries that could not be decrypted; the device key may have been reset"
            );
        }

        Ok(entities)
    }

    async fn load_one<E: SyncEntity>(&self, id: &str) -> SyncResult<Option<E>> {
        match self.store.get(id, E::PARTITION).await? {
            Some(envelope) => Ok(self.open_envelope(envelope).await),
            None => Ok(None),
        }
    }

    /// Decrypt one envelope; the envelope id is authoritative
    async fn open_envelope<E: SyncEntity>(&self, envelope: EncryptedEnvelope) -> Option<E> {
        let mut entity: E = self.cipher.decrypt_as(&envelope.encrypted_blob).await?;

        if entity.id() != Some(envelope.id.as_str()) {
            tracing::warn!(
                partition = %E::PARTITION,
                envelope_id = %envelope.id,
                payload_id = ?entity.id(),
                "Envelope id does not match payload id"
            );
            entity.set_id(envelope.id);
        }
        Some(entity)
    }

    async fn seal<E: SyncEntity>(&self, entity: &E) -> SyncResult<EncryptedEnvelope> {
        let id = entity
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::InvalidOperation(format!("{} has no id", E::KIND)))?
            .to_string();

        Ok(EncryptedEnvelope {
            encrypted_blob: self.cipher.encrypt(entity).await?,
            id,
        })
    }

    async fn store_local<E: SyncEntity>(&self, entity: &E) -> SyncResult<()> {
        let envelope = self.seal(entity).await?;
        self.store.put(&envelope, E::PARTITION).await
    }

    async fn store_all_local<E: SyncEntity>(&self, entities: &[E]) -> SyncResult<()> {
        let mut envelopes = Vec::with_capacity(entities.len());
        for entity in entities {
            envelopes.push(self.seal(entity).await?);
        }
        self.store.bulk_put(&envelopes, E::PARTITION).await
    }

    /// Remote rows for a type, or `None` when the remote is unavailable
    async fn fetch_remote<E: SyncEntity>(&self, filters: &[Filter]) -> Option<Vec<E>> {
        if !self.gateway.is_reachable().await {
            tracing::debug!(table = E::REMOTE_TABLE, "Remote unreachable; serving local data");
            return None;
        }

        match self.gateway.select(E::REMOTE_TABLE, filters, None).await {
            Ok(rows) => Some(
                rows.iter()
                    .filter_map(|row| match schema::from_remote_row::<E>(row) {
                        Ok(entity) => Some(entity),
                        Err(e) => {
                            tracing::warn!(table = E::REMOTE_TABLE, error = %e, "Skipping unreadable remote row");
                            None
                        }
                    })
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!(
                    table = E::REMOTE_TABLE,
                    error = %redact(&e.to_string()),
                    "Remote fetch failed; serving local data"
                );
                None
            }
        }
    }

    /// Reconcile `local` with the remote copy and republish the result locally
    ///
    /// An unavailable or empty remote leaves local data untouched.
    async fn read_through<E: SyncEntity>(&self, local: Vec<E>, filters: &[Filter]) -> Vec<E> {
        let remote = match self.fetch_remote::<E>(filters).await {
            Some(remote) if !remote.is_empty() => remote,
            Some(_) => {
                tracing::debug!(table = E::REMOTE_TABLE, "Remote returned no rows; keeping local data");
                return local;
            }
            None => return local,
        };

        let remote_count = remote.len();
        let merged = merge::merge_sets(local, remote);

        if let Err(e) = self.store_all_local(&merged).await {
            tracing::error!(partition = %E::PARTITION, error = %e, "Failed to persist merged entities");
        }

        tracing::debug!(
            table = E::REMOTE_TABLE,
            remote = remote_count,
            merged = merged.len(),
            "Merged remote entities"
        );
        merged
    }

    /// Best-effort upsert of one entity; `false` when it did not reach the remote
    async fn push_remote<E: SyncEntity>(&self, entity: &E) -> bool {
        let row = match schema::to_remote_row(entity) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(table = E::REMOTE_TABLE, error = %e, "Could not map entity for the remote");
                return false;
            }
        };

        match self.gateway.upsert(E::REMOTE_TABLE, vec![row], CONFLICT_KEY).await {
            Ok(()) => true,
            Err(e) => {
                self.log_remote_failure(E::REMOTE_TABLE, "upsert", &e);
                false
            }
        }
    }

    /// Stamp, store locally (required), then mirror remotely (best effort)
    async fn save_entity<E: SyncEntity>(&self, mut entity: E) -> SyncResult<E> {
        let id = entity.stamp(chrono::Utc::now());

        self.store_local(&entity).await?;
        let mirrored = self.push_remote(&entity).await;

        tracing::debug!(kind = E::KIND, id = %id, mirrored, "Saved entity");
        Ok(entity)
    }

    /// Hard delete from both sides; only the local delete is required
    async fn remove_entity<E: SyncEntity>(&self, id: &str) -> SyncResult<()> {
        self.store.delete(id, E::PARTITION).await?;

        if let Err(e) = self.gateway.delete(E::REMOTE_TABLE, id).await {
            self.log_remote_failure(E::REMOTE_TABLE, "delete", &e);
        }

        tracing::debug!(kind = E::KIND, id, "Deleted entity");
        Ok(())
    }

    fn log_remote_failure(&self, table: &str, operation: &str, error: &SyncError) {
        match error {
            SyncError::Unreachable => {
                tracing::debug!(table, operation, "Remote unreachable; change kept locally")
            }
            other => tracing::warn!(
                table,
                operation,
                error = %redact(&other.to_string()),
                "Remote mirror failed; change kept locally"
            ),
        }
    }
}
