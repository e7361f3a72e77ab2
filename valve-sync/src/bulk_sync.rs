//! Force-push of every local record to the remote
//!
//! A recovery tool for suspected desynchronization. Attachments are left out
//! on purpose so a failing upload path cannot mask other failures, and each
//! batch (one row by default) fails on its own. The local store is only read.

use crate::encryption::RecordCipher;
use crate::error::SyncResult;
use crate::local_store::{LocalStore, Partition};
use crate::model::{SyncEntity, ValveRecord};
use crate::remote::RemoteGateway;
use crate::schema::{self, RemoteRow};
use chrono::Utc;
use logger_redacted::redact;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Outcome of a bulk push; partial failure is reported, not raised
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSyncReport {
    pub success: bool,
    pub synced_count: usize,
    pub failed_ids: Vec<String>,
    pub last_error: Option<String>,
    /// Remote row count after the push, when it could be read
    pub remote_total: Option<u64>,
}

pub struct BulkSyncDriver {
    store: LocalStore,
    cipher: Arc<RecordCipher>,
    gateway: Arc<dyn RemoteGateway>,
    batch_size: usize,
}

impl BulkSyncDriver {
    pub fn new(
        store: LocalStore,
        cipher: Arc<RecordCipher>,
        gateway: Arc<dyn RemoteGateway>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            cipher,
            gateway,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self) -> SyncResult<BulkSyncReport> {
        if !self.gateway.is_reachable().await {
            tracing::warn!("Bulk sync skipped; remote unreachable");
            return Ok(BulkSyncReport {
                last_error: Some("remote unreachable".to_string()),
                ..Default::default()
            });
        }

        let rows = self.build_rows().await?;
        let total = rows.len();

        let mut report = BulkSyncReport::default();
        for batch in rows.chunks(self.batch_size) {
            let ids: Vec<String> = batch.iter().map(|(id, _)| id.clone()).collect();
            let payload: Vec<RemoteRow> = batch.iter().map(|(_, row)| row.clone()).collect();

            match self.gateway.upsert(ValveRecord::REMOTE_TABLE, payload, "id").await {
                Ok(()) => report.synced_count += ids.len(),
                Err(e) => {
                    let message = redact(&e.to_string());
                    tracing::warn!(ids = ?ids, error = %message, "Bulk sync batch failed");
                    report.failed_ids.extend(ids);
                    report.last_error = Some(message);
                }
            }
        }

        report.success = report.failed_ids.is_empty();
        report.remote_total = match self.gateway.count(ValveRecord::REMOTE_TABLE, &[]).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::debug!(error = %redact(&e.to_string()), "Remote count unavailable after bulk sync");
                None
            }
        };

        tracing::info!(
            total,
            synced = report.synced_count,
            failed = report.failed_ids.len(),
            remote_total = ?report.remote_total,
            "Bulk sync finished"
        );

        Ok(report)
    }

    /// Decrypt local records into attachment-free remote rows
    async fn build_rows(&self) -> SyncResult<Vec<(String, RemoteRow)>> {
        let envelopes = self.store.get_all(Partition::Records).await?;
        let photo_column = schema::remote_column::<ValveRecord>("valvePhoto")?;
        let files_column = schema::remote_column::<ValveRecord>("files")?;

        let mut rows = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            let Some(mut record) = self.cipher.decrypt_as::<ValveRecord>(&envelope.encrypted_blob).await else {
                tracing::warn!(id = %envelope.id, "Skipping undecryptable record in bulk sync");
                continue;
            };

            record.id = Some(envelope.id.clone());
            if record.updated_at.is_none() {
                record.updated_at = Some(Utc::now());
            }

            let mut row = schema::to_remote_row(&record)?;
            row.insert(photo_column.to_string(), Value::Null);
            row.insert(files_column.to_string(), Value::Array(Vec::new()));

            rows.push((envelope.id, row));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::key_storage::MemoryKeyValueStorage;
    use crate::local_store::EncryptedEnvelope;
    use crate::model::Attachment;
    use crate::remote::{GatewayOp, MemoryGateway};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        store: LocalStore,
        cipher: Arc<RecordCipher>,
        gateway: Arc<MemoryGateway>,
        _dir: TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = SyncConfig {
                db_path: dir.path().join("bulk.db").to_str().unwrap().to_string(),
                ..Default::default()
            };
            Self {
                store: LocalStore::open(&config).await.unwrap(),
                cipher: Arc::new(RecordCipher::new(Arc::new(MemoryKeyValueStorage::new()), "key")),
                gateway: Arc::new(MemoryGateway::new()),
                _dir: dir,
            }
        }

        fn driver(&self, batch_size: usize) -> BulkSyncDriver {
            BulkSyncDriver::new(self.store.clone(), self.cipher.clone(), self.gateway.clone(), batch_size)
        }

        async fn put(&self, record: ValveRecord) {
            let envelope = EncryptedEnvelope {
                id: record.id.clone().unwrap(),
                encrypted_blob: self.cipher.encrypt(&record).await.unwrap(),
            };
            self.store.put(&envelope, Partition::Records).await.unwrap();
        }
    }

    fn valve(id: &str) -> ValveRecord {
        ValveRecord {
            id: Some(id.into()),
            serial_number: Some(format!("SN-{}", id)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pushes_each_record_separately() {
        let fixture = Fixture::new().await;
        for id in ["a", "b", "c"] {
            fixture.put(valve(id)).await;
        }

        let report = fixture.driver(1).run().await.unwrap();

        assert!(report.success);
        assert_eq!(report.synced_count, 3);
        assert_eq!(report.remote_total, Some(3));
        assert_eq!(fixture.gateway.calls(GatewayOp::Upsert), 3);

        // Missing updatedAt is filled in on the way out
        assert!(!fixture.gateway.row("valve_records", "a").unwrap()["updated_at"].is_null());
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let fixture = Fixture::new().await;
        for id in ["a", "b", "c"] {
            fixture.put(valve(id)).await;
        }
        fixture.gateway.reject_row("b");

        let report = fixture.driver(1).run().await.unwrap();

        assert!(!report.success);
        assert_eq!(report.synced_count, 2);
        assert_eq!(report.failed_ids, vec!["b".to_string()]);
        assert!(report.last_error.unwrap().contains("rejected"));
        assert_eq!(report.remote_total, Some(2));
    }

    #[tokio::test]
    async fn test_attachments_are_stripped() {
        let fixture = Fixture::new().await;
        let mut record = valve("a");
        record.valve_photo = Some(Attachment::stored("https://cdn/p.jpg"));
        record.files = vec![Attachment::stored("https://cdn/f.pdf")];
        fixture.put(record.clone()).await;

        fixture.driver(1).run().await.unwrap();

        let row = fixture.gateway.row("valve_records", "a").unwrap();
        assert_eq!(row["valve_photo"], Value::Null);
        assert_eq!(row["file_urls"], json!([]));
        assert_eq!(fixture.gateway.calls(GatewayOp::Upload), 0);

        // Local copy untouched
        let envelope = fixture.store.get("a", Partition::Records).await.unwrap().unwrap();
        let stored: ValveRecord = fixture.cipher.decrypt_as(&envelope.encrypted_blob).await.unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_unreachable_and_count_failure() {
        let fixture = Fixture::new().await;
        fixture.put(valve("a")).await;

        fixture.gateway.set_reachable(false);
        let report = fixture.driver(1).run().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.synced_count, 0);

        fixture.gateway.set_reachable(true);
        fixture.gateway.set_failing(GatewayOp::Count, true);
        let report = fixture.driver(5).run().await.unwrap();
        assert!(report.success);
        assert_eq!(report.remote_total, None);
    }
}
