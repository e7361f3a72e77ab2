use super::Synchronizer;
use crate::attachments::AttachmentResolver;
use crate::error::SyncResult;
use crate::model::history::HISTORY_TABLE;
use crate::model::{HistorySnapshot, SyncEntity, ValveRecord};
use crate::remote::{ChangeEvent, ChangeKind, Filter, Order, Subscription};
use crate::schema::{self, RemoteRow};
use chrono::{DateTime, Utc};
use logger_redacted::redact;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Receives a fresh active record set after each remote change
pub type RecordsCallback = Arc<dyn Fn(Vec<ValveRecord>) + Send + Sync>;

impl Synchronizer {
    /// Active records, merged with the remote when it is available
    pub async fn get_all(&self) -> SyncResult<Vec<ValveRecord>> {
        let merged = self.merged_records().await?;
        Ok(merged.into_iter().filter(|r| !r.is_deleted()).collect())
    }

    /// Soft-deleted records, for the trash view
    pub async fn get_deleted(&self) -> SyncResult<Vec<ValveRecord>> {
        let merged = self.merged_records().await?;
        Ok(merged.into_iter().filter(ValveRecord::is_deleted).collect())
    }

    async fn merged_records(&self) -> SyncResult<Vec<ValveRecord>> {
        if let Err(e) = self.migration.run().await {
            tracing::error!(error = %e, "Legacy migration failed; will retry on next read");
        }

        let local = self.load_local::<ValveRecord>().await?;
        let merged = self.read_through(local, &[]).await;

        let mut seen = HashSet::with_capacity(merged.len());
        Ok(merged
            .into_iter()
            .filter(|r| r.id.as_ref().map_or(false, |id| seen.insert(id.clone())))
            .collect())
    }

    /// One record from the local store
    pub async fn get(&self, id: &str) -> SyncResult<Option<ValveRecord>> {
        self.load_one(id).await
    }

    /// Active records assigned to a job
    pub async fn records_for_job(&self, job_id: &str) -> SyncResult<Vec<ValveRecord>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|r| r.job_id.as_deref() == Some(job_id))
            .collect())
    }

    /// Persist a record locally, then mirror it to the remote
    ///
    /// Returns the stored form, with pending attachments resolved to URLs.
    pub async fn save(&self, mut record: ValveRecord) -> SyncResult<ValveRecord> {
        let id = record.stamp(Utc::now());

        AttachmentResolver::new(self.gateway.as_ref(), &self.bucket)
            .resolve_record(&mut record, &id)
            .await;

        self.store_local(&record).await?;
        let mirrored = self.push_remote(&record).await;

        tracing::debug!(id = %id, mirrored, "Saved valve record");
        Ok(record)
    }

    /// Move a record to the trash
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        self.set_deleted_at(id, Some(Utc::now())).await
    }

    /// Bring a record back from the trash
    pub async fn restore(&self, id: &str) -> SyncResult<()> {
        self.set_deleted_at(id, None).await
    }

    async fn set_deleted_at(&self, id: &str, deleted_at: Option<DateTime<Utc>>) -> SyncResult<()> {
        let local = self
            .patch_local(id, |record| record.deleted_at = deleted_at)
            .await;
        let remote = self.patch_remote(id, "deletedAt", deleted_at).await;

        match local {
            Ok(()) => Ok(()),
            // The remote copy carries the change; the next read merges it back
            Err(e) if remote => {
                tracing::error!(id, error = %e, "Local trash update failed; remote was updated");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Record that a record was opened; does not count as an edit
    pub async fn mark_viewed(&self, id: &str) -> SyncResult<()> {
        let now = Utc::now();
        self.patch_local(id, |record| record.last_viewed_at = Some(now))
            .await?;
        self.patch_remote(id, "lastViewedAt", Some(now)).await;
        Ok(())
    }

    /// Decrypt, mutate and re-store one record; absent records are a no-op
    async fn patch_local<F>(&self, id: &str, mutate: F) -> SyncResult<()>
    where
        F: FnOnce(&mut ValveRecord),
    {
        let Some(mut record) = self.load_one::<ValveRecord>(id).await? else {
            tracing::debug!(id, "No local copy to update");
            return Ok(());
        };

        mutate(&mut record);
        self.store_local(&record).await
    }

    async fn patch_remote(&self, id: &str, field: &str, at: Option<DateTime<Utc>>) -> bool {
        let column = match schema::remote_column::<ValveRecord>(field) {
            Ok(column) => column,
            Err(e) => {
                tracing::error!(error = %e, "Unmapped record field");
                return false;
            }
        };

        let mut patch = RemoteRow::new();
        patch.insert(
            column.to_string(),
            at.map_or(Value::Null, |t| Value::String(t.to_rfc3339())),
        );

        match self.gateway.update(ValveRecord::REMOTE_TABLE, id, patch).await {
            Ok(()) => true,
            Err(e) => {
                self.log_remote_failure(ValveRecord::REMOTE_TABLE, "update", &e);
                false
            }
        }
    }

    /// Ids of trashed local records past the retention window
    pub async fn purge_candidates(&self, now: DateTime<Utc>) -> SyncResult<Vec<String>> {
        let local = self.load_local::<ValveRecord>().await?;
        Ok(self.retention().purge_candidates(&local, now))
    }

    /// Prior versions of a record, newest first; empty when the remote is unavailable
    pub async fn get_history(&self, valve_id: &str) -> Vec<HistorySnapshot> {
        if !self.gateway.is_reachable().await {
            return Vec::new();
        }

        let rows = match self
            .gateway
            .select(
                HISTORY_TABLE,
                &[Filter::equals("valve_id", valve_id)],
                Some(&Order::desc("changed_at")),
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(valve_id, error = %redact(&e.to_string()), "History fetch failed");
                return Vec::new();
            }
        };

        rows.iter()
            .filter_map(|row| match HistorySnapshot::from_row(row) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(valve_id, error = %e, "Skipping unreadable history row");
                    None
                }
            })
            .collect()
    }

    /// Make a prior version the current state of its record
    pub async fn revert_to(&self, snapshot: &HistorySnapshot) -> SyncResult<ValveRecord> {
        let mut record = snapshot.record.clone();
        record.id = Some(snapshot.valve_id.clone());

        tracing::info!(valve_id = %snapshot.valve_id, snapshot_id = %snapshot.id, "Reverting valve record");
        self.save(record).await
    }

    /// Re-read the record set whenever the remote table changes
    ///
    /// Each notification starts an independent `get_all`; results are handed
    /// to `callback` as they complete.
    pub async fn watch_remote(&self, callback: RecordsCallback) -> SyncResult<Subscription> {
        let sync = self.clone();

        self.gateway
            .subscribe(
                ValveRecord::REMOTE_TABLE,
                &ChangeKind::ALL,
                Arc::new(move |event: ChangeEvent| {
                    let sync = sync.clone();
                    let callback = callback.clone();
                    tracing::debug!(kind = ?event.kind, "Remote valve records changed");

                    tokio::spawn(async move {
                        match sync.get_all().await {
                            Ok(records) => callback(records),
                            Err(e) => tracing::warn!(error = %e, "Refresh after remote change failed"),
                        }
                    });
                }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SyncConfig;
    use crate::model::{Attachment, ValveRecord};
    use crate::remote::{GatewayOp, MemoryGateway};
    use crate::ValveSync;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open(gateway: Arc<MemoryGateway>) -> (ValveSync, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig {
            db_path: dir.path().join("sync.db").to_str().unwrap().to_string(),
            ..Default::default()
        };
        (ValveSync::open(config, gateway).await.unwrap(), dir)
    }

    fn valve(serial: &str) -> ValveRecord {
        ValveRecord {
            serial_number: Some(serial.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_assigns_identity_and_mirrors() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway.clone()).await;

        let saved = sync.synchronizer().save(valve("SN-1")).await.unwrap();
        let id = saved.id.clone().unwrap();

        assert!(saved.created_at.is_some());
        assert_eq!(saved.created_at, saved.updated_at);
        assert_eq!(gateway.row("valve_records", &id).unwrap()["serial_number"], json!("SN-1"));

        let stored = sync.synchronizer().get(&id).await.unwrap().unwrap();
        assert_eq!(stored, saved);
    }

    #[tokio::test]
    async fn test_save_survives_remote_failure() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_failing(GatewayOp::Upsert, true);
        let (sync, _dir) = open(gateway.clone()).await;

        let saved = sync.synchronizer().save(valve("SN-2")).await.unwrap();

        assert!(gateway.rows("valve_records").is_empty());
        assert!(sync.synchronizer().get(saved.id.as_deref().unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_fails_when_local_store_is_closed() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway.clone()).await;
        sync.store().close().await;

        assert!(sync.synchronizer().save(valve("SN-3")).await.is_err());
        assert!(gateway.rows("valve_records").is_empty());
    }

    #[tokio::test]
    async fn test_save_uploads_pending_photo() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway.clone()).await;

        let mut record = valve("SN-4");
        record.valve_photo = Some(Attachment::pending("plate.jpg", "image/jpeg", vec![9, 9]));

        let saved = sync.synchronizer().save(record).await.unwrap();
        let url = saved.valve_photo.as_ref().and_then(Attachment::url).unwrap().to_string();

        assert!(url.starts_with("memory://valve-files/valves/"));
        let row = gateway.row("valve_records", saved.id.as_deref().unwrap()).unwrap();
        assert_eq!(row["valve_photo"], json!(url));
    }

    #[tokio::test]
    async fn test_mark_viewed_keeps_updated_at() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway.clone()).await;

        let saved = sync.synchronizer().save(valve("SN-5")).await.unwrap();
        let id = saved.id.clone().unwrap();

        sync.synchronizer().mark_viewed(&id).await.unwrap();

        let stored = sync.synchronizer().get(&id).await.unwrap().unwrap();
        assert!(stored.last_viewed_at.is_some());
        assert_eq!(stored.updated_at, saved.updated_at);
        assert!(!gateway.row("valve_records", &id).unwrap()["last_viewed_at"].is_null());

        // Unknown ids are a no-op
        sync.synchronizer().mark_viewed("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_trash_and_purge_candidates() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway).await;

        let kept = sync.synchronizer().save(valve("SN-6")).await.unwrap();
        let trashed = sync.synchronizer().save(valve("SN-7")).await.unwrap();
        let trashed_id = trashed.id.clone().unwrap();

        sync.synchronizer().delete(&trashed_id).await.unwrap();

        let deleted = sync.synchronizer().get_deleted().await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, trashed.id);

        let now = Utc::now();
        assert!(sync.synchronizer().purge_candidates(now).await.unwrap().is_empty());
        assert_eq!(
            sync.synchronizer().purge_candidates(now + Duration::days(6)).await.unwrap(),
            vec![trashed_id]
        );

        let active = sync.synchronizer().get_all().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);
    }

    #[tokio::test]
    async fn test_retention_setting_changes_purge_window() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway).await;

        let trashed = sync.synchronizer().save(valve("SN-8")).await.unwrap();
        let id = trashed.id.clone().unwrap();
        sync.synchronizer().delete(&id).await.unwrap();

        let later = Utc::now() + Duration::days(6);
        assert_eq!(sync.synchronizer().purge_candidates(later).await.unwrap(), vec![id.clone()]);

        sync.settings().update(|s| s.retention_days = 30).await.unwrap();
        assert_eq!(sync.synchronizer().retention().window(), Duration::days(30));
        assert!(sync.synchronizer().purge_candidates(later).await.unwrap().is_empty());
        assert_eq!(
            sync.synchronizer().purge_candidates(Utc::now() + Duration::days(31)).await.unwrap(),
            vec![id]
        );
    }

    #[tokio::test]
    async fn test_records_for_job() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway).await;

        let mut on_job = valve("SN-8");
        on_job.job_id = Some("j1".into());
        sync.synchronizer().save(on_job).await.unwrap();
        sync.synchronizer().save(valve("SN-9")).await.unwrap();

        let records = sync.synchronizer().records_for_job("j1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].serial_number.as_deref(), Some("SN-8"));
    }

    #[tokio::test]
    async fn test_history_and_revert() {
        let gateway = Arc::new(MemoryGateway::new());
        let (sync, _dir) = open(gateway.clone()).await;

        let saved = sync.synchronizer().save(valve("SN-NEW")).await.unwrap();
        let id = saved.id.clone().unwrap();

        gateway.seed(
            "valve_history",
            [
                json!({"id": "h1", "valve_id": id, "changed_at": "2024-01-01T00:00:00Z",
                       "record_data": {"id": id, "serial_number": "SN-OLDEST"}}),
                json!({"id": "h2", "valve_id": id, "changed_at": "2024-02-01T00:00:00Z",
                       "record_data": {"id": id, "serial_number": "SN-OLD"}}),
                json!({"id": "h3", "valve_id": "other", "changed_at": "2024-03-01T00:00:00Z",
                       "record_data": {"id": "other"}}),
            ]
            .into_iter()
            .filter_map(|v| v.as_object().cloned()),
        );

        let history = sync.synchronizer().get_history(&id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, "h2");
        assert_eq!(
            history[0].changed_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );

        let reverted = sync.synchronizer().revert_to(&history[0]).await.unwrap();
        assert_eq!(reverted.id.as_deref(), Some(id.as_str()));
        assert_eq!(reverted.serial_number.as_deref(), Some("SN-OLD"));
        assert!(reverted.updated_at > saved.updated_at);
        assert_eq!(gateway.row("valve_records", &id).unwrap()["serial_number"], json!("SN-OLD"));
    }

    #[tokio::test]
    async fn test_history_offline_is_empty() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_reachable(false);
        let (sync, _dir) = open(gateway).await;

        assert!(sync.synchronizer().get_history("v1").await.is_empty());
    }
}
