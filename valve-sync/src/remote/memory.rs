//! In-process gateway for offline development and tests
//!
//! Behaves like the backend's row API on a handful of in-memory tables, with
//! switches to simulate lost connectivity and failing operations.

use super::{ChangeCallback, ChangeEvent, ChangeKind, Filter, Order, RemoteGateway, Subscription};
use crate::error::{SyncError, SyncResult};
use crate::schema::RemoteRow;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Gateway operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Select,
    Upsert,
    Update,
    Delete,
    Count,
    Rpc,
    Upload,
}

pub type RpcHandler = Arc<dyn Fn(Value) -> SyncResult<Value> + Send + Sync>;

pub struct MemoryGateway {
    tables: RwLock<HashMap<String, Vec<RemoteRow>>>,
    blobs: RwLock<HashMap<String, (String, Vec<u8>)>>,
    rpc_handlers: RwLock<HashMap<String, RpcHandler>>,
    reachable: AtomicBool,
    failing: RwLock<HashSet<GatewayOp>>,
    rejected_ids: RwLock<HashSet<String>>,
    calls: Mutex<HashMap<GatewayOp, usize>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            tables: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
            rpc_handlers: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            failing: RwLock::new(HashSet::new()),
            rejected_ids: RwLock::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            changes,
        }
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every call of `op` fail with a remote error
    pub fn set_failing(&self, op: GatewayOp, failing: bool) {
        let mut ops = self.failing.write();
        if failing {
            ops.insert(op);
        } else {
            ops.remove(&op);
        }
    }

    /// Reject any upsert batch containing a row with this id
    pub fn reject_row(&self, id: impl Into<String>) {
        self.rejected_ids.write().insert(id.into());
    }

    pub fn register_rpc<F>(&self, function: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> SyncResult<Value> + Send + Sync + 'static,
    {
        self.rpc_handlers.write().insert(function.into(), Arc::new(handler));
    }

    /// Put rows in place without emitting change events
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = RemoteRow>) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<RemoteRow> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: &str) -> Option<RemoteRow> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.iter().find(|row| row_id(row, "id") == Some(id)).cloned())
    }

    pub fn blob(&self, bucket: &str, path: &str) -> Option<(String, Vec<u8>)> {
        self.blobs.read().get(&blob_key(bucket, path)).cloned()
    }

    /// Number of attempted calls of `op`, including failed ones
    pub fn calls(&self, op: GatewayOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn begin(&self, op: GatewayOp) -> SyncResult<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::Unreachable);
        }
        if self.failing.read().contains(&op) {
            return Err(SyncError::Remote(format!("simulated {:?} failure", op)));
        }
        Ok(())
    }

    fn publish(&self, table: &str, kind: ChangeKind, row: RemoteRow) {
        // No receivers is fine
        let _ = self.changes.send(ChangeEvent {
            table: table.to_string(),
            kind,
            row,
        });
    }
}

fn row_id<'a>(row: &'a RemoteRow, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

fn blob_key(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, path)
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn select(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> SyncResult<Vec<RemoteRow>> {
        self.begin(GatewayOp::Select)?;

        let mut rows: Vec<RemoteRow> = self
            .rows(table)
            .into_iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .collect();

        if let Some(order) = order {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        Ok(rows)
    }

    async fn upsert(&self, table: &str, rows: Vec<RemoteRow>, conflict_key: &str) -> SyncResult<()> {
        self.begin(GatewayOp::Upsert)?;

        {
            let rejected = self.rejected_ids.read();
            for row in &rows {
                match row_id(row, conflict_key) {
                    None => {
                        return Err(SyncError::Remote(format!(
                            "row without conflict key {} in {}",
                            conflict_key, table
                        )))
                    }
                    Some(id) if rejected.contains(id) => {
                        return Err(SyncError::Remote(format!("row {} rejected by {}", id, table)))
                    }
                    Some(_) => {}
                }
            }
        }

        let mut events = Vec::with_capacity(rows.len());
        {
            let mut tables = self.tables.write();
            let existing = tables.entry(table.to_string()).or_default();

            for row in rows {
                let key = row_id(&row, conflict_key).map(str::to_string);
                match existing
                    .iter_mut()
                    .find(|current| row_id(current, conflict_key).map(str::to_string) == key)
                {
                    Some(current) => {
                        current.extend(row);
                        events.push((ChangeKind::Update, current.clone()));
                    }
                    None => {
                        events.push((ChangeKind::Insert, row.clone()));
                        existing.push(row);
                    }
                }
            }
        }

        for (kind, row) in events {
            self.publish(table, kind, row);
        }
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, patch: RemoteRow) -> SyncResult<()> {
        self.begin(GatewayOp::Update)?;

        let updated = {
            let mut tables = self.tables.write();
            tables
                .get_mut(table)
                .and_then(|rows| rows.iter_mut().find(|row| row_id(row, "id") == Some(id)))
                .map(|row| {
                    row.extend(patch);
                    row.clone()
                })
        };

        if let Some(row) = updated {
            self.publish(table, ChangeKind::Update, row);
        }
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> SyncResult<()> {
        self.begin(GatewayOp::Delete)?;

        let removed = {
            let mut tables = self.tables.write();
            tables.get_mut(table).and_then(|rows| {
                rows.iter()
                    .position(|row| row_id(row, "id") == Some(id))
                    .map(|index| rows.remove(index))
            })
        };

        if let Some(row) = removed {
            self.publish(table, ChangeKind::Delete, row);
        }
        Ok(())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> SyncResult<u64> {
        self.begin(GatewayOp::Count)?;

        let count = self
            .tables
            .read()
            .get(table)
            .map(|rows| rows.iter().filter(|row| filters.iter().all(|f| f.matches(row))).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn rpc(&self, function: &str, args: Value) -> SyncResult<Value> {
        self.begin(GatewayOp::Rpc)?;

        let handler = self
            .rpc_handlers
            .read()
            .get(function)
            .cloned()
            .ok_or_else(|| SyncError::Remote(format!("unknown function {}", function)))?;
        handler(args)
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> SyncResult<String> {
        self.begin(GatewayOp::Upload)?;

        self.blobs
            .write()
            .insert(blob_key(bucket, path), (content_type.to_string(), bytes));
        Ok(format!("memory://{}", blob_key(bucket, path)))
    }

    async fn subscribe(&self, table: &str, kinds: &[ChangeKind], callback: ChangeCallback) -> SyncResult<Subscription> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::Unreachable);
        }

        let mut receiver = self.changes.subscribe();
        let watched = table.to_string();
        let kinds: HashSet<ChangeKind> = kinds.iter().copied().collect();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.table == watched && kinds.contains(&event.kind) => callback(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(table = %watched, skipped, "Realtime subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(table, task))
    }
}
