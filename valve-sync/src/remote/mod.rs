//! Remote backend contract
//!
//! The backend is a row store with upsert, RPC, blob storage and a realtime
//! change feed. The core only ever talks to it through [`RemoteGateway`];
//! every call may fail and callers treat failures as "remote unavailable".

pub mod memory;

pub use memory::{GatewayOp, MemoryGateway};

use crate::error::SyncResult;
use crate::schema::RemoteRow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Row predicate, applied column-wise; a missing column reads as `null`
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn matches(&self, row: &RemoteRow) -> bool {
        let get = |column: &str| row.get(column).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(column, value) => get(column) == value,
            Filter::In(column, values) => values.contains(get(column)),
            Filter::IsNull(column) => get(column).is_null(),
            Filter::NotNull(column) => !get(column).is_null(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), descending: false }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), descending: true }
    }

    /// Compare two rows on the order column; nulls sort first ascending
    pub fn compare(&self, a: &RemoteRow, b: &RemoteRow) -> Ordering {
        let ordering = compare_values(
            a.get(&self.column).unwrap_or(&Value::Null),
            b.get(&self.column).unwrap_or(&Value::Null),
        );
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];
}

/// One realtime notification; `row` is the new row, or the old one on delete
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub row: RemoteRow,
}

pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Live realtime subscription; dropping it stops delivery
pub struct Subscription {
    table: String,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(table: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self { table: table.into(), task }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("table", &self.table).finish()
    }
}

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Cheap connectivity probe; `false` short-circuits remote work
    async fn is_reachable(&self) -> bool;

    async fn select(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> SyncResult<Vec<RemoteRow>>;

    /// Insert or replace rows matched on `conflict_key`
    async fn upsert(&self, table: &str, rows: Vec<RemoteRow>, conflict_key: &str) -> SyncResult<()>;

    /// Patch the row with this `id`; no matching row is not an error
    async fn update(&self, table: &str, id: &str, patch: RemoteRow) -> SyncResult<()>;

    async fn delete(&self, table: &str, id: &str) -> SyncResult<()>;

    async fn count(&self, table: &str, filters: &[Filter]) -> SyncResult<u64>;

    async fn rpc(&self, function: &str, args: Value) -> SyncResult<Value>;

    /// Store a blob and return its public URL
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> SyncResult<String>;

    async fn subscribe(&self, table: &str, kinds: &[ChangeKind], callback: ChangeCallback) -> SyncResult<Subscription>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RemoteRow {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_filters() {
        let r = row(json!({"id": "v1", "valve_id": "a", "deleted_at": null}));

        assert!(Filter::equals("valve_id", "a").matches(&r));
        assert!(!Filter::equals("valve_id", "b").matches(&r));
        assert!(Filter::In("id".into(), vec![json!("v0"), json!("v1")]).matches(&r));
        assert!(Filter::IsNull("deleted_at".into()).matches(&r));
        assert!(Filter::IsNull("missing".into()).matches(&r));
        assert!(!Filter::NotNull("deleted_at".into()).matches(&r));
    }

    #[test]
    fn test_order() {
        let mut rows = vec![
            row(json!({"changed_at": "2024-01-02"})),
            row(json!({"changed_at": null})),
            row(json!({"changed_at": "2024-01-03"})),
        ];

        let order = Order::desc("changed_at");
        rows.sort_by(|a, b| order.compare(a, b));

        assert_eq!(rows[0]["changed_at"], json!("2024-01-03"));
        assert_eq!(rows[2]["changed_at"], Value::Null);
    }
}
