use super::valve::ValveRecord;
use crate::error::{SyncError, SyncResult};
use crate::schema::{self, RemoteRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote table holding prior versions of valve records
pub const HISTORY_TABLE: &str = "valve_history";

/// A prior version of a valve record, as kept by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub id: String,
    pub valve_id: String,
    pub changed_at: Option<DateTime<Utc>>,
    pub changed_by: Option<String>,
    pub record: ValveRecord,
}

impl HistorySnapshot {
    /// Decode one `valve_history` row; `record_data` holds the old row
    pub fn from_row(row: &RemoteRow) -> SyncResult<Self> {
        let text = |column: &str| row.get(column).and_then(Value::as_str).map(str::to_string);

        let id = text("id").ok_or_else(|| SyncError::Serialization("history row without id".into()))?;
        let valve_id = text("valve_id")
            .ok_or_else(|| SyncError::Serialization(format!("history row {} without valve_id", id)))?;

        let record = match row.get("record_data") {
            Some(Value::Object(snapshot)) => schema::from_remote_row::<ValveRecord>(snapshot)?,
            _ => {
                return Err(SyncError::Serialization(format!(
                    "history row {} has no record_data",
                    id
                )))
            }
        };

        Ok(Self {
            changed_at: text("changed_at").as_deref().and_then(super::loose::parse_timestamp),
            changed_by: text("changed_by"),
            id,
            valve_id,
            record,
        })
    }
}
