//! Domain entities synchronized between the device and the backend

pub mod attachment;
pub mod history;
pub mod inspection;
pub mod job;
pub(crate) mod loose;
pub mod valve;

pub use attachment::{Attachment, FileRef, PendingUpload};
pub use history::HistorySnapshot;
pub use inspection::{Inspection, TestReport};
pub use job::Job;
pub use valve::ValveRecord;

use crate::local_store::Partition;
use crate::schema::FieldMapping;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// An entity kept in a local partition and mirrored to a remote table
pub trait SyncEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const PARTITION: Partition;
    const REMOTE_TABLE: &'static str;
    /// Human-readable name used in logs
    const KIND: &'static str;
    /// Bidirectional field mapping; the only place names are translated
    const FIELDS: &'static [FieldMapping];

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn created_at(&self) -> Option<DateTime<Utc>>;
    fn set_created_at(&mut self, at: DateTime<Utc>);
    fn updated_at(&self) -> Option<DateTime<Utc>>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);

    /// Assign an id and creation time to new entities and bump `updated_at`
    fn stamp(&mut self, now: DateTime<Utc>) -> String {
        let id = match self.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = Uuid::new_v4().to_string();
                self.set_id(id.clone());
                id
            }
        };
        if self.created_at().is_none() {
            self.set_created_at(now);
        }
        self.set_updated_at(now);
        id
    }

    /// Resolve a local copy against the remote copy of the same id
    fn merge_remote(local: &Self, remote: Self) -> Self {
        crate::merge::last_write_wins(local, remote)
    }
}

/// An entity attached to a single valve
pub trait ChildEntity: SyncEntity {
    fn valve_id(&self) -> Option<&str>;
}
