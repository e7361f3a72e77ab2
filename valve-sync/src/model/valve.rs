use super::attachment::Attachment;
use super::{loose, SyncEntity};
use crate::local_store::Partition;
use crate::schema::{FieldKind, FieldMapping};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pressure-relief valve tracked through inspection and test cycles
///
/// Pressures and field dates are kept exactly as typed (text); they are only
/// normalized on the way to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValveRecord {
    #[serde(deserialize_with = "loose::string")]
    pub id: Option<String>,

    // Identification
    #[serde(deserialize_with = "loose::string")]
    pub serial_number: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub tag_number: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub job_number: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub order_number: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub job_id: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub customer: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub location: Option<String>,

    // Specification
    #[serde(deserialize_with = "loose::string")]
    pub valve_type: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub manufacturer: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub model: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub size: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub pressure_class: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub body_material: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub trim_material: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub seat_material: Option<String>,

    // Pressures
    #[serde(deserialize_with = "loose::string")]
    pub set_pressure: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub mawp: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub body_pressure: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub seat_pressure: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub back_pressure: Option<String>,

    // Status and service dates
    #[serde(deserialize_with = "loose::string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub pass_fail: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub date_in: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub date_out: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub test_date: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub next_due_date: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub technician: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub notes: Option<String>,
    #[serde(deserialize_with = "loose::flag")]
    pub in_service: Option<bool>,

    // Map pin
    #[serde(deserialize_with = "loose::number")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "loose::number")]
    pub longitude: Option<f64>,

    #[serde(deserialize_with = "loose::attachment")]
    pub valve_photo: Option<Attachment>,
    #[serde(deserialize_with = "loose::attachments")]
    pub files: Vec<Attachment>,

    #[serde(deserialize_with = "loose::timestamp")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub last_viewed_at: Option<DateTime<Utc>>,
}

impl ValveRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn has_pending_uploads(&self) -> bool {
        self.valve_photo.as_ref().map_or(false, Attachment::is_pending)
            || self.files.iter().any(Attachment::is_pending)
    }
}

const VALVE_FIELDS: &[FieldMapping] = &[
    FieldMapping::new("id", "id", FieldKind::Text),
    FieldMapping::new("serialNumber", "serial_number", FieldKind::Text),
    FieldMapping::new("tagNumber", "tag_number", FieldKind::Text),
    FieldMapping::new("jobNumber", "job_number", FieldKind::Text),
    FieldMapping::new("orderNumber", "order_number", FieldKind::Text),
    FieldMapping::new("jobId", "job_id", FieldKind::Text),
    FieldMapping::new("customer", "customer", FieldKind::Text),
    FieldMapping::new("location", "location", FieldKind::Text),
    FieldMapping::new("valveType", "valve_type", FieldKind::Text),
    FieldMapping::new("manufacturer", "manufacturer", FieldKind::Text),
    FieldMapping::new("model", "model", FieldKind::Text),
    FieldMapping::new("size", "size", FieldKind::Text),
    FieldMapping::new("pressureClass", "pressure_class", FieldKind::Text),
    FieldMapping::new("bodyMaterial", "body_material", FieldKind::Text),
    FieldMapping::new("trimMaterial", "trim_material", FieldKind::Text),
    FieldMapping::new("seatMaterial", "seat_material", FieldKind::Text),
    FieldMapping::new("setPressure", "set_pressure", FieldKind::Numeric),
    FieldMapping::new("mawp", "mawp", FieldKind::Numeric),
    FieldMapping::new("bodyPressure", "body_pressure", FieldKind::Numeric),
    FieldMapping::new("seatPressure", "seat_pressure", FieldKind::Numeric),
    FieldMapping::new("backPressure", "back_pressure", FieldKind::Numeric),
    FieldMapping::new("status", "status", FieldKind::Text),
    FieldMapping::new("passFail", "pass_fail", FieldKind::Text),
    FieldMapping::new("dateIn", "date_in", FieldKind::Date),
    FieldMapping::new("dateOut", "date_out", FieldKind::Date),
    FieldMapping::new("testDate", "test_date", FieldKind::Date),
    FieldMapping::new("nextDueDate", "next_due_date", FieldKind::Date),
    FieldMapping::new("technician", "technician", FieldKind::Text),
    FieldMapping::new("notes", "notes", FieldKind::Text),
    FieldMapping::new("inService", "in_service", FieldKind::Bool),
    FieldMapping::new("latitude", "latitude", FieldKind::Numeric),
    FieldMapping::new("longitude", "longitude", FieldKind::Numeric),
    FieldMapping::new("valvePhoto", "valve_photo", FieldKind::Attachment),
    FieldMapping::new("files", "file_urls", FieldKind::AttachmentList),
    FieldMapping::new("deletedAt", "deleted_at", FieldKind::Timestamp),
    FieldMapping::new("createdAt", "created_at", FieldKind::Timestamp),
    FieldMapping::new("updatedAt", "updated_at", FieldKind::Timestamp),
    FieldMapping::new("lastViewedAt", "last_viewed_at", FieldKind::Timestamp),
];

impl SyncEntity for ValveRecord {
    const PARTITION: Partition = Partition::Records;
    const REMOTE_TABLE: &'static str = "valve_records";
    const KIND: &'static str = "valve record";
    const FIELDS: &'static [FieldMapping] = VALVE_FIELDS;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    /// Newer side wins, except that a remote copy arriving without files
    /// keeps the local attachments
    fn merge_remote(local: &Self, remote: Self) -> Self {
        let mut merged = crate::merge::last_write_wins(local, remote);
        if merged.files.is_empty() && !local.files.is_empty() {
            merged.files = local.files.clone();
        }
        merged
    }
}
