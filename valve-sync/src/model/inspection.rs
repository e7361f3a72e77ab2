use super::{loose, ChildEntity, SyncEntity};
use crate::local_store::Partition;
use crate::schema::{FieldKind, FieldMapping};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visual inspection of a valve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Inspection {
    #[serde(deserialize_with = "loose::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub valve_id: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub inspection_date: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub inspector: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub inspection_type: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub condition: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub findings: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub recommendations: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub pass_fail: Option<String>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Bench test of a valve's set and reseat pressures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestReport {
    #[serde(deserialize_with = "loose::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub valve_id: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub test_date: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub tested_by: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub test_medium: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub set_pressure: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub popped_at: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub reseat_pressure: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub seat_leakage: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub result: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub notes: Option<String>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

macro_rules! impl_child_entity {
    ($ty:ty, $partition:expr, $table:literal, $kind:literal, $fields:expr) => {
        impl SyncEntity for $ty {
            const PARTITION: Partition = $partition;
            const REMOTE_TABLE: &'static str = $table;
            const KIND: &'static str = $kind;
            const FIELDS: &'static [FieldMapping] = $fields;

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
        }

        impl ChildEntity for $ty {
            fn valve_id(&self) -> Option<&str> {
                self.valve_id.as_deref()
            }
        }
    };
}

impl_child_entity!(
    Inspection,
    Partition::Inspections,
    "inspections",
    "inspection",
    &[
        FieldMapping::new("id", "id", FieldKind::Text),
        FieldMapping::new("valveId", "valve_id", FieldKind::Text),
        FieldMapping::new("inspectionDate", "inspection_date", FieldKind::Date),
        FieldMapping::new("inspector", "inspector", FieldKind::Text),
        FieldMapping::new("inspectionType", "inspection_type", FieldKind::Text),
        FieldMapping::new("condition", "condition", FieldKind::Text),
        FieldMapping::new("findings", "findings", FieldKind::Text),
        FieldMapping::new("recommendations", "recommendations", FieldKind::Text),
        FieldMapping::new("passFail", "pass_fail", FieldKind::Text),
        FieldMapping::new("createdAt", "created_at", FieldKind::Timestamp),
        FieldMapping::new("updatedAt", "updated_at", FieldKind::Timestamp),
    ]
);

impl_child_entity!(
    TestReport,
    Partition::TestReports,
    "test_reports",
    "test report",
    &[
        FieldMapping::new("id", "id", FieldKind::Text),
        FieldMapping::new("valveId", "valve_id", FieldKind::Text),
        FieldMapping::new("testDate", "test_date", FieldKind::Date),
        FieldMapping::new("testedBy", "tested_by", FieldKind::Text),
        FieldMapping::new("testMedium", "test_medium", FieldKind::Text),
        FieldMapping::new("setPressure", "set_pressure", FieldKind::Numeric),
        FieldMapping::new("poppedAt", "popped_at", FieldKind::Numeric),
        FieldMapping::new("reseatPressure", "reseat_pressure", FieldKind::Numeric),
        FieldMapping::new("seatLeakage", "seat_leakage", FieldKind::Text),
        FieldMapping::new("result", "result", FieldKind::Text),
        FieldMapping::new("notes", "notes", FieldKind::Text),
        FieldMapping::new("createdAt", "created_at", FieldKind::Timestamp),
        FieldMapping::new("updatedAt", "updated_at", FieldKind::Timestamp),
    ]
);
