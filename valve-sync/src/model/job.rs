use super::{loose, SyncEntity};
use crate::local_store::Partition;
use crate::schema::{FieldKind, FieldMapping};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer work order grouping valves, with an optional site geofence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Job {
    #[serde(deserialize_with = "loose::string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub client_name: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "loose::string")]
    pub site_address: Option<String>,
    #[serde(deserialize_with = "loose::number")]
    pub geofence_lat: Option<f64>,
    #[serde(deserialize_with = "loose::number")]
    pub geofence_lng: Option<f64>,
    #[serde(deserialize_with = "loose::number")]
    pub geofence_radius_m: Option<f64>,
    #[serde(deserialize_with = "loose::string")]
    pub notes: Option<String>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "loose::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether a point lies inside the job site's geofence
    ///
    /// `None` when the job has no complete geofence.
    pub fn contains(&self, latitude: f64, longitude: f64) -> Option<bool> {
        let (lat, lng, radius) = (self.geofence_lat?, self.geofence_lng?, self.geofence_radius_m?);
        Some(haversine_m(lat, lng, latitude, longitude) <= radius)
    }
}

fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

impl SyncEntity for Job {
    const PARTITION: Partition = Partition::Jobs;
    const REMOTE_TABLE: &'static str = "jobs";
    const KIND: &'static str = "job";
    const FIELDS: &'static [FieldMapping] = &[
        FieldMapping::new("id", "id", FieldKind::Text),
        FieldMapping::new("name", "name", FieldKind::Text),
        FieldMapping::new("clientName", "client_name", FieldKind::Text),
        FieldMapping::new("status", "status", FieldKind::Text),
        FieldMapping::new("siteAddress", "site_address", FieldKind::Text),
        FieldMapping::new("geofenceLat", "geofence_lat", FieldKind::Numeric),
        FieldMapping::new("geofenceLng", "geofence_lng", FieldKind::Numeric),
        FieldMapping::new("geofenceRadiusM", "geofence_radius_m", FieldKind::Numeric),
        FieldMapping::new("notes", "notes", FieldKind::Text),
        FieldMapping::new("createdAt", "created_at", FieldKind::Timestamp),
        FieldMapping::new("updatedAt", "updated_at", FieldKind::Timestamp),
    ];

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
