//! Domain <-> remote row mapping
//!
//! Each entity declares one table of [`FieldMapping`]s; both directions are
//! derived from it. Outbound values are sanitized per [`FieldKind`] so the
//! backend's typed columns never see empty strings or unparsable numbers.

use crate::error::{SyncError, SyncResult};
use crate::model::SyncEntity;
use serde_json::{Map, Value};

/// Column-shaped row exchanged with the remote gateway
pub type RemoteRow = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
    /// Calendar date typed by a technician
    Date,
    /// Audit timestamp set by the system
    Timestamp,
    Bool,
    Attachment,
    AttachmentList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub domain: &'static str,
    pub remote: &'static str,
    pub kind: FieldKind,
}

impl FieldMapping {
    pub const fn new(domain: &'static str, remote: &'static str, kind: FieldKind) -> Self {
        Self { domain, remote, kind }
    }
}

/// Remote column name for a domain field
pub fn remote_column<E: SyncEntity>(domain: &str) -> SyncResult<&'static str> {
    E::FIELDS
        .iter()
        .find(|f| f.domain == domain)
        .map(|f| f.remote)
        .ok_or_else(|| SyncError::Internal(format!("{} has no field {}", E::KIND, domain)))
}

/// Map an entity to a sanitized remote row
pub fn to_remote_row<E: SyncEntity>(entity: &E) -> SyncResult<RemoteRow> {
    let domain = match serde_json::to_value(entity)? {
        Value::Object(map) => map,
        other => {
            return Err(SyncError::Serialization(format!(
                "{} serialized to {} instead of an object",
                E::KIND,
                other
            )))
        }
    };

    let mut row = RemoteRow::new();
    for field in E::FIELDS {
        let raw = domain.get(field.domain).cloned().unwrap_or(Value::Null);
        row.insert(field.remote.to_string(), sanitize(field.kind, raw));
    }
    Ok(row)
}

/// Map a remote row back to an entity
///
/// Columns absent from the row are left at their defaults; unknown columns
/// are ignored.
pub fn from_remote_row<E: SyncEntity>(row: &RemoteRow) -> SyncResult<E> {
    let mut domain = Map::new();
    for field in E::FIELDS {
        if let Some(raw) = row.get(field.remote) {
            domain.insert(field.domain.to_string(), inbound(field.kind, raw.clone()));
        }
    }
    Ok(serde_json::from_value(Value::Object(domain))?)
}

/// Normalize one outbound value for a column of the given kind
pub fn sanitize(kind: FieldKind, value: Value) -> Value {
    match kind {
        FieldKind::Text => value,
        FieldKind::Numeric => sanitize_numeric(value),
        FieldKind::Date | FieldKind::Timestamp => match value {
            Value::String(s) if s.trim().is_empty() => Value::Null,
            other => other,
        },
        FieldKind::Bool => match value {
            Value::Bool(b) => Value::Bool(b),
            Value::String(s) => match s.trim() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Null,
            },
            _ => Value::Null,
        },
        FieldKind::Attachment => match value {
            Value::String(url) if !url.is_empty() => Value::String(url),
            Value::Object(map) => map
                .get("url")
                .and_then(Value::as_str)
                .map(|url| Value::String(url.to_string()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        FieldKind::AttachmentList => match value {
            Value::Array(items) => Value::Array(items.into_iter().filter_map(outbound_file).collect()),
            _ => Value::Array(Vec::new()),
        },
    }
}

/// Empty, unparsable and non-finite values become `null`; anything else is sent as typed
fn sanitize_numeric(value: Value) -> Value {
    match value {
        Value::Number(n) if n.as_f64().map_or(false, f64::is_finite) => Value::Number(n),
        Value::String(s) => {
            let parses = s.trim().parse::<f64>().map_or(false, f64::is_finite);
            if parses {
                Value::String(s)
            } else {
                Value::Null
            }
        }
        _ => Value::Null,
    }
}

/// Stored files become `{url, category, original_name, upload_date}`;
/// pending uploads have no remote form
fn outbound_file(item: Value) -> Option<Value> {
    match item {
        Value::String(url) => Some(serde_json::json!({ "url": url })),
        Value::Object(map) => {
            let url = map.get("url")?.clone();
            let mut file = Map::new();
            file.insert("url".into(), url);
            for (domain, remote) in [
                ("category", "category"),
                ("originalName", "original_name"),
                ("uploadDate", "upload_date"),
            ] {
                if let Some(value) = map.get(domain) {
                    file.insert(remote.into(), value.clone());
                }
            }
            Some(Value::Object(file))
        }
        _ => None,
    }
}

fn inbound(kind: FieldKind, value: Value) -> Value {
    match kind {
        FieldKind::Attachment => inbound_file(value).unwrap_or(Value::Null),
        FieldKind::AttachmentList => match value {
            Value::Array(items) => Value::Array(items.into_iter().filter_map(inbound_file).collect()),
            _ => Value::Array(Vec::new()),
        },
        _ => value,
    }
}

/// Accepts a bare URL string or a snake_case file object
fn inbound_file(item: Value) -> Option<Value> {
    match item {
        Value::String(url) if !url.is_empty() => Some(serde_json::json!({ "url": url })),
        Value::Object(map) => {
            let url = map.get("url")?.clone();
            let mut file = Map::new();
            file.insert("url".into(), url);
            for (remote, domain) in [
                ("category", "category"),
                ("original_name", "originalName"),
                ("upload_date", "uploadDate"),
            ] {
                if let Some(value) = map.get(remote).filter(|v| !v.is_null()) {
                    file.insert(domain.into(), value.clone());
                }
            }
            Some(Value::Object(file))
        }
        _ => None,
    }
}
