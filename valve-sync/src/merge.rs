//! Last-write-wins reconciliation of local and remote copies

use crate::model::SyncEntity;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Comparable instant in whole milliseconds; a missing timestamp sorts as the epoch
///
/// Sub-millisecond differences are dropped, so two copies within the same
/// millisecond compare equal and the local copy wins the tie.
pub fn instant(at: Option<DateTime<Utc>>) -> i64 {
    at.map(|t| t.timestamp_millis()).unwrap_or(0)
}

/// The copy with the later `updated_at`; ties keep the local copy
pub fn last_write_wins<E: SyncEntity>(local: &E, remote: E) -> E {
    if instant(local.updated_at()) >= instant(remote.updated_at()) {
        local.clone()
    } else {
        remote
    }
}

/// Merge the remote set into the local one
///
/// Remote entities come first in remote order, each resolved against its
/// local copy through [`SyncEntity::merge_remote`]. Local entities the
/// remote has never seen (created offline, not yet pushed) follow. Entities
/// without an id and repeated remote ids are skipped.
pub fn merge_sets<E: SyncEntity>(local: Vec<E>, remote: Vec<E>) -> Vec<E> {
    let mut local_by_id: HashMap<String, E> = HashMap::with_capacity(local.len());
    let mut local_order = Vec::with_capacity(local.len());
    for entity in local {
        if let Some(id) = entity.id().map(str::to_string) {
            local_order.push(id.clone());
            local_by_id.insert(id, entity);
        }
    }

    let mut merged = Vec::with_capacity(remote.len() + local_by_id.len());
    let mut seen = HashSet::with_capacity(remote.len());

    for entity in remote {
        let Some(id) = entity.id().map(str::to_string) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        let resolved = match local_by_id.remove(&id) {
            Some(local) => E::merge_remote(&local, entity),
            None => entity,
        };
        merged.push(resolved);
    }

    for id in local_order {
        if let Some(entity) = local_by_id.remove(&id) {
            merged.push(entity);
        }
    }

    merged
}
