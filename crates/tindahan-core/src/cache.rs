//! # Read-Cache Patches
//!
//! Pure functions over cached entity lists. A cached list is a slice of
//! JSON records keyed by `_id`; every change is described by a
//! [`CachePatch`] and applied with [`apply_patch`], which returns a new
//! list and leaves its input untouched.
//!
//! ## Patch Lifecycle for an Offline Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   offline create {name:"Drinks"}                                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   InsertIfAbsent({_id:"temp_…", name:"Drinks", createdAt, updatedAt})  │
//! │        │                                                                │
//! │        ├── replay accepted ──► Replace{id:"temp_…", record:{_id:"real"}}│
//! │        │                                                                │
//! │        └── replay abandoned ─► Remove{id:"temp_…"}                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::{DEFAULT_SCOPE, ID_FIELD, SCOPE_FIELD};

/// A structured change to one cached list.
#[derive(Debug, Clone, PartialEq)]
pub enum CachePatch {
    /// Appends the record unless a record with the same `_id` is present.
    InsertIfAbsent(Value),
    /// Replaces the record keyed by `id` in place. Appends when absent.
    Replace { id: String, record: Value },
    /// Shallow-merges `fields` into the record keyed by `id`.
    Merge { id: String, fields: Value },
    /// Drops the record keyed by `id`.
    Remove { id: String },
}

impl CachePatch {
    /// The key the patch addresses, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            CachePatch::InsertIfAbsent(record) => record_id(record),
            CachePatch::Replace { id, .. }
            | CachePatch::Merge { id, .. }
            | CachePatch::Remove { id } => Some(id),
        }
    }
}

/// Returns the `_id` of a cached record.
pub fn record_id(record: &Value) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// Returns the owning store of a record, or the default scope.
pub fn record_scope(record: &Value) -> &str {
    record
        .get(SCOPE_FIELD)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SCOPE)
}

fn timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn object_of(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Builds the optimistic record shown for an offline create.
pub fn optimistic_create(payload: &Value, temp_id: &str, now: DateTime<Utc>) -> Value {
    let mut record = object_of(payload);
    record.insert(ID_FIELD.to_string(), Value::String(temp_id.to_string()));
    record.insert("createdAt".to_string(), timestamp(now));
    record.insert("updatedAt".to_string(), timestamp(now));
    Value::Object(record)
}

/// Builds the fields merged into a cached record for an offline update.
pub fn optimistic_update(patch: &Value, now: DateTime<Utc>) -> Value {
    let mut fields = object_of(patch);
    fields.remove(ID_FIELD);
    fields.insert("updatedAt".to_string(), timestamp(now));
    Value::Object(fields)
}

/// Gives a locally edited record the id the server assigned to it.
///
/// Fields of `local` win over `server`, except `_id`, which comes from
/// `server`. Used when a create is accepted while later offline edits of
/// the same record are still queued.
pub fn adopt_server_id(local: &Value, server: &Value) -> Value {
    let mut record = object_of(server);
    for (field, value) in object_of(local) {
        if field != ID_FIELD {
            record.insert(field, value);
        }
    }
    Value::Object(record)
}

/// Applies a patch, returning the new list.
///
/// Never yields two records with the same `_id`.
pub fn apply_patch(records: &[Value], patch: &CachePatch) -> Vec<Value> {
    match patch {
        CachePatch::InsertIfAbsent(record) => {
            let mut out = records.to_vec();
            let present = record_id(record)
                .map(|id| records.iter().any(|r| record_id(r) == Some(id)))
                .unwrap_or(false);
            if !present {
                out.push(record.clone());
            }
            out
        }
        CachePatch::Replace { id, record } => {
            let new_id = record_id(record);
            let mut out = Vec::with_capacity(records.len() + 1);
            let mut placed = false;

            for existing in records {
                let existing_id = record_id(existing);
                let matches_old = existing_id == Some(id.as_str());
                let matches_new = new_id.is_some() && existing_id == new_id;
                if matches_old || matches_new {
                    if !placed {
                        out.push(record.clone());
                        placed = true;
                    }
                    continue;
                }
                out.push(existing.clone());
            }

            if !placed {
                out.push(record.clone());
            }
            out
        }
        CachePatch::Merge { id, fields } => records
            .iter()
            .map(|existing| {
                if record_id(existing) != Some(id.as_str()) {
                    return existing.clone();
                }
                let mut merged = object_of(existing);
                if let Some(fields) = fields.as_object() {
                    for (key, value) in fields {
                        if key != ID_FIELD {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                }
                Value::Object(merged)
            })
            .collect(),
        CachePatch::Remove { id } => records
            .iter()
            .filter(|r| record_id(r) != Some(id.as_str()))
            .cloned()
            .collect(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
