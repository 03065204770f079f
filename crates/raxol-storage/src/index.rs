//! Multi-field secondary indexes.
//!
//! Five maps of `field value → set(event_id)`. The indexes are derived data:
//! they are updated additively on every stored batch and can always be
//! rebuilt from the log files.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use raxol_contracts::AuditEvent;

/// The event fields that carry a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedField {
    UserId,
    SessionId,
    ResourceId,
    Severity,
    EventType,
}

impl IndexedField {
    pub const ALL: [IndexedField; 5] = [
        IndexedField::UserId,
        IndexedField::SessionId,
        IndexedField::ResourceId,
        IndexedField::Severity,
        IndexedField::EventType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexedField::UserId => "user_id",
            IndexedField::SessionId => "session_id",
            IndexedField::ResourceId => "resource_id",
            IndexedField::Severity => "severity",
            IndexedField::EventType => "event_type",
        }
    }

    /// The value this field holds on `event`, if any.
    pub fn value_of(&self, event: &AuditEvent) -> Option<String> {
        match self {
            IndexedField::UserId => event.body.user_id.clone(),
            IndexedField::SessionId => event.body.session_id.clone(),
            IndexedField::ResourceId => event.body.resource_id.clone(),
            IndexedField::Severity => Some(event.severity.as_str().to_string()),
            IndexedField::EventType => Some(event.body.event_type.clone()),
        }
    }
}

/// `field → value → event ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIndex {
    maps: BTreeMap<IndexedField, BTreeMap<String, BTreeSet<String>>>,
}

impl FieldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: &AuditEvent) {
        for field in IndexedField::ALL {
            if let Some(value) = field.value_of(event) {
                self.maps
                    .entry(field)
                    .or_default()
                    .entry(value)
                    .or_default()
                    .insert(event.event_id.clone());
            }
        }
    }

    /// True when at least one event has been indexed under `field`.
    pub fn is_populated(&self, field: IndexedField) -> bool {
        self.maps.get(&field).is_some_and(|m| !m.is_empty())
    }

    /// Ids of events whose `field` equals `value`. Empty when none match.
    pub fn lookup(&self, field: IndexedField, value: &str) -> BTreeSet<String> {
        self.maps
            .get(&field)
            .and_then(|m| m.get(value))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of distinct values indexed under `field`.
    pub fn cardinality(&self, field: IndexedField) -> usize {
        self.maps.get(&field).map_or(0, |m| m.len())
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }
}
