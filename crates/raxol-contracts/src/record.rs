//! The on-disk record shape: a plaintext event or an encrypted wrapper.
//!
//! One record is one NDJSON line. Encrypted records only expose the fields
//! needed to place them in a dated file, order them and deduplicate them;
//! everything else is inside the AES-256-GCM ciphertext.

use serde::{Deserialize, Serialize};

use crate::event::AuditEvent;

/// The cipher identifier written into every sealed record.
pub const SEALED_ALGORITHM: &str = "aes-256-gcm";

/// An encrypted event as persisted.
///
/// `data` and `iv` are standard base64. The plaintext is the full signed
/// event JSON, so a holder of the key can still verify its signature after
/// opening it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealedEvent {
    pub event_id: String,
    pub timestamp: i64,
    pub encrypted: bool,
    pub algorithm: String,
    pub iv: String,
    pub data: String,
}

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredRecord {
    Sealed(SealedEvent),
    Plain(AuditEvent),
}

impl StoredRecord {
    pub fn event_id(&self) -> &str {
        match self {
            StoredRecord::Sealed(s) => &s.event_id,
            StoredRecord::Plain(e) => &e.event_id,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            StoredRecord::Sealed(s) => s.timestamp,
            StoredRecord::Plain(e) => e.timestamp,
        }
    }

    /// The plaintext event, or `None` for a sealed record.
    pub fn as_event(&self) -> Option<&AuditEvent> {
        match self {
            StoredRecord::Sealed(_) => None,
            StoredRecord::Plain(e) => Some(e),
        }
    }

    pub fn into_event(self) -> Option<AuditEvent> {
        match self {
            StoredRecord::Sealed(_) => None,
            StoredRecord::Plain(e) => Some(e),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, StoredRecord::Sealed(_))
    }
}

impl From<AuditEvent> for StoredRecord {
    fn from(event: AuditEvent) -> Self {
        StoredRecord::Plain(event)
    }
}

impl From<SealedEvent> for StoredRecord {
    fn from(sealed: SealedEvent) -> Self {
        StoredRecord::Sealed(sealed)
    }
}
