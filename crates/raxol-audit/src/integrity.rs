//! Signature verification over stored records.

use serde::{Deserialize, Serialize};
use tracing::warn;

use raxol_contracts::{AuditEvent, Category, EventBody, Severity, StoredRecord, TimeRange};
use raxol_core::{EventCipher, EventSigner, SignatureCheck};

/// Event type raised when verification finds tampered records.
pub const INTEGRITY_FAILURE_EVENT: &str = "integrity_check_failed";

/// The outcome of checking every record in a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub window: TimeRange,
    pub checked: usize,
    pub valid: usize,
    /// Records with no signature that were allowed to be unsigned: signing
    /// was off, or the record carries a `degraded` marker.
    pub unsigned: usize,
    /// Sealed records that could not be opened without a cipher.
    pub unverifiable: usize,
    /// Ids whose signature does not match, whose ciphertext fails
    /// authentication, or whose signature was stripped while signing is on.
    pub tampered: Vec<String>,
}

impl IntegrityReport {
    pub fn new(window: TimeRange) -> Self {
        Self {
            window,
            checked: 0,
            valid: 0,
            unsigned: 0,
            unverifiable: 0,
            tampered: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.tampered.is_empty()
    }
}

/// Check every record in `records`.
///
/// Sealed records are opened with `cipher` first. An authentication failure
/// on open counts as tampering: AES-GCM rejects any modified ciphertext.
///
/// With `expect_signed`, an unsigned record without a `degraded` marker is
/// tampered rather than unsigned.
pub fn verify_records(
    window: TimeRange,
    records: &[StoredRecord],
    signer: &EventSigner,
    cipher: Option<&EventCipher>,
    expect_signed: bool,
) -> IntegrityReport {
    let mut report = IntegrityReport::new(window);
    for record in records {
        report.checked += 1;
        let opened;
        let event = match record {
            StoredRecord::Plain(event) => event,
            StoredRecord::Sealed(sealed) => {
                let Some(cipher) = cipher else {
                    report.unverifiable += 1;
                    continue;
                };
                match cipher.open(sealed) {
                    Ok(event) => {
                        opened = event;
                        &opened
                    }
                    Err(e) => {
                        warn!(event_id = %sealed.event_id, error = %e, "sealed record failed to open");
                        report.tampered.push(sealed.event_id.clone());
                        continue;
                    }
                }
            }
        };
        match signer.verify(event) {
            SignatureCheck::Valid => report.valid += 1,
            SignatureCheck::Unsigned if expect_signed && event.degraded.is_none() => {
                warn!(event_id = %event.event_id, "audit event is missing its signature");
                report.tampered.push(event.event_id.clone());
            }
            SignatureCheck::Unsigned => report.unsigned += 1,
            SignatureCheck::Invalid => {
                warn!(event_id = %event.event_id, "audit event signature mismatch");
                report.tampered.push(event.event_id.clone());
            }
        }
    }
    report
}

/// The critical security event raised for a report with tampered records.
pub fn integrity_alert(report: &IntegrityReport) -> AuditEvent {
    let body = EventBody::new(INTEGRITY_FAILURE_EVENT)
        .action("verify")
        .description(format!(
            "{} of {} audit records failed integrity verification",
            report.tampered.len(),
            report.checked
        ))
        .detail("tampered_event_ids", report.tampered.clone())
        .detail("window_start", report.window.start)
        .detail("window_end", report.window.end);
    AuditEvent::new(Category::Security, Severity::Critical, body)
}
