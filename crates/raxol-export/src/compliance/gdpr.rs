//! GDPR accountability articles.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use raxol_contracts::event::iso8601;
use raxol_contracts::{AuditEvent, Category, Outcome, Severity};

use super::{classification, has_outcome, Control};

/// Event type written for data subject requests.
pub const DSR_EVENT_TYPE: &str = "data_subject_request";

fn is_dsr(event: &AuditEvent) -> bool {
    event.category == Category::Privacy && event.event_type() == DSR_EVENT_TYPE
}

fn is_personal_data_access(event: &AuditEvent) -> bool {
    event.category == Category::DataAccess && classification(event).as_deref() == Some("pii")
}

pub(super) fn controls() -> Vec<Control> {
    vec![
        Control {
            id: "Art.5(1)(f)",
            title: "Integrity and confidentiality",
            applies: is_personal_data_access,
            exception: |e| e.body.user_id.is_none(),
            exception_rule: "personal data access without an identified user",
        },
        Control {
            id: "Art.12-22",
            title: "Data subject rights",
            applies: is_dsr,
            exception: |e| !has_outcome(e, &[Outcome::Success]),
            exception_rule: "requests not completed",
        },
        Control {
            id: "Art.30",
            title: "Records of processing activities",
            applies: |e| matches!(e.category, Category::DataAccess | Category::Privacy),
            exception: |e| e.body.action.is_none(),
            exception_rule: "processing records without a stated operation",
        },
        Control {
            id: "Art.32",
            title: "Security of processing",
            applies: |e| e.category == Category::Security,
            exception: |e| e.severity.is_alerting(),
            exception_rule: "high or critical security events",
        },
        Control {
            id: "Art.33",
            title: "Breach notification",
            applies: |e| e.category == Category::Security,
            exception: |e| e.severity == Severity::Critical,
            exception_rule: "critical security events that may require notification within 72 hours",
        },
    ]
}

/// `data_subject_requests`: per-request detail and a completion rate.
pub(super) fn artifacts(events: &[AuditEvent]) -> BTreeMap<String, Value> {
    let requests: Vec<&AuditEvent> = events.iter().filter(|e| is_dsr(e)).collect();
    let completed = requests.iter().filter(|e| has_outcome(e, &[Outcome::Success])).count();
    let rejected = requests
        .iter()
        .filter(|e| has_outcome(e, &[Outcome::Denied, Outcome::Failure, Outcome::Error]))
        .count();
    let pending = requests.len() - completed - rejected;

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for request in &requests {
        let kind = request.body.action.clone().unwrap_or_else(|| "unspecified".to_string());
        *by_type.entry(kind).or_insert(0) += 1;
    }

    // With no requests there is nothing out of compliance.
    let compliance_rate = if requests.is_empty() {
        1.0
    } else {
        completed as f64 / requests.len() as f64
    };

    let detail: Vec<Value> = requests
        .iter()
        .map(|e| {
            json!({
                "event_id": e.event_id,
                "timestamp": iso8601(e.timestamp),
                "subject_id": e.body.user_id,
                "request_type": e.body.action,
                "outcome": e.body.outcome,
            })
        })
        .collect();

    let mut artifacts = BTreeMap::new();
    artifacts.insert(
        "data_subject_requests".to_string(),
        json!({
            "total": requests.len(),
            "completed": completed,
            "rejected": rejected,
            "pending": pending,
            "by_type": by_type,
            "compliance_rate": compliance_rate,
            "requests": detail,
        }),
    );
    artifacts
}
