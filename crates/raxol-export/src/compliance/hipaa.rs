//! HIPAA Security Rule technical safeguards.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use raxol_contracts::event::iso8601;
use raxol_contracts::{AuditEvent, Category};

use super::{classification, is_failed, Control};

fn is_phi_access(event: &AuditEvent) -> bool {
    event.category == Category::DataAccess && classification(event).as_deref() == Some("phi")
}

pub(super) fn controls() -> Vec<Control> {
    vec![
        Control {
            id: "164.312(a)(1)",
            title: "Access control",
            applies: |e| e.category == Category::Authorization,
            exception: is_failed,
            exception_rule: "denied or failed authorization",
        },
        Control {
            id: "164.312(b)",
            title: "Audit controls",
            applies: |_| true,
            exception: |e| e.degraded.is_some(),
            exception_rule: "events stored without cryptographic protection",
        },
        Control {
            id: "164.312(c)(1)",
            title: "Integrity",
            applies: |_| true,
            exception: |e| e.signature.is_none(),
            exception_rule: "events without an integrity signature",
        },
        Control {
            id: "164.312(d)",
            title: "Person or entity authentication",
            applies: |e| e.category == Category::Authentication,
            exception: is_failed,
            exception_rule: "failed authentication",
        },
        Control {
            id: "164.308(a)(1)(ii)(D)",
            title: "Information system activity review",
            applies: is_phi_access,
            exception: |e| e.body.user_id.is_none(),
            exception_rule: "PHI access without an identified user",
        },
    ]
}

/// `phi_access_log`: every PHI access in the period, oldest first.
pub(super) fn artifacts(events: &[AuditEvent]) -> BTreeMap<String, Value> {
    let mut accesses: Vec<&AuditEvent> = events.iter().filter(|e| is_phi_access(e)).collect();
    accesses.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.event_id.cmp(&b.event_id)));

    let log: Vec<Value> = accesses
        .iter()
        .map(|e| {
            json!({
                "event_id": e.event_id,
                "timestamp": iso8601(e.timestamp),
                "user_id": e.body.user_id,
                "action": e.body.action,
                "resource_type": e.body.resource_type,
                "resource_id": e.body.resource_id,
                "outcome": e.body.outcome,
            })
        })
        .collect();

    let mut artifacts = BTreeMap::new();
    artifacts.insert("phi_access_log".to_string(), Value::Array(log));
    artifacts
}
