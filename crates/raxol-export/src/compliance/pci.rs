//! PCI DSS requirements 7, 8 and 10.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use raxol_contracts::event::iso8601;
use raxol_contracts::{AuditEvent, Category};

use super::{classification, is_failed, Control};

fn is_cde_access(event: &AuditEvent) -> bool {
    event.category == Category::DataAccess && classification(event).as_deref() == Some("cardholder")
}

pub(super) fn controls() -> Vec<Control> {
    vec![
        Control {
            id: "7.2",
            title: "Restrict access by business need to know",
            applies: |e| e.category == Category::Authorization,
            exception: is_failed,
            exception_rule: "denied or failed authorization",
        },
        Control {
            id: "8.3",
            title: "Strong authentication for users",
            applies: |e| e.category == Category::Authentication,
            exception: is_failed,
            exception_rule: "failed authentication",
        },
        Control {
            id: "10.2",
            title: "Audit logs capture cardholder data access",
            applies: is_cde_access,
            exception: |e| e.body.user_id.is_none(),
            exception_rule: "cardholder data access without an identified user",
        },
        Control {
            id: "10.3",
            title: "Audit logs are protected from modification",
            applies: |_| true,
            exception: |e| e.signature.is_none() || e.degraded.is_some(),
            exception_rule: "unsigned or degraded events",
        },
    ]
}

/// `cde_access_list`: who touched cardholder data, how often and what.
pub(super) fn artifacts(events: &[AuditEvent]) -> BTreeMap<String, Value> {
    struct Access<'a> {
        count: usize,
        resources: BTreeSet<&'a str>,
        last_access: i64,
    }

    let mut per_user: BTreeMap<&str, Access> = BTreeMap::new();
    for event in events.iter().filter(|e| is_cde_access(e)) {
        let user = event.body.user_id.as_deref().unwrap_or("unknown");
        let entry = per_user.entry(user).or_insert(Access {
            count: 0,
            resources: BTreeSet::new(),
            last_access: event.timestamp,
        });
        entry.count += 1;
        entry.last_access = entry.last_access.max(event.timestamp);
        if let Some(resource) = event.body.resource_id.as_deref() {
            entry.resources.insert(resource);
        }
    }

    let list: Vec<Value> = per_user
        .into_iter()
        .map(|(user, access)| {
            json!({
                "user_id": user,
                "access_count": access.count,
                "resources": access.resources,
                "last_access": iso8601(access.last_access),
            })
        })
        .collect();

    let mut artifacts = BTreeMap::new();
    artifacts.insert("cde_access_list".to_string(), Value::Array(list));
    artifacts
}
