//! SOC 2 common criteria.

use raxol_contracts::{AuditEvent, Category};

use super::{is_failed, Control};

pub(super) fn controls() -> Vec<Control> {
    vec![
        Control {
            id: "CC6.1",
            title: "Logical access security",
            applies: |e| matches!(e.category, Category::Authentication | Category::Authorization),
            exception: is_failed,
            exception_rule: "failed or denied authentication and authorization attempts",
        },
        Control {
            id: "CC6.6",
            title: "Access from outside system boundaries",
            applies: |e| e.category == Category::Authentication && e.body.ip_address.is_some(),
            exception: is_failed,
            exception_rule: "failed remote authentication",
        },
        Control {
            id: "CC7.2",
            title: "System operations monitoring",
            applies: |e| matches!(e.category, Category::Security | Category::Terminal),
            exception: |e| e.severity.is_alerting(),
            exception_rule: "high or critical security and terminal events",
        },
        Control {
            id: "CC7.3",
            title: "Audit trail integrity",
            applies: |_| true,
            exception: |e| e.degraded.is_some(),
            exception_rule: "events stored without cryptographic protection",
        },
        Control {
            id: "CC8.1",
            title: "Change management",
            applies: |e| e.category == Category::Configuration,
            exception: unattributed,
            exception_rule: "configuration changes without an acting user",
        },
    ]
}

fn unattributed(event: &AuditEvent) -> bool {
    event.body.user_id.as_deref().map_or(true, str::is_empty)
}
