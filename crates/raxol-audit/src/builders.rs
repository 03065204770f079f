//! Category-specific event builders.
//!
//! Each function fixes the category, derives the severity from the event's
//! own fields and fills the conventional `event_type`, `action` and details
//! for that kind of event. The `AuditLogger::log_*` helpers are thin wrappers
//! around these.

use std::collections::BTreeMap;

use serde_json::Value;

use raxol_contracts::{AuditEvent, Category, EventBody, Outcome, Severity};

/// Event type used for data subject requests.
pub use raxol_export::compliance::DSR_EVENT_TYPE;

/// Who triggered an event and from where.
///
/// Every field is optional; whatever is set is copied into the event body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn apply(self, mut body: EventBody) -> EventBody {
        if body.user_id.is_none() {
            body.user_id = self.user_id;
        }
        body.session_id = self.session_id.or(body.session_id);
        body.ip_address = self.ip_address.or(body.ip_address);
        body.metadata.extend(self.metadata);
        body
    }
}

// ── Severity rules ────────────────────────────────────────────────────────────

pub fn authentication_severity(outcome: Outcome) -> Severity {
    match outcome {
        Outcome::Success => Severity::Info,
        Outcome::Failure | Outcome::Denied => Severity::Medium,
        Outcome::Error | Outcome::Partial | Outcome::Unknown => Severity::Low,
    }
}

pub fn authorization_severity(outcome: Outcome) -> Severity {
    match outcome {
        Outcome::Success => Severity::Info,
        Outcome::Denied | Outcome::Failure => Severity::Medium,
        Outcome::Error | Outcome::Partial | Outcome::Unknown => Severity::Low,
    }
}

/// Destructive or exfiltrating operations outrank sensitive classifications.
pub fn data_access_severity(operation: &str, classification: Option<&str>) -> Severity {
    let operation = operation.to_ascii_lowercase();
    if operation == "delete" || operation == "export" {
        return Severity::Medium;
    }
    match classification.map(str::to_ascii_lowercase).as_deref() {
        Some("pii" | "phi" | "cardholder") => Severity::Low,
        _ => Severity::Info,
    }
}

// ── Builders ──────────────────────────────────────────────────────────────────

pub fn authentication(
    user_id: &str,
    method: &str,
    outcome: Outcome,
    context: EventContext,
) -> AuditEvent {
    let body = EventBody::new(format!("authentication_{}", outcome))
        .user(user_id)
        .action("authenticate")
        .outcome(outcome)
        .detail("auth_method", method);
    AuditEvent::new(Category::Authentication, authentication_severity(outcome), context.apply(body))
}

pub fn authorization(
    user_id: &str,
    resource_type: &str,
    resource_id: &str,
    action: &str,
    outcome: Outcome,
    denial_reason: Option<&str>,
    context: EventContext,
) -> AuditEvent {
    let mut body = EventBody::new(format!("authorization_{}", outcome))
        .user(user_id)
        .resource(resource_type, resource_id)
        .action(action)
        .outcome(outcome);
    if let Some(reason) = denial_reason {
        body = body.denial_reason(reason);
    }
    AuditEvent::new(Category::Authorization, authorization_severity(outcome), context.apply(body))
}

/// `operation` is the verb (`read`, `write`, `delete`, `export`, ...);
/// `classification` tags the data (`pii`, `phi`, `cardholder`, ...).
pub fn data_access(
    user_id: &str,
    operation: &str,
    resource_type: &str,
    resource_id: &str,
    classification: Option<&str>,
    context: EventContext,
) -> AuditEvent {
    let mut body = EventBody::new(format!("data_{}", operation.to_ascii_lowercase()))
        .user(user_id)
        .resource(resource_type, resource_id)
        .action(operation)
        .outcome(Outcome::Success);
    if let Some(classification) = classification {
        body = body.detail("classification", classification);
    }
    let severity = data_access_severity(operation, classification);
    AuditEvent::new(Category::DataAccess, severity, context.apply(body))
}

pub fn configuration_change(
    user_id: &str,
    setting: &str,
    old_value: Value,
    new_value: Value,
    context: EventContext,
) -> AuditEvent {
    let body = EventBody::new("configuration_change")
        .user(user_id)
        .resource("setting", setting)
        .action("update")
        .outcome(Outcome::Success)
        .detail("old_value", old_value)
        .detail("new_value", new_value);
    AuditEvent::new(Category::Configuration, Severity::Medium, context.apply(body))
}

pub fn security(
    event_type: &str,
    severity: Severity,
    description: &str,
    context: EventContext,
) -> AuditEvent {
    let body = EventBody::new(event_type).description(description);
    AuditEvent::new(Category::Security, severity, context.apply(body))
}

/// Severity defaults to info.
pub fn terminal_command(
    user_id: &str,
    command: &str,
    outcome: Outcome,
    severity: Option<Severity>,
    context: EventContext,
) -> AuditEvent {
    let body = EventBody::new("terminal_command")
        .user(user_id)
        .action("execute")
        .command(command)
        .outcome(outcome);
    AuditEvent::new(Category::Terminal, severity.unwrap_or(Severity::Info), context.apply(body))
}

pub fn compliance(event_type: &str, description: &str, context: EventContext) -> AuditEvent {
    let body = EventBody::new(event_type).description(description);
    AuditEvent::new(Category::Compliance, Severity::Info, context.apply(body))
}

/// A data subject request (`access`, `erasure`, `portability`, ...) about
/// `subject_id`. A request with no outcome yet is pending.
pub fn privacy(
    subject_id: &str,
    request_type: &str,
    outcome: Option<Outcome>,
    context: EventContext,
) -> AuditEvent {
    let mut body = EventBody::new(DSR_EVENT_TYPE)
        .resource("data_subject", subject_id)
        .action(request_type);
    if let Some(outcome) = outcome {
        body = body.outcome(outcome);
    }
    AuditEvent::new(Category::Privacy, Severity::Low, context.apply(body))
}
