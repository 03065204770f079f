//! RFC 5424 syslog lines, facility local0.
//!
//! ```text
//! <PRI>1 TIMESTAMP HOSTNAME raxol - MSGID [raxol@32473 ...] MSG
//! ```

use raxol_contracts::event::iso8601;
use raxol_contracts::{AuditEvent, Severity};

use super::{message_of, or_empty};

/// local0
pub const FACILITY: u8 = 16;

const APP_NAME: &str = "raxol";
const SD_ID: &str = "raxol@32473";
const NIL: &str = "-";

/// Syslog severity code for an audit severity.
pub fn severity_code(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 2,
        Severity::High => 3,
        Severity::Medium => 4,
        Severity::Low => 5,
        Severity::Info => 6,
    }
}

pub fn priority(severity: Severity) -> u8 {
    FACILITY * 8 + severity_code(severity)
}

pub fn line(event: &AuditEvent) -> String {
    let body = &event.body;
    let params = [
        ("event_id", event.event_id.as_str()),
        ("category", event.category.as_str()),
        ("severity", event.severity.as_str()),
        ("user_id", or_empty(&body.user_id)),
        ("ip_address", or_empty(&body.ip_address)),
    ];
    let structured: String = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!(" {}=\"{}\"", k, escape_param(v)))
        .collect();

    let message = message_of(event);
    let mut out = format!(
        "<{}>1 {} {} {} {} {} [{}{}]",
        priority(event.severity),
        iso8601(event.timestamp),
        hostname(event),
        APP_NAME,
        NIL,
        header_token(event.event_type(), 32),
        SD_ID,
        structured,
    );
    if !message.is_empty() {
        out.push(' ');
        out.push_str(&message.replace(['\n', '\r'], " "));
    }
    out
}

/// Host part of the enriched node name (`app@host`), or NILVALUE.
fn hostname(event: &AuditEvent) -> String {
    match event.node.as_deref() {
        Some(node) if !node.is_empty() => {
            let host = node.rsplit('@').next().unwrap_or(node);
            header_token(host, 255)
        }
        _ => NIL.to_string(),
    }
}

/// Header fields are printable ASCII without spaces, bounded in length.
fn header_token(value: &str, max: usize) -> String {
    let token: String = value
        .chars()
        .filter(|c| c.is_ascii_graphic())
        .take(max)
        .collect();
    if token.is_empty() {
        NIL.to_string()
    } else {
        token
    }
}

/// PARAM-VALUE escapes `"`, `\` and `]`.
fn escape_param(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
