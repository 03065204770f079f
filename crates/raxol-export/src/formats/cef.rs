//! ArcSight Common Event Format.
//!
//! ```text
//! CEF:0|Raxol|Terminal|1.0|<event_type>|<event_id>|<severity>|rt=<ISO8601> duser=<user_id> src=<ip_address> act=<action> outcome=<outcome> msg=<message>
//! ```

use raxol_contracts::event::iso8601;
use raxol_contracts::{AuditEvent, Severity};

use super::{message_of, or_empty};

/// CEF severity on the 0-10 scale.
pub fn severity_code(severity: Severity) -> u8 {
    match severity {
        Severity::Info => 0,
        Severity::Low => 3,
        Severity::Medium => 6,
        Severity::High => 8,
        Severity::Critical => 10,
    }
}

pub fn line(event: &AuditEvent) -> String {
    let body = &event.body;
    format!(
        "CEF:0|Raxol|Terminal|1.0|{}|{}|{}|rt={} duser={} src={} act={} outcome={} msg={}",
        escape_header(event.event_type()),
        escape_header(&event.event_id),
        severity_code(event.severity),
        iso8601(event.timestamp),
        escape_extension(or_empty(&body.user_id)),
        escape_extension(or_empty(&body.ip_address)),
        escape_extension(or_empty(&body.action)),
        body.outcome.map(|o| o.as_str()).unwrap_or(""),
        escape_extension(message_of(event)),
    )
}

/// Header fields escape backslash and pipe.
fn escape_header(value: &str) -> String {
    value.replace('\\', "\\\\").replace('|', "\\|")
}

/// Extension values escape backslash, `=` and line breaks.
pub fn escape_extension(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '=' => out.push_str("\\="),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}
