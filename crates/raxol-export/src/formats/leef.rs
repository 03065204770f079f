//! IBM QRadar Log Event Extended Format 2.0.
//!
//! `devTime` carries epoch milliseconds, which QRadar reads without a
//! `devTimeFormat` attribute.

use raxol_contracts::AuditEvent;

use super::or_empty;

pub fn line(event: &AuditEvent) -> String {
    let body = &event.body;
    format!(
        "LEEF:2.0|Raxol|Terminal|1.0|{}|devTime={}|usrName={}|src={}|action={}|severity={}",
        clean(event.event_type()),
        event.timestamp,
        clean(or_empty(&body.user_id)),
        clean(or_empty(&body.ip_address)),
        clean(or_empty(&body.action)),
        event.severity,
    )
}

/// `|` delimits attributes and a line break ends the record; neither may
/// appear inside a value.
fn clean(value: &str) -> String {
    value.replace(['|', '\n', '\r'], " ")
}
