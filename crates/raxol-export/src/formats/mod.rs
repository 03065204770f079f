//! Event encoders, one module per wire format.
//!
//! Every encoder is a pure function of the event slice (plus the export
//! timestamp where the format carries one), so output is deterministic for a
//! given input and can be compared byte for byte in tests.

pub mod cef;
pub mod csv;
pub mod json;
pub mod leef;
pub mod pdf;
pub mod syslog;
pub mod xml;

use serde_json::{Map, Value};

use raxol_contracts::{AuditEvent, AuditResult};
use raxol_core::PdfRenderer;

use crate::options::{ExportFormat, ExportOptions};

/// Encode `events` as `format`.
pub fn encode(
    format: ExportFormat,
    events: &[AuditEvent],
    opts: &ExportOptions,
    renderer: &dyn PdfRenderer,
    exported_at: i64,
) -> AuditResult<Vec<u8>> {
    match format {
        ExportFormat::Json => json::encode(events, opts.include_metadata),
        ExportFormat::Csv => csv::encode(events, opts.include_metadata),
        ExportFormat::Cef => Ok(lines(events, cef::line)),
        ExportFormat::Leef => Ok(lines(events, leef::line)),
        ExportFormat::Syslog => Ok(lines(events, syslog::line)),
        ExportFormat::Xml => Ok(xml::encode(events, exported_at).into_bytes()),
        ExportFormat::Pdf => renderer.render(&pdf::render_html(events, opts.template, exported_at)),
    }
}

fn lines(events: &[AuditEvent], line: fn(&AuditEvent) -> String) -> Vec<u8> {
    let mut out = String::new();
    for event in events {
        out.push_str(&line(event));
        out.push('\n');
    }
    out.into_bytes()
}

/// The flat JSON object form of an event, optionally without `metadata`.
pub(crate) fn event_object(event: &AuditEvent, include_metadata: bool) -> AuditResult<Map<String, Value>> {
    let mut object = match serde_json::to_value(event)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if !include_metadata {
        object.remove("metadata");
    }
    Ok(object)
}

/// The human-readable message for line formats: the first populated
/// free-text field.
pub(crate) fn message_of(event: &AuditEvent) -> &str {
    let body = &event.body;
    body.description
        .as_deref()
        .or(body.error_message.as_deref())
        .or(body.denial_reason.as_deref())
        .or(body.command.as_deref())
        .unwrap_or("")
}

pub(crate) fn or_empty(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}
