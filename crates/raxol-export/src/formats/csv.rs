//! CSV with a header row built from the sorted union of every key seen in
//! the event set.
//!
//! Events carry different optional fields, so a key missing from an event
//! renders as an empty cell. Nested values (`metadata`, array details) are
//! written as compact JSON.

use std::collections::BTreeSet;

use serde_json::Value;

use raxol_contracts::{AuditEvent, AuditResult};

use super::event_object;

pub fn encode(events: &[AuditEvent], include_metadata: bool) -> AuditResult<Vec<u8>> {
    let rows = events
        .iter()
        .map(|e| event_object(e, include_metadata))
        .collect::<AuditResult<Vec<_>>>()?;

    let header: BTreeSet<&str> = rows.iter().flat_map(|r| r.keys().map(String::as_str)).collect();

    let mut out = String::new();
    push_row(&mut out, header.iter().map(|k| k.to_string()));
    for row in &rows {
        push_row(
            &mut out,
            header.iter().map(|key| row.get(*key).map(cell).unwrap_or_default()),
        );
    }
    Ok(out.into_bytes())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let escaped: Vec<String> = cells.map(|c| escape(&c)).collect();
    out.push_str(&escaped.join(","));
    out.push('\n');
}

/// RFC 4180 quoting: fields containing a comma, quote or line break are
/// wrapped in quotes with inner quotes doubled.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
