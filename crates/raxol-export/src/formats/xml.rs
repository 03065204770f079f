//! XML document with one `<Event>` element per record.

use serde_json::Value;

use raxol_contracts::event::iso8601;
use raxol_contracts::AuditEvent;

use super::event_object;

pub fn encode(events: &[AuditEvent], exported_at: i64) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<AuditLog>\n");
    out.push_str(&format!("  <ExportTimestamp>{}</ExportTimestamp>\n", iso8601(exported_at)));
    out.push_str(&format!("  <EventCount>{}</EventCount>\n", events.len()));
    out.push_str("  <Events>\n");
    for event in events {
        out.push_str("    <Event>\n");
        // Serialization of a well-formed event cannot fail; fall back to no fields.
        let fields = event_object(event, true).unwrap_or_default();
        for (key, value) in &fields {
            write_field(&mut out, key, value, 6);
        }
        out.push_str("    </Event>\n");
    }
    out.push_str("  </Events>\n</AuditLog>\n");
    out
}

fn write_field(out: &mut String, key: &str, value: &Value, indent: usize) {
    let name = element_name(key);
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) => {
            out.push_str(&format!("{}<{}>\n", pad, name));
            for (k, v) in map {
                write_field(out, k, v, indent + 2);
            }
            out.push_str(&format!("{}</{}>\n", pad, name));
        }
        Value::Null => out.push_str(&format!("{}<{}/>\n", pad, name)),
        Value::String(s) => out.push_str(&format!("{}<{}>{}</{}>\n", pad, name, escape(s), name)),
        other => out.push_str(&format!(
            "{}<{}>{}</{}>\n",
            pad,
            name,
            escape(&other.to_string()),
            name
        )),
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Map an arbitrary key to a valid XML element name.
fn element_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}
