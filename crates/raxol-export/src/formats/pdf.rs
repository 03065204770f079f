//! HTML documents handed to the `PdfRenderer`.
//!
//! Layout is fixed per template. The renderer turns the HTML into PDF bytes;
//! `HtmlPassthrough` is used when no real backend is configured.

use std::collections::BTreeMap;

use raxol_contracts::event::iso8601;
use raxol_contracts::{AuditEvent, AuditResult, Severity};
use raxol_core::PdfRenderer;

use super::message_of;
use super::xml::escape;
use crate::options::PdfTemplate;

/// A renderer that returns the HTML document unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlPassthrough;

impl PdfRenderer for HtmlPassthrough {
    fn render(&self, html: &str) -> AuditResult<Vec<u8>> {
        Ok(html.as_bytes().to_vec())
    }
}

const STYLE: &str = "body{font-family:sans-serif;font-size:11px}\
table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #999;padding:3px;text-align:left}\
.critical{color:#b00}.high{color:#d60}";

pub fn render_html(events: &[AuditEvent], template: PdfTemplate, exported_at: i64) -> String {
    let title = match template {
        PdfTemplate::Default => "Audit Log Export",
        PdfTemplate::Executive => "Audit Summary",
        PdfTemplate::Technical => "Audit Log Export (Technical)",
    };
    let mut html = document_head(title);
    html.push_str(&format!(
        "<p>Generated {} &middot; {} events</p>\n",
        iso8601(exported_at),
        events.len()
    ));
    html.push_str(&severity_table(events));

    match template {
        PdfTemplate::Default => html.push_str(&event_table(events, false)),
        PdfTemplate::Technical => html.push_str(&event_table(events, true)),
        PdfTemplate::Executive => html.push_str(&highlights(events)),
    }

    html.push_str("</body>\n</html>\n");
    html
}

pub(crate) fn document_head(title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{t}</title><style>{s}</style></head>\n<body>\n<h1>{t}</h1>\n",
        t = escape(title),
        s = STYLE
    )
}

fn severity_table(events: &[AuditEvent]) -> String {
    let mut counts: BTreeMap<Severity, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.severity).or_default() += 1;
    }
    let mut html = String::from("<h2>By severity</h2>\n<table><tr><th>Severity</th><th>Events</th></tr>\n");
    for severity in Severity::ALL.iter().rev() {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            severity,
            counts.get(severity).copied().unwrap_or(0)
        ));
    }
    html.push_str("</table>\n");
    html
}

fn event_table(events: &[AuditEvent], technical: bool) -> String {
    let mut html = String::from("<h2>Events</h2>\n<table><tr><th>Time</th><th>Severity</th><th>Category</th><th>Type</th><th>User</th><th>Message</th>");
    if technical {
        html.push_str("<th>Event ID</th><th>Session</th><th>Source IP</th><th>Node</th><th>Signature</th>");
    }
    html.push_str("</tr>\n");

    for event in events {
        let body = &event.body;
        html.push_str(&format!(
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>",
            event.severity,
            iso8601(event.timestamp),
            event.severity,
            event.category,
            escape(event.event_type()),
            escape(body.user_id.as_deref().unwrap_or("")),
            escape(message_of(event)),
        ));
        if technical {
            html.push_str(&format!(
                "<td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>",
                escape(&event.event_id),
                escape(body.session_id.as_deref().unwrap_or("")),
                escape(body.ip_address.as_deref().unwrap_or("")),
                escape(event.node.as_deref().unwrap_or("")),
                match (&event.signature, &event.degraded) {
                    (_, Some(reason)) => format!("degraded: {}", escape(reason)),
                    (Some(sig), None) => escape(sig),
                    (None, None) => "unsigned".to_string(),
                },
            ));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
    html
}

fn highlights(events: &[AuditEvent]) -> String {
    let alerting: Vec<&AuditEvent> = events.iter().filter(|e| e.severity.is_alerting()).collect();

    let mut per_user: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        if let Some(user) = event.body.user_id.as_deref() {
            *per_user.entry(user).or_default() += 1;
        }
    }
    let mut top_users: Vec<(&str, usize)> = per_user.into_iter().collect();
    top_users.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let mut html = format!("<h2>Highlights</h2>\n<p>{} high or critical events.</p>\n<ul>\n", alerting.len());
    for event in alerting.iter().take(10) {
        html.push_str(&format!(
            "<li class=\"{}\">{} {}: {}</li>\n",
            event.severity,
            iso8601(event.timestamp),
            escape(event.event_type()),
            escape(message_of(event))
        ));
    }
    html.push_str("</ul>\n<h2>Most active users</h2>\n<ol>\n");
    for (user, count) in top_users.iter().take(5) {
        html.push_str(&format!("<li>{} ({})</li>\n", escape(user), count));
    }
    html.push_str("</ol>\n");
    html
}
