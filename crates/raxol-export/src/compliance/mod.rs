//! Compliance reports for SOC 2, HIPAA, GDPR and PCI DSS.
//!
//! A report is built by running each framework's fixed list of controls over
//! every event in the requested time range. A control counts the events that
//! serve as evidence for it and, among those, the exceptions a reviewer must
//! look at. Frameworks with domain-specific deliverables (GDPR data subject
//! requests, the HIPAA PHI access log, the PCI cardholder data environment
//! access list) add them as named artifacts.

mod gdpr;
mod hipaa;
mod pci;
mod soc2;

pub use gdpr::DSR_EVENT_TYPE;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use raxol_contracts::event::{iso8601, now_millis};
use raxol_contracts::{AuditError, AuditEvent, Outcome, TimeRange};

use crate::formats::pdf::document_head;
use crate::formats::xml::escape;

/// How many exception event ids a finding lists.
const SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    Soc2,
    Hipaa,
    Gdpr,
    PciDss,
}

impl Framework {
    pub const ALL: [Framework; 4] = [Framework::Soc2, Framework::Hipaa, Framework::Gdpr, Framework::PciDss];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Soc2 => "soc2",
            Framework::Hipaa => "hipaa",
            Framework::Gdpr => "gdpr",
            Framework::PciDss => "pci_dss",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Framework::Soc2 => "SOC 2",
            Framework::Hipaa => "HIPAA",
            Framework::Gdpr => "GDPR",
            Framework::PciDss => "PCI DSS",
        }
    }

    fn controls(&self) -> Vec<Control> {
        match self {
            Framework::Soc2 => soc2::controls(),
            Framework::Hipaa => hipaa::controls(),
            Framework::Gdpr => gdpr::controls(),
            Framework::PciDss => pci::controls(),
        }
    }

    fn artifacts(&self, events: &[AuditEvent]) -> BTreeMap<String, Value> {
        match self {
            Framework::Soc2 => BTreeMap::new(),
            Framework::Hipaa => hipaa::artifacts(events),
            Framework::Gdpr => gdpr::artifacts(events),
            Framework::PciDss => pci::artifacts(events),
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "soc2" => Ok(Framework::Soc2),
            "hipaa" => Ok(Framework::Hipaa),
            "gdpr" => Ok(Framework::Gdpr),
            "pci" | "pci_dss" | "pcidss" => Ok(Framework::PciDss),
            other => Err(AuditError::UnsupportedFormat {
                format: format!("compliance framework '{}'", other),
            }),
        }
    }
}

/// One evaluated control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    /// Evidence exists and no exceptions were found.
    Satisfied,
    /// Evidence exists but some events need a reviewer's attention.
    NeedsReview,
    /// No event in the period bears on this control.
    NoEvidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFinding {
    pub control_id: String,
    pub title: String,
    pub status: ControlStatus,
    pub evidence_count: usize,
    pub exception_count: usize,
    /// What counts as an exception for this control.
    pub exception_rule: String,
    pub sample_exceptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_events: usize,
    pub period_start: i64,
    pub period_end: i64,
    pub first_event: Option<i64>,
    pub last_event: Option<i64>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub controls_evaluated: usize,
    pub controls_satisfied: usize,
    pub controls_needing_review: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: String,
    pub framework: Framework,
    pub time_range: TimeRange,
    pub generated_at: i64,
    pub findings: Vec<ControlFinding>,
    pub summary: ReportSummary,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, Value>,
}

/// A control analyzer: which events are evidence and which of those are
/// exceptions.
pub(crate) struct Control {
    pub id: &'static str,
    pub title: &'static str,
    pub applies: fn(&AuditEvent) -> bool,
    pub exception: fn(&AuditEvent) -> bool,
    pub exception_rule: &'static str,
}

impl Control {
    fn evaluate(&self, events: &[AuditEvent]) -> ControlFinding {
        let evidence: Vec<&AuditEvent> = events.iter().filter(|e| (self.applies)(e)).collect();
        let exceptions: Vec<&AuditEvent> = evidence.iter().copied().filter(|e| (self.exception)(e)).collect();
        let status = if evidence.is_empty() {
            ControlStatus::NoEvidence
        } else if exceptions.is_empty() {
            ControlStatus::Satisfied
        } else {
            ControlStatus::NeedsReview
        };
        ControlFinding {
            control_id: self.id.to_string(),
            title: self.title.to_string(),
            status,
            evidence_count: evidence.len(),
            exception_count: exceptions.len(),
            exception_rule: self.exception_rule.to_string(),
            sample_exceptions: exceptions
                .iter()
                .take(SAMPLE_LIMIT)
                .map(|e| e.event_id.clone())
                .collect(),
        }
    }
}

/// Evaluate `framework` over `events`, which must already be restricted to
/// `range`.
pub fn build_report(framework: Framework, range: TimeRange, events: &[AuditEvent]) -> ComplianceReport {
    let findings: Vec<ControlFinding> = framework.controls().iter().map(|c| c.evaluate(events)).collect();

    let mut by_severity = BTreeMap::new();
    let mut by_category = BTreeMap::new();
    for event in events {
        *by_severity.entry(event.severity.as_str().to_string()).or_insert(0) += 1;
        *by_category.entry(event.category.as_str().to_string()).or_insert(0) += 1;
    }

    let summary = ReportSummary {
        total_events: events.len(),
        period_start: range.start,
        period_end: range.end,
        first_event: events.iter().map(|e| e.timestamp).min(),
        last_event: events.iter().map(|e| e.timestamp).max(),
        by_severity,
        by_category,
        controls_evaluated: findings.len(),
        controls_satisfied: findings.iter().filter(|f| f.status == ControlStatus::Satisfied).count(),
        controls_needing_review: findings.iter().filter(|f| f.status == ControlStatus::NeedsReview).count(),
    };

    ComplianceReport {
        report_id: uuid::Uuid::new_v4().to_string(),
        framework,
        time_range: range,
        generated_at: now_millis(),
        findings,
        summary,
        artifacts: framework.artifacts(events),
    }
}

impl ComplianceReport {
    pub fn finding(&self, control_id: &str) -> Option<&ControlFinding> {
        self.findings.iter().find(|f| f.control_id == control_id)
    }

    /// HTML rendition for the PDF renderer.
    pub fn to_html(&self) -> String {
        let mut html = document_head(&format!("{} Compliance Report", self.framework.title()));
        html.push_str(&format!(
            "<p>Period {} to {} &middot; generated {} &middot; report {}</p>\n",
            iso8601(self.time_range.start),
            iso8601(self.time_range.end),
            iso8601(self.generated_at),
            escape(&self.report_id)
        ));
        html.push_str(&format!(
            "<p>{} events; {} of {} controls satisfied, {} need review.</p>\n",
            self.summary.total_events,
            self.summary.controls_satisfied,
            self.summary.controls_evaluated,
            self.summary.controls_needing_review
        ));

        html.push_str("<h2>Controls</h2>\n<table><tr><th>Control</th><th>Title</th><th>Status</th><th>Evidence</th><th>Exceptions</th><th>Exception rule</th></tr>\n");
        for f in &self.findings {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{:?}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&f.control_id),
                escape(&f.title),
                f.status,
                f.evidence_count,
                f.exception_count,
                escape(&f.exception_rule)
            ));
        }
        html.push_str("</table>\n");

        for (name, value) in &self.artifacts {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
            html.push_str(&format!("<h2>{}</h2>\n<pre>{}</pre>\n", escape(name), escape(&pretty)));
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

// ── Shared predicates ─────────────────────────────────────────────────────────

/// The data classification an event was tagged with, lowercased.
pub(crate) fn classification(event: &AuditEvent) -> Option<String> {
    event
        .body
        .detail_str("classification")
        .or_else(|| event.body.metadata.get("classification").and_then(Value::as_str))
        .map(str::to_ascii_lowercase)
}

pub(crate) fn has_outcome(event: &AuditEvent, outcomes: &[Outcome]) -> bool {
    event.body.outcome.is_some_and(|o| outcomes.contains(&o))
}

pub(crate) fn is_failed(event: &AuditEvent) -> bool {
    has_outcome(event, &[Outcome::Failure, Outcome::Denied, Outcome::Error])
}
