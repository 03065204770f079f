//! The canonical audit event and its classification enums.
//!
//! An `AuditEvent` is created by one of the logger's `log_*` calls, passes
//! through enrichment, signing and (optionally) encryption, and is then
//! persisted. It is never modified after persistence; the only way it leaves
//! the store is a retention sweep.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

// ── Category ──────────────────────────────────────────────────────────────────

/// The functional area an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Authentication,
    Authorization,
    DataAccess,
    Configuration,
    Security,
    Terminal,
    Compliance,
    Privacy,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Authentication,
        Category::Authorization,
        Category::DataAccess,
        Category::Configuration,
        Category::Security,
        Category::Terminal,
        Category::Compliance,
        Category::Privacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Authentication => "authentication",
            Category::Authorization => "authorization",
            Category::DataAccess => "data_access",
            Category::Configuration => "configuration",
            Category::Security => "security",
            Category::Terminal => "terminal",
            Category::Compliance => "compliance",
            Category::Privacy => "privacy",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Severity ──────────────────────────────────────────────────────────────────

/// Event severity, totally ordered from `Info` (lowest) to `Critical`.
///
/// The derived `Ord` follows declaration order, which is what the log-level
/// threshold, flush urgency and alerting comparisons rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// True for the severities that trigger alert handlers.
    pub fn is_alerting(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(AuditError::ConfigError {
                reason: format!("unknown severity '{}'", other),
            }),
        }
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// The result of the action an event describes.
///
/// Values not in the known set deserialize to `Unknown` rather than failing,
/// so records written by newer producers still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Outcome {
    Success,
    Failure,
    Denied,
    Error,
    Partial,
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Denied => "denied",
            Outcome::Error => "error",
            Outcome::Partial => "partial",
            Outcome::Unknown => "unknown",
        }
    }
}

impl From<String> for Outcome {
    fn from(s: String) -> Self {
        Outcome::from(s.as_str())
    }
}

impl From<&str> for Outcome {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "success" => Outcome::Success,
            "failure" => Outcome::Failure,
            "denied" => Outcome::Denied,
            "error" => Outcome::Error,
            "partial" => Outcome::Partial,
            _ => Outcome::Unknown,
        }
    }
}

impl From<Outcome> for String {
    fn from(o: Outcome) -> Self {
        o.as_str().to_string()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── EventBody ─────────────────────────────────────────────────────────────────

/// The caller-supplied part of an event: what happened, to whom, and where.
///
/// Every field except `event_type` is optional. Fields that are `None` are
/// omitted from the serialized form entirely, so two events with different
/// populated fields produce JSON objects with different key sets.
/// `details` holds category-specific extras and is flattened into the event
/// object; its keys must not collide with the named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl EventBody {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn denial_reason(mut self, reason: impl Into<String>) -> Self {
        self.denial_reason = Some(reason.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Look up a category-specific detail as a string, if present.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(|v| v.as_str())
    }
}

// ── AuditEvent ────────────────────────────────────────────────────────────────

/// One fully materialized audit event.
///
/// `signature`, when present, is the hex HMAC-SHA256 of `canonical_bytes()`.
/// Because the canonical form includes every other field, mutating anything
/// after signing invalidates the signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,

    /// Epoch milliseconds (UTC). Determines which dated file stores the event.
    pub timestamp: i64,

    pub category: Category,
    pub severity: Severity,

    #[serde(flatten)]
    pub body: EventBody,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<i64>,

    /// Set when signing or encryption failed and the event was stored
    /// unprotected. Holds the failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AuditEvent {
    /// Create an event with a fresh UUIDv4 id stamped at the current time.
    pub fn new(category: Category, severity: Severity, body: EventBody) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), now_millis(), category, severity, body)
    }

    /// Create an event with an explicit id and timestamp.
    pub fn with_id(
        event_id: impl Into<String>,
        timestamp: i64,
        category: Category,
        severity: Severity,
        body: EventBody,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            category,
            severity,
            body,
            node: None,
            environment: None,
            version: None,
            enriched_at: None,
            degraded: None,
            signature: None,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.body.event_type
    }

    /// The bytes a signature commits to: compact JSON of the event with the
    /// `signature` field removed.
    ///
    /// Struct fields serialize in declaration order and all maps are
    /// `BTreeMap`s, so the same event always yields the same bytes, including
    /// after a round trip through the on-disk NDJSON form.
    pub fn canonical_bytes(&self) -> AuditResult<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Concatenation of the free-text fields, space separated, used by the
    /// search index and the substring fallback.
    pub fn free_text(&self) -> String {
        [
            self.body.description.as_deref(),
            self.body.command.as_deref(),
            self.body.error_message.as_deref(),
            self.body.denial_reason.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

// ── Time helpers ──────────────────────────────────────────────────────────────

/// Current wall-clock time as epoch milliseconds (UTC).
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert epoch milliseconds to a UTC datetime, clamping unrepresentable
/// values to the Unix epoch.
pub fn to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// The `YYYY-MM-DD` UTC date for a timestamp. Used for file and stream names.
pub fn date_key(millis: i64) -> String {
    to_datetime(millis).format("%Y-%m-%d").to_string()
}

/// RFC 3339 / ISO 8601 rendering with millisecond precision and a `Z` suffix.
pub fn iso8601(millis: i64) -> String {
    to_datetime(millis).to_rfc3339_opts(SecondsFormat::Millis, true)
}
