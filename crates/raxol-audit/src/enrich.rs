//! Deployment context stamped onto every event before it is signed.

use raxol_contracts::{AuditConfig, AuditEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enricher {
    node: String,
    environment: String,
    version: String,
}

impl Enricher {
    pub fn new(node: impl Into<String>, environment: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            environment: environment.into(),
            version: version.into(),
        }
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(&config.node, &config.environment, &config.version)
    }

    /// Fill `node`, `environment`, `version` and `enriched_at`.
    ///
    /// Values the caller already set are kept. An empty `event_id` gets a
    /// fresh UUID and a zero `timestamp` becomes `now`.
    pub fn enrich(&self, event: &mut AuditEvent, now: i64) {
        if event.event_id.is_empty() {
            event.event_id = uuid::Uuid::new_v4().to_string();
        }
        if event.timestamp == 0 {
            event.timestamp = now;
        }
        event.node.get_or_insert_with(|| self.node.clone());
        event.environment.get_or_insert_with(|| self.environment.clone());
        event.version.get_or_insert_with(|| self.version.clone());
        event.enriched_at = Some(now);
    }
}
