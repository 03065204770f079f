//! Forwarding events to SIEM systems over HTTP.
//!
//! Each `SiemKind` maps to one request shape. Delivery is a single POST per
//! batch; a transport failure or any non-2xx status is an error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use raxol_contracts::event::iso8601;
use raxol_contracts::{AuditError, AuditEvent, AuditResult, SiemConfig, SiemKind};
use raxol_core::{HttpRequest, HttpResponse, HttpTransport};

use crate::formats::leef;

const DEFAULT_ES_INDEX: &str = "raxol-audit";
const SENTINEL_LOG_TYPE: &str = "RaxolAudit";

/// Longest response body excerpt kept in an error.
const ERROR_BODY_LIMIT: usize = 256;

/// Blocking `reqwest` implementation of `HttpTransport`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, request: &HttpRequest) -> AuditResult<HttpResponse> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().map_err(|e| AuditError::Siem {
            reason: format!("POST {} failed: {}", request.url, e),
        })?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Ok(HttpResponse { status, body })
    }
}

/// Sends event batches to the SIEM described by a `SiemConfig`.
#[derive(Clone)]
pub struct SiemForwarder {
    config: SiemConfig,
    transport: Arc<dyn HttpTransport>,
}

impl SiemForwarder {
    pub fn new(config: SiemConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    /// A forwarder using the `reqwest` transport.
    pub fn with_reqwest(config: SiemConfig) -> Self {
        Self::new(config, Arc::new(ReqwestTransport::new()))
    }

    pub fn config(&self) -> &SiemConfig {
        &self.config
    }

    /// Forward `events` as one request. An empty batch sends nothing.
    pub fn send(&self, events: &[AuditEvent]) -> AuditResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let request = build_request(&self.config, events)?;
        let response = self.transport.post(&request)?;
        if !response.is_success() {
            let excerpt: String = response.body.chars().take(ERROR_BODY_LIMIT).collect();
            warn!(
                siem = ?self.config.kind,
                status = response.status,
                "SIEM rejected audit batch"
            );
            return Err(AuditError::Siem {
                reason: format!("{} returned HTTP {}: {}", request.url, response.status, excerpt),
            });
        }
        debug!(siem = ?self.config.kind, count = events.len(), "forwarded audit batch");
        Ok(())
    }
}

/// Build the vendor-specific request for `events`.
pub fn build_request(config: &SiemConfig, events: &[AuditEvent]) -> AuditResult<HttpRequest> {
    let token = config.token.as_deref();
    let mut headers = Vec::new();
    let (url, content_type, body) = match config.kind {
        SiemKind::Splunk => {
            if let Some(token) = token {
                headers.push(("Authorization".to_string(), format!("Splunk {}", token)));
            }
            (config.endpoint.clone(), "application/json", splunk_body(config, events)?)
        }
        SiemKind::Elasticsearch => {
            if let Some(token) = token {
                headers.push(("Authorization".to_string(), format!("ApiKey {}", token)));
            }
            (bulk_url(&config.endpoint), "application/x-ndjson", elasticsearch_body(config, events)?)
        }
        SiemKind::Qradar => {
            if let Some(token) = token {
                headers.push(("SEC".to_string(), token.to_string()));
            }
            let body: String = events.iter().map(|e| leef::line(e) + "\n").collect();
            (config.endpoint.clone(), "text/plain", body.into_bytes())
        }
        SiemKind::Sentinel => {
            if let Some(token) = token {
                headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
            }
            headers.push(("Log-Type".to_string(), SENTINEL_LOG_TYPE.to_string()));
            headers.push(("time-generated-field".to_string(), "time_generated".to_string()));
            (config.endpoint.clone(), "application/json", sentinel_body(events)?)
        }
        SiemKind::Webhook => {
            if let Some(token) = token {
                headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
            }
            let body = json!({
                "source": "raxol",
                "count": events.len(),
                "events": events,
            });
            (config.endpoint.clone(), "application/json", serde_json::to_vec(&body)?)
        }
    };

    headers.insert(0, ("Content-Type".to_string(), content_type.to_string()));
    for (name, value) in &config.headers {
        headers.push((name.clone(), value.clone()));
    }

    Ok(HttpRequest {
        url,
        headers,
        body,
        timeout: Duration::from_millis(config.timeout_ms),
    })
}

/// Splunk HEC: concatenated event objects, one per line.
fn splunk_body(config: &SiemConfig, events: &[AuditEvent]) -> AuditResult<Vec<u8>> {
    let mut body = Vec::new();
    for event in events {
        let mut envelope = json!({
            "time": event.timestamp as f64 / 1000.0,
            "host": event.node.clone().unwrap_or_else(|| "raxol".to_string()),
            "source": "raxol",
            "sourcetype": "raxol:audit",
            "event": event,
        });
        if let (Some(index), Value::Object(map)) = (&config.index, &mut envelope) {
            map.insert("index".to_string(), Value::String(index.clone()));
        }
        serde_json::to_writer(&mut body, &envelope)?;
        body.push(b'\n');
    }
    Ok(body)
}

/// Elasticsearch `_bulk`: an action line followed by the document, per event.
fn elasticsearch_body(config: &SiemConfig, events: &[AuditEvent]) -> AuditResult<Vec<u8>> {
    let index = config.index.as_deref().unwrap_or(DEFAULT_ES_INDEX);
    let mut body = Vec::new();
    for event in events {
        let action = json!({ "index": { "_index": index, "_id": event.event_id } });
        serde_json::to_writer(&mut body, &action)?;
        body.push(b'\n');
        serde_json::to_writer(&mut body, event)?;
        body.push(b'\n');
    }
    Ok(body)
}

fn bulk_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with("/_bulk") {
        trimmed.to_string()
    } else {
        format!("{}/_bulk", trimmed)
    }
}

/// Sentinel: a JSON array with an explicit generation time per record.
fn sentinel_body(events: &[AuditEvent]) -> AuditResult<Vec<u8>> {
    let records = events
        .iter()
        .map(|event| -> AuditResult<Value> {
            let mut value = serde_json::to_value(event)?;
            if let Value::Object(map) = &mut value {
                map.insert("time_generated".to_string(), Value::String(iso8601(event.timestamp)));
            }
            Ok(value)
        })
        .collect::<AuditResult<Vec<_>>>()?;
    Ok(serde_json::to_vec(&records)?)
}
