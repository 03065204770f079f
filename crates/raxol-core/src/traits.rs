//! Boundary traits for the audit engine's external collaborators.
//!
//! These four traits are the only points where the engine touches systems it
//! does not own:
//!
//! - `EventStore`: the durable write-ahead store each flush appends to
//! - `AlertHandler`: callbacks for high and critical events
//! - `HttpTransport`: the HTTP client SIEM adapters post through
//! - `PdfRenderer`: the HTML-to-PDF backend used by PDF exports
//!
//! Every implementation must be `Send + Sync`: alert handlers and transports
//! are invoked from detached background threads.

use std::time::Duration;

use raxol_contracts::{AuditEvent, AuditResult, StoredRecord};

/// Options passed alongside an `append_events` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOptions {
    /// Correlates an append with the flush that produced it. A retried flush
    /// reuses the id so the store can drop the duplicate.
    pub batch_id: Option<String>,
}

/// The external durable event store.
///
/// Called once per successful flush with `stream_name = "audit-<UTC date>"`.
pub trait EventStore: Send + Sync {
    /// Append `records` to `stream_name`, returning the store-assigned ids in
    /// order.
    fn append_events(
        &self,
        records: &[StoredRecord],
        stream_name: &str,
        opts: &AppendOptions,
    ) -> AuditResult<Vec<String>>;
}

/// A callback notified of high and critical events.
///
/// Invoked fire-and-forget; a returned error is logged and otherwise ignored.
pub trait AlertHandler: Send + Sync {
    fn on_alert(&self, event: &AuditEvent) -> AuditResult<()>;
}

impl<F> AlertHandler for F
where
    F: Fn(&AuditEvent) -> AuditResult<()> + Send + Sync,
{
    fn on_alert(&self, event: &AuditEvent) -> AuditResult<()> {
        self(event)
    }
}

/// An outbound HTTP POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP client SIEM adapters use.
///
/// Implementations return `Err` only when no response was received; any
/// status code, including errors, comes back as `Ok(HttpResponse)`.
pub trait HttpTransport: Send + Sync {
    fn post(&self, request: &HttpRequest) -> AuditResult<HttpResponse>;
}

/// Converts a rendered HTML document to PDF bytes.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, html: &str) -> AuditResult<Vec<u8>>;
}
