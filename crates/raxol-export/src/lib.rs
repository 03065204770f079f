//! # raxol-export
//!
//! Turns stored audit events into something another system can consume.
//!
//! ## Overview
//!
//! - **Formats**: JSON, CSV, CEF, LEEF, RFC 5424 syslog, XML and PDF
//!   (through a pluggable `PdfRenderer`).
//! - **Post-processing**: gzip, AES-256-GCM and an HMAC signature envelope,
//!   each independently enabled, applied in that order.
//! - **SIEM forwarding**: Splunk HEC, Elasticsearch bulk, QRadar, Sentinel
//!   and generic webhooks over an `HttpTransport`.
//! - **Compliance reports**: SOC 2, HIPAA, GDPR and PCI DSS control
//!   analyzers with framework-specific artifacts.
//!
//! `Exporter` does the work; `ExportService` runs it on its own worker thread.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use raxol_export::{ExportFormat, ExportOptions, ExportService, Exporter};
//!
//! let exporter = Exporter::new(storage.handle()).with_keys(keys);
//! let exports = ExportService::start(exporter)?;
//! let artifact = exports.handle().export(
//!     ExportFormat::Cef,
//!     QueryFilters::new().severity(Severity::High),
//!     ExportOptions::default().compressed(),
//! )?;
//! ```

pub mod compliance;
pub mod exporter;
pub mod formats;
pub mod options;
pub mod postprocess;
pub mod service;
pub mod siem;

pub use compliance::{ComplianceReport, ControlFinding, ControlStatus, Framework, ReportSummary};
pub use exporter::{Exporter, RenderedReport};
pub use formats::pdf::HtmlPassthrough;
pub use options::{ExportFormat, ExportOptions, PdfTemplate};
pub use postprocess::ExportArtifact;
pub use service::{ExportHandle, ExportService, EXPORT_TIMEOUT};
pub use siem::{ReqwestTransport, SiemForwarder};

// ── Tests ─────────────────────────────────────────────────────────────────────
