//! The exporter: storage query → encode → post-process.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use raxol_contracts::event::now_millis;
use raxol_contracts::{
    AuditError, AuditEvent, AuditResult, QueryFilters, QueryOptions, SiemConfig, SortField,
    SortOrder, StoredRecord, TimeRange,
};
use raxol_core::{HttpTransport, KeyMaterial, PdfRenderer};
use raxol_storage::StorageHandle;

use crate::compliance::{build_report, ComplianceReport, Framework};
use crate::formats::{self, pdf::HtmlPassthrough};
use crate::options::{ExportFormat, ExportOptions};
use crate::postprocess::{self, ExportArtifact};
use crate::siem::{ReqwestTransport, SiemForwarder};

/// A compliance report together with its rendered document.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub report: ComplianceReport,
    pub format: ExportFormat,
    pub document: Vec<u8>,
}

/// Produces exports, compliance reports and SIEM deliveries from the audit
/// store.
///
/// Sealed records are opened with the configured keys. Without keys they are
/// skipped with a warning, since none of their fields can be rendered.
#[derive(Clone)]
pub struct Exporter {
    storage: StorageHandle,
    keys: Option<KeyMaterial>,
    renderer: Arc<dyn PdfRenderer>,
    transport: Arc<dyn HttpTransport>,
    enabled: bool,
}

impl Exporter {
    pub fn new(storage: StorageHandle) -> Self {
        Self {
            storage,
            keys: None,
            renderer: Arc::new(HtmlPassthrough),
            transport: Arc::new(ReqwestTransport::new()),
            enabled: true,
        }
    }

    pub fn with_keys(mut self, keys: KeyMaterial) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PdfRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Turn every export and report into `ExportFailed`.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn ensure_enabled(&self) -> AuditResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(AuditError::ExportFailed {
                reason: "exports are disabled by configuration".to_string(),
            })
        }
    }

    /// Every event matching `filters`, oldest first.
    pub fn load_events(&self, filters: QueryFilters) -> AuditResult<Vec<AuditEvent>> {
        let options = QueryOptions::unlimited().sorted(SortField::Timestamp, SortOrder::Asc);
        let records = self.storage.query(filters, options)?;
        let cipher = self.keys.as_ref().map(KeyMaterial::cipher);

        let mut events = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for record in records {
            match record {
                StoredRecord::Plain(event) => events.push(event),
                StoredRecord::Sealed(sealed) => match cipher.as_ref().map(|c| c.open(&sealed)) {
                    Some(Ok(event)) => events.push(event),
                    Some(Err(e)) => {
                        warn!(event_id = %sealed.event_id, error = %e, "could not open sealed record");
                        skipped += 1;
                    }
                    None => skipped += 1,
                },
            }
        }
        if skipped > 0 {
            warn!(skipped, "sealed records omitted from export");
        }
        Ok(events)
    }

    /// Query, encode and post-process.
    pub fn export(
        &self,
        format: ExportFormat,
        filters: QueryFilters,
        opts: &ExportOptions,
    ) -> AuditResult<ExportArtifact> {
        self.ensure_enabled()?;
        let events = self.load_events(filters)?;
        self.export_events(format, &events, opts)
    }

    /// Encode and post-process an already loaded event set.
    pub fn export_events(
        &self,
        format: ExportFormat,
        events: &[AuditEvent],
        opts: &ExportOptions,
    ) -> AuditResult<ExportArtifact> {
        let exported_at = now_millis();
        let payload = formats::encode(format, events, opts, self.renderer.as_ref(), exported_at)
            .map_err(|e| export_failed(format, e))?;
        let signer = self.keys.as_ref().map(KeyMaterial::signer);
        let artifact = postprocess::apply(format, payload, events.len(), exported_at, opts, signer.as_ref())?;
        info!(
            format = %format,
            events = artifact.event_count,
            bytes = artifact.payload.len(),
            compressed = artifact.compressed,
            encrypted = artifact.encrypted,
            signed = artifact.signature.is_some(),
            "audit export complete"
        );
        Ok(artifact)
    }

    /// Export and write the payload to `path`.
    pub fn export_to_file(
        &self,
        format: ExportFormat,
        filters: QueryFilters,
        opts: &ExportOptions,
        path: &Path,
    ) -> AuditResult<ExportArtifact> {
        let artifact = self.export(format, filters, opts)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &artifact.payload)?;
        debug!(path = %path.display(), bytes = artifact.payload.len(), "export written");
        Ok(artifact)
    }

    /// Forward `events` to the SIEM described by `config`.
    pub fn send_to_siem(&self, events: &[AuditEvent], config: &SiemConfig) -> AuditResult<()> {
        SiemForwarder::new(config.clone(), Arc::clone(&self.transport)).send(events)
    }

    /// Build the `framework` report for `range` and render it as JSON or PDF.
    pub fn generate_compliance_report(
        &self,
        framework: Framework,
        range: TimeRange,
        format: ExportFormat,
    ) -> AuditResult<RenderedReport> {
        self.ensure_enabled()?;
        if !matches!(format, ExportFormat::Json | ExportFormat::Pdf) {
            return Err(AuditError::UnsupportedFormat {
                format: format!("{} (compliance reports are json or pdf)", format),
            });
        }

        let events = self.load_events(range.to_filters())?;
        let report = build_report(framework, range, &events);
        let document = match format {
            ExportFormat::Pdf => self.renderer.render(&report.to_html())?,
            _ => serde_json::to_vec_pretty(&report)?,
        };
        info!(
            framework = %framework,
            events = report.summary.total_events,
            needs_review = report.summary.controls_needing_review,
            "compliance report generated"
        );
        Ok(RenderedReport {
            report,
            format,
            document,
        })
    }
}

fn export_failed(format: ExportFormat, error: AuditError) -> AuditError {
    match error {
        AuditError::ExportFailed { .. } | AuditError::UnsupportedFormat { .. } => error,
        other => AuditError::ExportFailed {
            reason: format!("{} encoding failed: {}", format, other),
        },
    }
}
