//! Serialized-access wrapper around `Exporter`.
//!
//! Exports and reports run one at a time on the "audit-export" worker thread.
//! Callers wait up to `EXPORT_TIMEOUT` for a reply. `export_background`
//! returns immediately and hands the result to a callback from a detached
//! thread.

use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use raxol_contracts::{AuditError, AuditEvent, AuditResult, QueryFilters, SiemConfig, TimeRange};

use crate::compliance::Framework;
use crate::exporter::{Exporter, RenderedReport};
use crate::options::{ExportFormat, ExportOptions};
use crate::postprocess::ExportArtifact;

const SERVICE_NAME: &str = "export";

/// Caller-side deadline for exports and reports.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(120);

type Reply<T> = Sender<AuditResult<T>>;

enum Command {
    Export {
        format: ExportFormat,
        filters: QueryFilters,
        opts: ExportOptions,
        path: Option<PathBuf>,
        reply: Reply<ExportArtifact>,
    },
    Report {
        framework: Framework,
        range: TimeRange,
        format: ExportFormat,
        reply: Reply<RenderedReport>,
    },
    SendToSiem {
        events: Vec<AuditEvent>,
        config: SiemConfig,
        reply: Reply<()>,
    },
    Shutdown,
}

/// A cloneable handle for sending requests to the export worker.
#[derive(Clone)]
pub struct ExportHandle {
    tx: Sender<Command>,
    timeout: Duration,
}

impl ExportHandle {
    fn request<T>(&self, operation: &str, build: impl FnOnce(Reply<T>) -> Command) -> AuditResult<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx.send(build(reply_tx)).map_err(|_| unavailable())?;
        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AuditError::Timeout {
                operation: operation.to_string(),
                millis: self.timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(unavailable()),
        }
    }

    pub fn export(
        &self,
        format: ExportFormat,
        filters: QueryFilters,
        opts: ExportOptions,
    ) -> AuditResult<ExportArtifact> {
        self.request("export", |reply| Command::Export {
            format,
            filters,
            opts,
            path: None,
            reply,
        })
    }

    pub fn export_to_file(
        &self,
        format: ExportFormat,
        filters: QueryFilters,
        opts: ExportOptions,
        path: impl Into<PathBuf>,
    ) -> AuditResult<ExportArtifact> {
        let path = path.into();
        self.request("export_to_file", |reply| Command::Export {
            format,
            filters,
            opts,
            path: Some(path),
            reply,
        })
    }

    /// Run an export without blocking the caller.
    ///
    /// `on_complete` receives the result, including a timeout or an
    /// unavailable worker, on a detached thread.
    pub fn export_background<F>(
        &self,
        format: ExportFormat,
        filters: QueryFilters,
        opts: ExportOptions,
        on_complete: F,
    ) -> AuditResult<()>
    where
        F: FnOnce(AuditResult<ExportArtifact>) + Send + 'static,
    {
        let handle = self.clone();
        std::thread::Builder::new()
            .name("audit-export-bg".to_string())
            .spawn(move || on_complete(handle.export(format, filters, opts)))?;
        Ok(())
    }

    pub fn generate_compliance_report(
        &self,
        framework: Framework,
        range: TimeRange,
        format: ExportFormat,
    ) -> AuditResult<RenderedReport> {
        self.request("generate_compliance_report", |reply| Command::Report {
            framework,
            range,
            format,
            reply,
        })
    }

    pub fn send_to_siem(&self, events: Vec<AuditEvent>, config: SiemConfig) -> AuditResult<()> {
        self.request("send_to_siem", |reply| Command::SendToSiem { events, config, reply })
    }
}

/// The running export worker. Dropping it shuts the worker down.
pub struct ExportService {
    handle: ExportHandle,
    worker: Option<JoinHandle<()>>,
}

impl ExportService {
    pub fn start(exporter: Exporter) -> AuditResult<Self> {
        Self::start_with(exporter, EXPORT_TIMEOUT)
    }

    pub fn start_with(exporter: Exporter, timeout: Duration) -> AuditResult<Self> {
        let (tx, rx) = unbounded();
        let worker = std::thread::Builder::new()
            .name("audit-export".to_string())
            .spawn(move || run_worker(exporter, rx))?;
        Ok(Self {
            handle: ExportHandle { tx, timeout },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> ExportHandle {
        self.handle.clone()
    }

    /// Stop the worker once it has finished every earlier request.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if self.handle.tx.send(Command::Shutdown).is_err() {
            warn!("audit export worker already stopped");
        }
        if worker.join().is_err() {
            error!("audit export worker panicked");
        }
    }
}

impl Drop for ExportService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unavailable() -> AuditError {
    AuditError::ServiceUnavailable {
        service: SERVICE_NAME.to_string(),
    }
}

fn run_worker(exporter: Exporter, rx: Receiver<Command>) {
    debug!("audit export worker started");
    for command in rx.iter() {
        match command {
            Command::Export {
                format,
                filters,
                opts,
                path,
                reply,
            } => {
                let result = match path {
                    Some(path) => exporter.export_to_file(format, filters, &opts, &path),
                    None => exporter.export(format, filters, &opts),
                };
                let _ = reply.send(result);
            }
            Command::Report {
                framework,
                range,
                format,
                reply,
            } => {
                let _ = reply.send(exporter.generate_compliance_report(framework, range, format));
            }
            Command::SendToSiem { events, config, reply } => {
                let _ = reply.send(exporter.send_to_siem(&events, &config));
            }
            Command::Shutdown => break,
        }
    }
    debug!("audit export worker stopped");
}
