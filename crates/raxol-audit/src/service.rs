//! `AuditLogger`: the logger's worker thread and its handle.
//!
//! A `LoggerCore` lives on the "audit-logger" thread. Calls arrive as
//! messages on a crossbeam channel and are applied in arrival order. The
//! periodic flush, retention sweep and integrity check are `tick` timers
//! selected in the same loop, so maintenance never interleaves with a call.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, select, tick, unbounded, Receiver, RecvTimeoutError, Sender};
use serde_json::Value;
use tracing::{debug, error, warn};

use raxol_contracts::{
    AuditConfig, AuditError, AuditEvent, AuditResult, Outcome, QueryFilters, QueryOptions,
    Severity, StoredRecord, TimeRange,
};
use raxol_core::{AlertHandler, EventStore, HttpTransport, KeyMaterial};
use raxol_storage::StorageHandle;

use crate::builders::{self, EventContext};
use crate::integrity::IntegrityReport;
use crate::logger::{LoggerCore, LoggerStatus};

const SERVICE_NAME: &str = "logger";

/// Caller-side deadlines for logger requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerTimeouts {
    /// `log_*` and `flush`, which may write through to storage.
    pub write: Duration,
    pub query: Duration,
    /// Integrity checks and retention sweeps.
    pub maintenance: Duration,
}

impl Default for LoggerTimeouts {
    fn default() -> Self {
        Self {
            write: Duration::from_secs(30),
            query: Duration::from_secs(60),
            maintenance: Duration::from_secs(120),
        }
    }
}

type Reply<T> = Sender<AuditResult<T>>;

enum Command {
    Log { event: Box<AuditEvent>, reply: Reply<()> },
    Flush { reply: Reply<usize> },
    Query { filters: QueryFilters, options: QueryOptions, reply: Reply<Vec<StoredRecord>> },
    VerifyIntegrity { window: TimeRange, reply: Reply<IntegrityReport> },
    RunRetention { reply: Reply<usize> },
    RegisterAlert { handler: Arc<dyn AlertHandler>, reply: Reply<()> },
    Status { reply: Reply<LoggerStatus> },
    Shutdown,
}

/// The running event logger.
///
/// Cloning is not supported; share it behind an `Arc` or pass `&AuditLogger`.
/// Dropping it performs the final flush and stops the worker.
pub struct AuditLogger {
    tx: Sender<Command>,
    timeouts: LoggerTimeouts,
    worker: Option<JoinHandle<()>>,
}

/// Assembles an `AuditLogger` from its collaborators.
pub struct AuditLoggerBuilder {
    config: AuditConfig,
    storage: StorageHandle,
    keys: Option<KeyMaterial>,
    event_store: Option<Arc<dyn EventStore>>,
    siem_transport: Option<Arc<dyn HttpTransport>>,
    alert_handlers: Vec<Arc<dyn AlertHandler>>,
    timeouts: LoggerTimeouts,
}

impl AuditLoggerBuilder {
    /// Use `keys` instead of loading them from `config.keys`.
    pub fn keys(mut self, keys: KeyMaterial) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn siem_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.siem_transport = Some(transport);
        self
    }

    pub fn alert_handler(mut self, handler: Arc<dyn AlertHandler>) -> Self {
        self.alert_handlers.push(handler);
        self
    }

    pub fn timeouts(mut self, timeouts: LoggerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Validate the configuration, resolve keys and start the worker.
    pub fn start(self) -> AuditResult<AuditLogger> {
        self.config.validate()?;
        let keys = match self.keys {
            Some(keys) => keys,
            None => KeyMaterial::from_source(&self.config.keys)?,
        };

        let mut core = LoggerCore::new(self.config.clone(), keys, self.storage);
        if let Some(store) = self.event_store {
            core = core.with_event_store(store);
        }
        if let Some(transport) = self.siem_transport {
            core = core.with_siem_transport(transport);
        }
        for handler in self.alert_handlers {
            core.register_alert_handler(handler);
        }

        let schedule = Schedule::from_config(&self.config);
        let (tx, rx) = unbounded();
        let worker = std::thread::Builder::new()
            .name("audit-logger".to_string())
            .spawn(move || run_worker(core, rx, schedule))?;
        Ok(AuditLogger {
            tx,
            timeouts: self.timeouts,
            worker: Some(worker),
        })
    }
}

impl AuditLogger {
    pub fn builder(config: AuditConfig, storage: StorageHandle) -> AuditLoggerBuilder {
        AuditLoggerBuilder {
            config,
            storage,
            keys: None,
            event_store: None,
            siem_transport: None,
            alert_handlers: Vec::new(),
            timeouts: LoggerTimeouts::default(),
        }
    }

    /// Start with keys from `config.keys` and no event store.
    pub fn start(config: AuditConfig, storage: StorageHandle) -> AuditResult<Self> {
        Self::builder(config, storage).start()
    }

    fn request<T>(
        &self,
        operation: &str,
        timeout: Duration,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> AuditResult<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx.send(build(reply_tx)).map_err(|_| unavailable())?;
        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AuditError::Timeout {
                operation: operation.to_string(),
                millis: timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(unavailable()),
        }
    }

    /// Log a fully built event.
    ///
    /// Returns once the event is buffered. A deferred flush is not an error;
    /// only a catastrophic storage failure is.
    pub fn log_event(&self, event: AuditEvent) -> AuditResult<()> {
        self.request("log_event", self.timeouts.write, |reply| Command::Log {
            event: Box::new(event),
            reply,
        })
    }

    pub fn log_authentication(
        &self,
        user_id: &str,
        method: &str,
        outcome: Outcome,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::authentication(user_id, method, outcome, context))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_authorization(
        &self,
        user_id: &str,
        resource_type: &str,
        resource_id: &str,
        action: &str,
        outcome: Outcome,
        denial_reason: Option<&str>,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::authorization(
            user_id,
            resource_type,
            resource_id,
            action,
            outcome,
            denial_reason,
            context,
        ))
    }

    pub fn log_data_access(
        &self,
        user_id: &str,
        operation: &str,
        resource_type: &str,
        resource_id: &str,
        classification: Option<&str>,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::data_access(
            user_id,
            operation,
            resource_type,
            resource_id,
            classification,
            context,
        ))
    }

    pub fn log_configuration_change(
        &self,
        user_id: &str,
        setting: &str,
        old_value: Value,
        new_value: Value,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::configuration_change(user_id, setting, old_value, new_value, context))
    }

    pub fn log_security_event(
        &self,
        event_type: &str,
        severity: Severity,
        description: &str,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::security(event_type, severity, description, context))
    }

    pub fn log_terminal_command(
        &self,
        user_id: &str,
        command: &str,
        outcome: Outcome,
        severity: Option<Severity>,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::terminal_command(user_id, command, outcome, severity, context))
    }

    pub fn log_compliance_event(
        &self,
        event_type: &str,
        description: &str,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::compliance(event_type, description, context))
    }

    pub fn log_privacy_event(
        &self,
        subject_id: &str,
        request_type: &str,
        outcome: Option<Outcome>,
        context: EventContext,
    ) -> AuditResult<()> {
        self.log_event(builders::privacy(subject_id, request_type, outcome, context))
    }

    /// Flush the buffer now. Returns how many events were written.
    pub fn flush(&self) -> AuditResult<usize> {
        self.request("flush", self.timeouts.write, |reply| Command::Flush { reply })
    }

    pub fn query(&self, filters: QueryFilters, options: QueryOptions) -> AuditResult<Vec<StoredRecord>> {
        self.request("query", self.timeouts.query, |reply| Command::Query {
            filters,
            options,
            reply,
        })
    }

    pub fn verify_integrity(&self, window: TimeRange) -> AuditResult<IntegrityReport> {
        self.request("verify_integrity", self.timeouts.maintenance, |reply| {
            Command::VerifyIntegrity { window, reply }
        })
    }

    /// Delete records past the retention horizon. Returns how many went.
    pub fn run_retention(&self) -> AuditResult<usize> {
        self.request("run_retention", self.timeouts.maintenance, |reply| {
            Command::RunRetention { reply }
        })
    }

    pub fn register_alert_handler(&self, handler: Arc<dyn AlertHandler>) -> AuditResult<()> {
        self.request("register_alert_handler", self.timeouts.write, |reply| {
            Command::RegisterAlert { handler, reply }
        })
    }

    pub fn status(&self) -> AuditResult<LoggerStatus> {
        self.request("status", self.timeouts.query, |reply| Command::Status { reply })
    }

    /// Flush once more and stop the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        if self.tx.send(Command::Shutdown).is_err() {
            warn!("audit logger worker already stopped");
        }
        if worker.join().is_err() {
            error!("audit logger worker panicked");
        }
    }
}

impl Drop for AuditLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unavailable() -> AuditError {
    AuditError::ServiceUnavailable {
        service: SERVICE_NAME.to_string(),
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Schedule {
    flush: Duration,
    retention: Duration,
    integrity: Duration,
}

impl Schedule {
    fn from_config(config: &AuditConfig) -> Self {
        Self {
            flush: Duration::from_millis(config.flush_interval_ms),
            retention: Duration::from_millis(config.retention_interval_ms),
            integrity: Duration::from_millis(config.integrity_interval_ms),
        }
    }
}

fn run_worker(mut core: LoggerCore, rx: Receiver<Command>, schedule: Schedule) {
    let flush_timer = tick(schedule.flush);
    let retention_timer = tick(schedule.retention);
    let integrity_timer = tick(schedule.integrity);
    debug!("audit logger worker started");

    loop {
        select! {
            recv(rx) -> command => {
                let Ok(command) = command else { break };
                match command {
                    Command::Log { event, reply } => {
                        let _ = reply.send(core.log_event(*event));
                    }
                    Command::Flush { reply } => {
                        let _ = reply.send(core.flush());
                    }
                    Command::Query { filters, options, reply } => {
                        let _ = reply.send(core.query(filters, options));
                    }
                    Command::VerifyIntegrity { window, reply } => {
                        let _ = reply.send(core.verify_integrity(window));
                    }
                    Command::RunRetention { reply } => {
                        let _ = reply.send(core.run_retention());
                    }
                    Command::RegisterAlert { handler, reply } => {
                        core.register_alert_handler(handler);
                        let _ = reply.send(Ok(()));
                    }
                    Command::Status { reply } => {
                        let _ = reply.send(Ok(core.status()));
                    }
                    Command::Shutdown => break,
                }
            }
            recv(flush_timer) -> _ => {
                if let Err(e) = core.flush() {
                    warn!(error = %e, "periodic audit flush failed");
                }
            }
            recv(retention_timer) -> _ => {
                if let Err(e) = core.run_retention() {
                    warn!(error = %e, "scheduled audit retention failed");
                }
            }
            recv(integrity_timer) -> _ => {
                if let Err(e) = core.verify_recent() {
                    warn!(error = %e, "scheduled audit integrity check failed");
                }
            }
        }
    }

    core.shutdown();
    debug!("audit logger worker stopped");
}
