//! Serialized-access wrapper around `StorageEngine`.
//!
//! `StorageService::start` moves the engine onto a dedicated worker thread.
//! Every operation is sent to that thread as a message over a crossbeam
//! channel and answered on a one-shot reply channel, so operations are
//! applied strictly in arrival order. Hourly rotation is delivered by a
//! `tick` timer selected in the same loop; it never overlaps a request.
//!
//! Callers hold a cloneable `StorageHandle`. Each request waits for its reply
//! up to a per-operation deadline and fails with `AuditError::Timeout` after
//! that; the engine itself enforces no deadlines.

use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, select, tick, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use raxol_contracts::{
    AuditConfig, AuditError, AuditResult, QueryFilters, QueryOptions, StorageStatistics,
    StoredRecord,
};

use crate::engine::{StorageEngine, StorageSettings};

const SERVICE_NAME: &str = "storage";

/// Caller-side deadlines per operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageTimeouts {
    pub store: Duration,
    pub query: Duration,
    pub maintenance: Duration,
}

impl Default for StorageTimeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(30),
            query: Duration::from_secs(60),
            maintenance: Duration::from_secs(120),
        }
    }
}

type Reply<T> = Sender<AuditResult<T>>;

enum Command {
    StoreBatch { records: Vec<StoredRecord>, reply: Reply<usize> },
    Query { filters: QueryFilters, options: QueryOptions, reply: Reply<Vec<StoredRecord>> },
    DeleteBefore { cutoff: i64, reply: Reply<usize> },
    Rotate { reply: Reply<Option<PathBuf>> },
    RebuildIndexes { reply: Reply<()> },
    Statistics { reply: Reply<StorageStatistics> },
    Shutdown { reply: Reply<()> },
}

/// A cloneable handle for sending requests to the storage worker.
#[derive(Clone)]
pub struct StorageHandle {
    tx: Sender<Command>,
    timeouts: StorageTimeouts,
}

impl StorageHandle {
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

    /// Persist and index a batch. Returns how many records were new.
    pub fn store_batch(&self, records: Vec<StoredRecord>) -> AuditResult<usize> {
        self.request("store_batch", self.timeouts.store, |reply| Command::StoreBatch {
            records,
            reply,
        })
    }

    pub fn query(&self, filters: QueryFilters, options: QueryOptions) -> AuditResult<Vec<StoredRecord>> {
        self.request("query", self.timeouts.query, |reply| Command::Query {
            filters,
            options,
            reply,
        })
    }

    /// Delete every record older than `cutoff` (epoch ms).
    pub fn delete_before(&self, cutoff: i64) -> AuditResult<usize> {
        self.request("delete_before", self.timeouts.maintenance, |reply| {
            Command::DeleteBefore { cutoff, reply }
        })
    }

    pub fn rotate(&self) -> AuditResult<Option<PathBuf>> {
        self.request("rotate", self.timeouts.maintenance, |reply| Command::Rotate { reply })
    }

    pub fn rebuild_indexes(&self) -> AuditResult<()> {
        self.request("rebuild_indexes", self.timeouts.maintenance, |reply| {
            Command::RebuildIndexes { reply }
        })
    }

    pub fn statistics(&self) -> AuditResult<StorageStatistics> {
        self.request("statistics", self.timeouts.query, |reply| Command::Statistics { reply })
    }
}

/// The running storage worker. Dropping it shuts the worker down.
pub struct StorageService {
    handle: StorageHandle,
    worker: Option<JoinHandle<()>>,
}

impl StorageService {
    /// Open the store described by `config` and start its worker.
    ///
    /// The engine is opened on the calling thread so that a bad storage path
    /// fails here rather than inside the worker.
    pub fn start(config: &AuditConfig) -> AuditResult<Self> {
        Self::start_with(config, StorageTimeouts::default())
    }

    pub fn start_with(config: &AuditConfig, timeouts: StorageTimeouts) -> AuditResult<Self> {
        let engine = StorageEngine::open(StorageSettings::from(config))?;
        let rotation_every = Duration::from_millis(config.rotation_interval_ms);
        let (tx, rx) = unbounded();

        let worker = std::thread::Builder::new()
            .name("audit-storage".to_string())
            .spawn(move || run_worker(engine, rx, rotation_every))?;

        Ok(Self {
            handle: StorageHandle { tx, timeouts },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> StorageHandle {
        self.handle.clone()
    }

    /// Stop the worker after it drains every earlier request, writing the
    /// index snapshot on the way out.
    pub fn shutdown(mut self) -> AuditResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> AuditResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let result = self
            .handle
            .request("shutdown", self.handle.timeouts.maintenance, |reply| Command::Shutdown { reply });
        if worker.join().is_err() {
            error!("audit storage worker panicked");
        }
        result
    }
}

impl Drop for StorageService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "audit storage shutdown failed");
        }
    }
}

fn unavailable() -> AuditError {
    AuditError::ServiceUnavailable {
        service: SERVICE_NAME.to_string(),
    }
}

fn run_worker(mut engine: StorageEngine, rx: Receiver<Command>, rotation_every: Duration) {
    let rotation = tick(rotation_every);
    debug!("audit storage worker started");

    loop {
        select! {
            recv(rx) -> msg => {
                let Ok(command) = msg else {
                    // Every handle is gone: close quietly.
                    if let Err(e) = engine.close() {
                        warn!(error = %e, "audit storage close failed");
                    }
                    break;
                };
                match command {
                    Command::StoreBatch { records, reply } => {
                        let _ = reply.send(engine.store_batch(records));
                    }
                    Command::Query { filters, options, reply } => {
                        let _ = reply.send(engine.query(&filters, &options));
                    }
                    Command::DeleteBefore { cutoff, reply } => {
                        let _ = reply.send(engine.delete_before(cutoff));
                    }
                    Command::Rotate { reply } => {
                        let _ = reply.send(engine.rotate());
                    }
                    Command::RebuildIndexes { reply } => {
                        let _ = reply.send(engine.rebuild_indexes());
                    }
                    Command::Statistics { reply } => {
                        let _ = reply.send(engine.statistics());
                    }
                    Command::Shutdown { reply } => {
                        let _ = reply.send(engine.close());
                        break;
                    }
                }
            }
            recv(rotation) -> _ => {
                if let Err(e) = engine.rotate() {
                    warn!(error = %e, "scheduled audit rotation failed");
                }
            }
        }
    }

    debug!("audit storage worker stopped");
}
