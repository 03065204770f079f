//! The event logger: the ingestion pipeline and its buffer.
//!
//! Every accepted event goes through the same pipeline:
//!
//!   Filter → Enrich → Sign → Alert → Encrypt → Buffer → (Flush)
//!
//! Enrichment happens before signing so the enrichment fields are covered by
//! the signature, and signing happens before encryption so a sealed record
//! carries a verifiable event inside it. A failed signature or encryption
//! never loses the event: it is stored unprotected with a `degraded` marker
//! naming the failure.
//!
//! `LoggerCore` is single-threaded state. `AuditLogger` owns one on its
//! worker thread and drives the periodic flush, retention and integrity
//! cycles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use raxol_contracts::event::{date_key, now_millis};
use raxol_contracts::{
    AuditConfig, AuditEvent, AuditResult, QueryFilters, QueryOptions, Severity,
    StoredRecord, TimeRange,
};
use raxol_core::{
    AlertHandler, AppendOptions, EventCipher, EventSigner, EventStore, HttpTransport, KeyMaterial,
};
use raxol_export::SiemForwarder;
use raxol_storage::StorageHandle;

use crate::alert::AlertDispatcher;
use crate::enrich::Enricher;
use crate::integrity::{integrity_alert, verify_records, IntegrityReport};

/// Prefix of the per-day event store stream.
pub const STREAM_PREFIX: &str = "audit-";

/// Where the logger is in its buffer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggerPhase {
    /// Nothing buffered.
    Idle,
    /// Events buffered, including a batch retained after a failed flush.
    Buffering,
    Flushing,
}

impl fmt::Display for LoggerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoggerPhase::Idle => "idle",
            LoggerPhase::Buffering => "buffering",
            LoggerPhase::Flushing => "flushing",
        };
        f.write_str(s)
    }
}

/// A point-in-time view of the logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerStatus {
    pub phase: LoggerPhase,
    pub enabled: bool,
    pub buffered: usize,
    /// Events accepted into the buffer.
    pub logged: u64,
    /// Events below `log_level`, or logged while disabled.
    pub dropped: u64,
    /// Events stored without the protection the configuration asked for.
    pub degraded: u64,
    /// Events durably stored.
    pub flushed: u64,
    pub flush_failures: u64,
    pub alerts_dispatched: u64,
    pub integrity_failures: u64,
    pub last_flush_at: Option<i64>,
    pub key_fingerprint: String,
    pub ephemeral_keys: bool,
}

#[derive(Debug, Default)]
struct Counters {
    logged: u64,
    dropped: u64,
    degraded: u64,
    flushed: u64,
    flush_failures: u64,
    alerts_dispatched: u64,
    integrity_failures: u64,
}

/// The id given to a buffer's first flush attempt, reused while the buffer
/// is unchanged so the event store can drop a repeated append.
struct PendingBatch {
    id: String,
    len: usize,
}

/// The logger's buffer and pipeline.
pub struct LoggerCore {
    config: AuditConfig,
    keys: KeyMaterial,
    signer: EventSigner,
    cipher: EventCipher,
    enricher: Enricher,
    storage: StorageHandle,
    event_store: Option<Arc<dyn EventStore>>,
    siem: Option<SiemForwarder>,
    alerts: AlertDispatcher,
    buffer: Vec<StoredRecord>,
    pending: Option<PendingBatch>,
    phase: LoggerPhase,
    counters: Counters,
    last_flush_at: Option<i64>,
}

impl LoggerCore {
    /// A logger writing to `storage` under `keys`.
    ///
    /// When `siem_integration` is configured and `export_enabled` is set,
    /// every flushed batch is also forwarded over `reqwest`; use
    /// `with_siem_transport` to post through something else.
    pub fn new(config: AuditConfig, keys: KeyMaterial, storage: StorageHandle) -> Self {
        let siem = config
            .siem_integration
            .clone()
            .filter(|_| config.export_enabled)
            .map(SiemForwarder::with_reqwest);
        Self {
            enricher: Enricher::from_config(&config),
            signer: keys.signer(),
            cipher: keys.cipher(),
            keys,
            config,
            storage,
            event_store: None,
            siem,
            alerts: AlertDispatcher::new(),
            buffer: Vec::new(),
            pending: None,
            phase: LoggerPhase::Idle,
            counters: Counters::default(),
            last_flush_at: None,
        }
    }

    pub fn with_event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn with_siem_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.siem = self
            .config
            .siem_integration
            .clone()
            .filter(|_| self.config.export_enabled)
            .map(|siem| SiemForwarder::new(siem, transport));
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn register_alert_handler(&mut self, handler: Arc<dyn AlertHandler>) {
        self.alerts.register(handler);
        debug!(handlers = self.alerts.handler_count(), "alert handler registered");
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Run `event` through the pipeline.
    ///
    /// # Pipeline
    ///
    /// 1. Drop the event when logging is disabled or it is below `log_level`
    /// 2. Enrich with node, environment, version and `enriched_at`
    /// 3. Sign when `sign_events` is set
    /// 4. Dispatch alert handlers for high and critical events
    /// 5. Seal when `encrypt_events` is set
    /// 6. Buffer, flushing inline for critical events or a full buffer
    ///
    /// Returns `Err` only for a catastrophic flush failure; anything else
    /// leaves the batch buffered for the next cycle.
    pub fn log_event(&mut self, mut event: AuditEvent) -> AuditResult<()> {
        // ── Step 1: Filter ───────────────────────────────────────────────────
        if !self.config.enabled || event.severity < self.config.log_level {
            self.counters.dropped += 1;
            return Ok(());
        }

        // ── Step 2: Enrich ───────────────────────────────────────────────────
        self.enricher.enrich(&mut event, now_millis());

        // ── Step 3: Sign ─────────────────────────────────────────────────────
        if self.config.sign_events {
            if let Err(e) = self.signer.sign_in_place(&mut event) {
                warn!(event_id = %event.event_id, error = %e, "signing failed, storing event unsigned");
                event.signature = None;
                event.degraded = Some(format!("signing failed: {}", e));
            }
        }

        // ── Step 4: Alert ────────────────────────────────────────────────────
        if self.config.alert_on_critical && event.severity.is_alerting() {
            match self.alerts.dispatch(&event) {
                Ok(true) => self.counters.alerts_dispatched += 1,
                Ok(false) => {}
                Err(e) => warn!(event_id = %event.event_id, error = %e, "alert dispatch failed"),
            }
        }

        // ── Step 5: Encrypt ──────────────────────────────────────────────────
        let record = if self.config.encrypt_events {
            match self.cipher.seal(&event) {
                Ok(sealed) => StoredRecord::Sealed(sealed),
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "encryption failed, storing event in plaintext");
                    self.mark_degraded(&mut event, format!("encryption failed: {}", e));
                    StoredRecord::Plain(event.clone())
                }
            }
        } else {
            StoredRecord::Plain(event.clone())
        };
        if event.degraded.is_some() {
            self.counters.degraded += 1;
        }

        // ── Step 6: Buffer ───────────────────────────────────────────────────
        self.buffer.push(record);
        self.counters.logged += 1;
        if self.phase == LoggerPhase::Idle {
            self.phase = LoggerPhase::Buffering;
        }
        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type(),
            severity = %event.severity,
            buffered = self.buffer.len(),
            "audit event buffered"
        );

        let urgent = event.severity == Severity::Critical;
        if urgent || self.buffer.len() >= self.config.buffer_size {
            if let Err(e) = self.flush() {
                if e.is_catastrophic() {
                    error!(error = %e, "audit flush failed and cannot recover");
                    return Err(e);
                }
                warn!(error = %e, buffered = self.buffer.len(), "inline flush deferred");
            }
        }
        Ok(())
    }

    /// Record `reason` on an event that will be stored with less protection
    /// than configured. The signature is recomputed since the marker is part
    /// of the signed form.
    fn mark_degraded(&self, event: &mut AuditEvent, reason: String) {
        event.degraded = Some(reason);
        if self.config.sign_events && event.signature.is_some() && self.signer.sign_in_place(event).is_err() {
            event.signature = None;
        }
    }

    // ── Flush ────────────────────────────────────────────────────────────────

    /// Write the buffer to storage and the event store.
    ///
    /// On success the buffer is cleared and the batch is handed to the SIEM
    /// forwarder. On any failure the whole buffer is kept; storage drops the
    /// records it already holds when the batch is retried.
    pub fn flush(&mut self) -> AuditResult<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        self.phase = LoggerPhase::Flushing;
        let count = self.buffer.len();

        let batch_id = match &self.pending {
            Some(pending) if pending.len == count => pending.id.clone(),
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                self.pending = Some(PendingBatch { id: id.clone(), len: count });
                id
            }
        };

        if let Err(e) = self.write_batch(&batch_id) {
            self.phase = LoggerPhase::Buffering;
            self.counters.flush_failures += 1;
            warn!(batch_id = %batch_id, buffered = count, error = %e, "audit flush failed, batch retained");
            return Err(e);
        }

        let batch = std::mem::take(&mut self.buffer);
        self.pending = None;
        self.phase = LoggerPhase::Idle;
        self.counters.flushed += count as u64;
        self.last_flush_at = Some(now_millis());
        info!(batch_id = %batch_id, events = count, "audit batch flushed");

        self.forward_to_siem(&batch);
        Ok(count)
    }

    fn write_batch(&self, batch_id: &str) -> AuditResult<()> {
        let stored = self.storage.store_batch(self.buffer.clone())?;
        debug!(batch_id = %batch_id, new_records = stored, "batch stored");

        let Some(store) = &self.event_store else {
            return Ok(());
        };
        let mut streams: BTreeMap<String, Vec<StoredRecord>> = BTreeMap::new();
        for record in &self.buffer {
            let stream = format!("{}{}", STREAM_PREFIX, date_key(record.timestamp()));
            streams.entry(stream).or_default().push(record.clone());
        }
        for (stream, records) in streams {
            let opts = AppendOptions {
                batch_id: Some(format!("{}:{}", batch_id, stream)),
            };
            store.append_events(&records, &stream, &opts)?;
        }
        Ok(())
    }

    /// Forward a flushed batch on a detached thread.
    fn forward_to_siem(&self, batch: &[StoredRecord]) {
        let Some(forwarder) = self.siem.clone() else {
            return;
        };
        let events: Vec<AuditEvent> = batch
            .iter()
            .filter_map(|record| match record {
                StoredRecord::Plain(event) => Some(event.clone()),
                StoredRecord::Sealed(sealed) => self.cipher.open(sealed).ok(),
            })
            .collect();
        let spawned = std::thread::Builder::new()
            .name("audit-siem".to_string())
            .spawn(move || {
                if let Err(e) = forwarder.send(&events) {
                    warn!(error = %e, events = events.len(), "SIEM forwarding failed");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "could not start SIEM forwarding thread");
        }
    }

    /// Flush, logging instead of returning the error.
    fn flush_best_effort(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "best-effort audit flush failed");
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Re-verify every stored record in `window`.
    ///
    /// Tampered records raise a critical `integrity_check_failed` event
    /// through the normal pipeline; the report is returned either way.
    pub fn verify_integrity(&mut self, window: TimeRange) -> AuditResult<IntegrityReport> {
        self.flush_best_effort();
        let records = self.storage.query(window.to_filters(), QueryOptions::unlimited())?;
        let report = verify_records(
            window,
            &records,
            &self.signer,
            Some(&self.cipher),
            self.config.sign_events,
        );
        info!(
            checked = report.checked,
            valid = report.valid,
            unsigned = report.unsigned,
            tampered = report.tampered.len(),
            "audit integrity check complete"
        );

        if !report.is_clean() {
            self.counters.integrity_failures += 1;
            error!(tampered = ?report.tampered, "audit integrity check failed");
            self.log_event(integrity_alert(&report))?;
        }
        Ok(report)
    }

    /// Verify the configured trailing window.
    pub fn verify_recent(&mut self) -> AuditResult<IntegrityReport> {
        let window = TimeRange::last(i64::try_from(self.config.integrity_window_ms).unwrap_or(i64::MAX));
        self.verify_integrity(window)
    }

    /// Delete stored records older than `retention_days`.
    pub fn run_retention(&mut self) -> AuditResult<usize> {
        let cutoff = now_millis() - self.config.retention_millis();
        let removed = self.storage.delete_before(cutoff)?;
        info!(cutoff, removed, retention_days = self.config.retention_days, "audit retention sweep");
        Ok(removed)
    }

    /// Query storage after flushing what is buffered.
    pub fn query(&mut self, filters: QueryFilters, options: QueryOptions) -> AuditResult<Vec<StoredRecord>> {
        self.flush_best_effort();
        self.storage.query(filters, options)
    }

    pub fn status(&self) -> LoggerStatus {
        LoggerStatus {
            phase: self.phase,
            enabled: self.config.enabled,
            buffered: self.buffer.len(),
            logged: self.counters.logged,
            dropped: self.counters.dropped,
            degraded: self.counters.degraded,
            flushed: self.counters.flushed,
            flush_failures: self.counters.flush_failures,
            alerts_dispatched: self.counters.alerts_dispatched,
            integrity_failures: self.counters.integrity_failures,
            last_flush_at: self.last_flush_at,
            key_fingerprint: self.keys.fingerprint(),
            ephemeral_keys: self.keys.is_ephemeral(),
        }
    }

    /// One synchronous flush attempt before the logger goes away.
    pub fn shutdown(&mut self) {
        self.flush_best_effort();
        if !self.buffer.is_empty() {
            error!(lost = self.buffer.len(), "audit events still buffered at shutdown");
        }
        info!(
            logged = self.counters.logged,
            flushed = self.counters.flushed,
            "audit logger stopped"
        );
    }
}
