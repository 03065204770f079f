//! # raxol-audit
//!
//! The event logger for the Raxol audit engine.
//!
//! ## Overview
//!
//! Application code reports what happened through the `log_*` helpers on
//! `AuditLogger`. Each event is enriched with deployment context, signed
//! with HMAC-SHA256, optionally sealed with AES-256-GCM and buffered. The
//! buffer is flushed to the storage engine, and to an external `EventStore`
//! when one is configured, whenever a critical event arrives, the buffer
//! fills, or the flush timer fires.
//!
//! The logger also drives retention sweeps and periodic integrity checks.
//! An integrity check that finds a tampered record raises a critical
//! `integrity_check_failed` event of its own.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use raxol_audit::{AuditLogger, EventContext};
//! use raxol_storage::StorageService;
//!
//! let storage = StorageService::start(&config)?;
//! let logger = AuditLogger::builder(config, storage.handle()).start()?;
//!
//! logger.log_authentication("alice", "password", Outcome::Failure, EventContext::new().ip("10.0.0.5"))?;
//! logger.flush()?;
//! let report = logger.verify_integrity(TimeRange::last(3_600_000))?;
//! assert!(report.is_clean());
//! ```

pub mod alert;
pub mod builders;
pub mod enrich;
pub mod integrity;
pub mod logger;
pub mod memory;
pub mod service;

pub use alert::AlertDispatcher;
pub use builders::EventContext;
pub use enrich::Enricher;
pub use integrity::{IntegrityReport, INTEGRITY_FAILURE_EVENT};
pub use logger::{LoggerCore, LoggerPhase, LoggerStatus};
pub use memory::InMemoryEventStore;
pub use service::{AuditLogger, AuditLoggerBuilder, LoggerTimeouts};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use crossbeam::channel::{unbounded, Sender};
    use serde_json::{json, Value};

    use raxol_contracts::event::{date_key, now_millis};
    use raxol_contracts::{
        AuditConfig, AuditError, AuditEvent, AuditResult, Category, EventBody, Outcome,
        QueryFilters, QueryOptions, Severity, SiemConfig, SiemKind, StoredRecord, TimeRange,
    };
    use raxol_core::{
        AlertHandler, AppendOptions, EventStore, HttpRequest, HttpResponse, HttpTransport,
        KeyMaterial, SignatureCheck,
    };
    use raxol_storage::segment::current_file_name;
    use raxol_storage::StorageService;

    use super::*;

    const BASE: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;
    const WAIT: Duration = Duration::from_secs(5);

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn keys() -> KeyMaterial {
        KeyMaterial::from_bytes([1u8; 32], [2u8; 32])
    }

    fn config(root: &Path) -> AuditConfig {
        AuditConfig {
            compress_logs: false,
            buffer_size: 1_000,
            node: "raxol@host-a".to_string(),
            environment: "test".to_string(),
            ..AuditConfig::with_storage_path(root)
        }
    }

    fn core_with(config: AuditConfig) -> (StorageService, LoggerCore) {
        let storage = StorageService::start(&config).unwrap();
        let core = LoggerCore::new(config, keys(), storage.handle());
        (storage, core)
    }

    fn fixed(id: &str, ts: i64, user: &str, severity: Severity) -> AuditEvent {
        AuditEvent::with_id(
            id,
            ts,
            Category::DataAccess,
            severity,
            EventBody::new("data_read").user(user).action("read"),
        )
    }

    fn stored(core: &mut LoggerCore, filters: QueryFilters) -> Vec<StoredRecord> {
        core.query(filters, QueryOptions::unlimited()).unwrap()
    }

    /// Posts every request to a channel and answers with `status`.
    struct ChannelTransport {
        tx: Sender<HttpRequest>,
        status: u16,
    }

    impl HttpTransport for ChannelTransport {
        fn post(&self, request: &HttpRequest) -> AuditResult<HttpResponse> {
            let _ = self.tx.send(request.clone());
            Ok(HttpResponse {
                status: self.status,
                body: String::new(),
            })
        }
    }

    fn alert_channel() -> (Arc<dyn AlertHandler>, crossbeam::channel::Receiver<String>) {
        let (tx, rx) = unbounded();
        let handler = move |event: &AuditEvent| -> AuditResult<()> {
            let _ = tx.send(event.event_id.clone());
            Ok(())
        };
        let handler: Arc<dyn AlertHandler> = Arc::new(handler);
        (handler, rx)
    }

    // ── Builders ──────────────────────────────────────────────────────────────

    #[test]
    fn authentication_severity_follows_outcome() {
        use builders::authentication_severity as sev;
        assert_eq!(sev(Outcome::Success), Severity::Info);
        assert_eq!(sev(Outcome::Failure), Severity::Medium);
        assert_eq!(sev(Outcome::Denied), Severity::Medium);
        assert_eq!(sev(Outcome::Error), Severity::Low);
        assert_eq!(sev(Outcome::Unknown), Severity::Low);

        assert_eq!(builders::authorization_severity(Outcome::Denied), Severity::Medium);
        assert_eq!(builders::authorization_severity(Outcome::Partial), Severity::Low);
    }

    #[test]
    fn data_access_severity_weighs_operation_over_classification() {
        use builders::data_access_severity as sev;
        assert_eq!(sev("read", None), Severity::Info);
        assert_eq!(sev("read", Some("PHI")), Severity::Low);
        assert_eq!(sev("read", Some("public")), Severity::Info);
        assert_eq!(sev("delete", None), Severity::Medium);
        assert_eq!(sev("export", Some("pii")), Severity::Medium);
    }

    #[test]
    fn builders_fill_conventional_fields() {
        let ctx = EventContext::new().ip("10.0.0.5").session("s-1").meta("tenant", "acme");
        let auth = builders::authentication("alice", "password", Outcome::Failure, ctx);
        assert_eq!(auth.category, Category::Authentication);
        assert_eq!(auth.event_type(), "authentication_failure");
        assert_eq!(auth.body.detail_str("auth_method"), Some("password"));
        assert_eq!(auth.body.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(auth.body.session_id.as_deref(), Some("s-1"));
        assert_eq!(auth.body.metadata["tenant"], "acme");

        let change = builders::configuration_change("root", "max_sessions", json!(5), json!(50), EventContext::new());
        assert_eq!(change.severity, Severity::Medium);
        assert_eq!(change.body.resource_type.as_deref(), Some("setting"));
        assert_eq!(change.body.resource_id.as_deref(), Some("max_sessions"));
        assert_eq!(change.body.details["new_value"], json!(50));

        let dsr = builders::privacy("subject-9", "erasure", None, EventContext::new());
        assert_eq!(dsr.category, Category::Privacy);
        assert_eq!(dsr.severity, Severity::Low);
        assert_eq!(dsr.event_type(), builders::DSR_EVENT_TYPE);
        assert_eq!(dsr.body.action.as_deref(), Some("erasure"));
        assert!(dsr.body.outcome.is_none());

        let cmd = builders::terminal_command("bob", "ls -la", Outcome::Success, None, EventContext::new());
        assert_eq!(cmd.severity, Severity::Info);
        assert_eq!(cmd.body.command.as_deref(), Some("ls -la"));

        let sec = builders::security("port_scan", Severity::High, "scan from 10.9.9.9", EventContext::new().user("ids"));
        assert_eq!(sec.severity, Severity::High);
        assert_eq!(sec.body.user_id.as_deref(), Some("ids"));
    }

    // ── Enrichment ────────────────────────────────────────────────────────────

    #[test]
    fn enrichment_fills_context_without_overwriting() {
        let enricher = Enricher::new("raxol@node-1", "prod", "2.0.0");
        let mut event = fixed("", 0, "alice", Severity::Info);
        event.environment = Some("staging".to_string());
        enricher.enrich(&mut event, BASE);

        assert!(!event.event_id.is_empty());
        assert_eq!(event.timestamp, BASE);
        assert_eq!(event.node.as_deref(), Some("raxol@node-1"));
        assert_eq!(event.environment.as_deref(), Some("staging"));
        assert_eq!(event.version.as_deref(), Some("2.0.0"));
        assert_eq!(event.enriched_at, Some(BASE));
    }

    // ── Logging pipeline ──────────────────────────────────────────────────────

    #[test]
    fn failed_login_is_stored_as_medium_and_verifiable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let storage = StorageService::start(&config).unwrap();
        let logger = AuditLogger::builder(config, storage.handle()).keys(keys()).start().unwrap();

        logger
            .log_authentication("alice", "password", Outcome::Failure, EventContext::new().ip("10.0.0.5"))
            .unwrap();
        assert_eq!(logger.flush().unwrap(), 1);

        let records = logger
            .query(QueryFilters::new().user("alice"), QueryOptions::unlimited())
            .unwrap();
        assert_eq!(records.len(), 1);
        let event = records[0].as_event().unwrap();
        assert_eq!(event.category, Category::Authentication);
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.event_type(), "authentication_failure");
        assert_eq!(event.body.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(event.node.as_deref(), Some("raxol@host-a"));
        assert!(event.enriched_at.is_some());
        assert_eq!(keys().signer().verify(event), SignatureCheck::Valid);

        logger.shutdown();
        storage.shutdown().unwrap();
    }

    #[test]
    fn events_below_log_level_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            log_level: Severity::Medium,
            ..config(dir.path())
        });

        core.log_event(fixed("low-1", BASE, "alice", Severity::Low)).unwrap();
        core.log_event(fixed("med-1", BASE, "alice", Severity::Medium)).unwrap();

        let status = core.status();
        assert_eq!(status.dropped, 1);
        assert_eq!(status.logged, 1);
        let ids: Vec<_> = stored(&mut core, QueryFilters::new()).iter().map(|r| r.event_id().to_string()).collect();
        assert_eq!(ids, vec!["med-1"]);
    }

    #[test]
    fn disabled_logger_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            enabled: false,
            ..config(dir.path())
        });

        core.log_event(fixed("e1", BASE, "alice", Severity::Critical)).unwrap();
        assert_eq!(core.status().buffered, 0);
        assert!(stored(&mut core, QueryFilters::new()).is_empty());
    }

    #[test]
    fn buffer_flushes_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let (storage, mut core) = core_with(AuditConfig {
            buffer_size: 3,
            ..config(dir.path())
        });
        let handle = storage.handle();
        let all = || handle.query(QueryFilters::new(), QueryOptions::unlimited()).unwrap();

        core.log_event(fixed("e1", BASE, "alice", Severity::Info)).unwrap();
        core.log_event(fixed("e2", BASE + 1, "alice", Severity::Info)).unwrap();
        assert_eq!(core.status().phase, LoggerPhase::Buffering);
        assert_eq!(core.status().buffered, 2);
        assert!(all().is_empty());

        core.log_event(fixed("e3", BASE + 2, "alice", Severity::Info)).unwrap();
        assert_eq!(core.status().phase, LoggerPhase::Idle);
        assert_eq!(core.status().buffered, 0);
        assert_eq!(all().len(), 3);
    }

    #[test]
    fn critical_event_flushes_inline() {
        let dir = tempfile::tempdir().unwrap();
        let (storage, mut core) = core_with(config(dir.path()));

        core.log_event(fixed("e1", BASE, "alice", Severity::Info)).unwrap();
        core.log_event(fixed("crit", BASE + 1, "alice", Severity::Critical)).unwrap();

        let records = storage.handle().query(QueryFilters::new(), QueryOptions::unlimited()).unwrap();
        assert_eq!(records.len(), 2, "the critical flush carries the whole buffer");
        assert_eq!(core.status().flushed, 2);
        assert!(core.status().last_flush_at.is_some());
    }

    #[test]
    fn flush_with_nothing_buffered_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(config(dir.path()));
        assert_eq!(core.flush().unwrap(), 0);
        assert_eq!(core.status().phase, LoggerPhase::Idle);
    }

    #[test]
    fn signing_can_be_turned_off() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            sign_events: false,
            ..config(dir.path())
        });
        core.log_event(fixed("e1", BASE, "alice", Severity::Info)).unwrap();
        let records = stored(&mut core, QueryFilters::new());
        assert!(records[0].as_event().unwrap().signature.is_none());

        let report = core.verify_integrity(TimeRange::new(BASE - HOUR, BASE + HOUR)).unwrap();
        assert_eq!(report.unsigned, 1);
        assert!(report.is_clean());
    }

    // ── Encryption ────────────────────────────────────────────────────────────

    #[test]
    fn encrypted_events_are_sealed_and_open_to_a_signed_event() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            encrypt_events: true,
            ..config(dir.path())
        });
        core.log_event(fixed("secret-1", BASE, "alice", Severity::Low)).unwrap();

        let records = stored(&mut core, QueryFilters::new());
        let StoredRecord::Sealed(sealed) = &records[0] else {
            panic!("expected a sealed record");
        };
        assert_eq!(sealed.event_id, "secret-1");

        let line = std::fs::read_to_string(dir.path().join(current_file_name(&date_key(BASE)))).unwrap();
        assert!(!line.contains("alice"), "plaintext must not reach disk");

        let opened = keys().cipher().open(sealed).unwrap();
        assert_eq!(opened.body.user_id.as_deref(), Some("alice"));
        assert_eq!(keys().signer().verify(&opened), SignatureCheck::Valid);

        let report = core.verify_integrity(TimeRange::new(BASE - HOUR, BASE + HOUR)).unwrap();
        assert_eq!(report.valid, 1);
    }

    // ── Event store ───────────────────────────────────────────────────────────

    #[test]
    fn flush_appends_to_a_daily_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryEventStore::new();
        let (_storage, core) = core_with(config(dir.path()));
        let mut core = core.with_event_store(Arc::new(store.clone()));

        core.log_event(fixed("d1", BASE, "alice", Severity::Info)).unwrap();
        core.log_event(fixed("d2", BASE + 24 * HOUR, "alice", Severity::Info)).unwrap();
        core.flush().unwrap();

        let day_one = format!("audit-{}", date_key(BASE));
        let day_two = format!("audit-{}", date_key(BASE + 24 * HOUR));
        assert_eq!(store.stream_names().unwrap(), vec![day_one.clone(), day_two.clone()]);
        assert_eq!(store.stream(&day_one).unwrap()[0].event_id(), "d1");
        assert_eq!(store.stream(&day_two).unwrap()[0].event_id(), "d2");
    }

    #[test]
    fn failed_flush_retains_the_batch_until_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryEventStore::new();
        store.fail_next(1).unwrap();
        let (storage, core) = core_with(config(dir.path()));
        let mut core = core.with_event_store(Arc::new(store.clone()));

        core.log_event(fixed("r1", BASE, "alice", Severity::Info)).unwrap();
        core.log_event(fixed("r2", BASE + 1, "bob", Severity::Info)).unwrap();

        let err = core.flush().unwrap_err();
        assert!(matches!(err, AuditError::EventStore { .. }));
        let status = core.status();
        assert_eq!(status.phase, LoggerPhase::Buffering);
        assert_eq!(status.buffered, 2);
        assert_eq!(status.flush_failures, 1);

        assert_eq!(core.flush().unwrap(), 2);
        assert_eq!(core.status().buffered, 0);
        assert_eq!(store.total_records().unwrap(), 2);

        let records = storage.handle().query(QueryFilters::new(), QueryOptions::unlimited()).unwrap();
        assert_eq!(records.len(), 2, "storage drops the records written by the failed attempt");
    }

    #[test]
    fn inline_flush_failure_does_not_fail_logging() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryEventStore::new();
        store.fail_next(1).unwrap();
        let (_storage, core) = core_with(config(dir.path()));
        let mut core = core.with_event_store(Arc::new(store));

        core.log_event(fixed("c1", BASE, "alice", Severity::Critical)).unwrap();
        assert_eq!(core.status().buffered, 1);
    }

    #[test]
    fn logging_fails_once_storage_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let (storage, mut core) = core_with(config(dir.path()));
        storage.shutdown().unwrap();

        core.log_event(fixed("i1", BASE, "alice", Severity::Info)).unwrap();
        let err = core.log_event(fixed("c1", BASE, "alice", Severity::Critical)).unwrap_err();
        assert!(err.is_catastrophic());
        assert_eq!(core.status().buffered, 2);
    }

    #[test]
    fn in_memory_store_acknowledges_repeated_batches_once() {
        let store = InMemoryEventStore::new();
        let records = vec![StoredRecord::from(fixed("m1", BASE, "alice", Severity::Info))];
        let opts = AppendOptions {
            batch_id: Some("batch-1".to_string()),
        };

        let first = store.append_events(&records, "audit-x", &opts).unwrap();
        let again = store.append_events(&records, "audit-x", &opts).unwrap();
        assert_eq!(first, vec!["audit-x:0".to_string()]);
        assert_eq!(again, first);
        assert_eq!(store.total_records().unwrap(), 1);

        store.append_events(&records, "audit-x", &AppendOptions::default()).unwrap();
        assert_eq!(store.stream("audit-x").unwrap().len(), 2);
    }

    // ── Alerting ──────────────────────────────────────────────────────────────

    #[test]
    fn high_and_critical_events_reach_alert_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(config(dir.path()));
        let (handler, alerts) = alert_channel();
        core.register_alert_handler(handler);

        core.log_event(fixed("quiet", BASE, "alice", Severity::Medium)).unwrap();
        core.log_event(fixed("loud", BASE + 1, "alice", Severity::High)).unwrap();

        assert_eq!(alerts.recv_timeout(WAIT).unwrap(), "loud");
        assert!(alerts.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(core.status().alerts_dispatched, 1);
    }

    #[test]
    fn alerts_respect_alert_on_critical() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            alert_on_critical: false,
            ..config(dir.path())
        });
        let (handler, alerts) = alert_channel();
        core.register_alert_handler(handler);

        core.log_event(fixed("c1", BASE, "alice", Severity::Critical)).unwrap();
        assert!(alerts.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn failing_alert_handler_does_not_block_logging() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(config(dir.path()));
        let failing = |_: &AuditEvent| -> AuditResult<()> {
            Err(AuditError::Siem {
                reason: "pager offline".to_string(),
            })
        };
        core.register_alert_handler(Arc::new(failing));
        let (handler, alerts) = alert_channel();
        core.register_alert_handler(handler);

        core.log_event(fixed("c1", BASE, "alice", Severity::Critical)).unwrap();
        assert_eq!(alerts.recv_timeout(WAIT).unwrap(), "c1");
        assert_eq!(stored(&mut core, QueryFilters::new()).len(), 1);
    }

    // ── Integrity ─────────────────────────────────────────────────────────────

    #[test]
    fn tampering_with_one_record_is_detected_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(config(dir.path()));
        for (i, user) in ["alice", "bob", "alice", "carol", "bob"].iter().enumerate() {
            core.log_event(fixed(&format!("t{}", i), BASE + i as i64, user, Severity::Info)).unwrap();
        }
        core.flush().unwrap();

        let window = TimeRange::new(BASE - HOUR, BASE + HOUR);
        let clean = core.verify_integrity(window).unwrap();
        assert_eq!(clean.checked, 5);
        assert_eq!(clean.valid, 5);
        assert!(clean.is_clean());

        let path = dir.path().join(current_file_name(&date_key(BASE)));
        let tampered: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| {
                let mut value: Value = serde_json::from_str(line).unwrap();
                if value["event_id"] == "t2" {
                    value["user_id"] = json!("mallory");
                }
                value.to_string()
            })
            .collect();
        std::fs::write(&path, tampered.join("\n") + "\n").unwrap();

        let report = core.verify_integrity(window).unwrap();
        assert_eq!(report.tampered, vec!["t2".to_string()]);
        assert_eq!(report.valid, 4);
        assert_eq!(core.status().integrity_failures, 1);

        let raised = stored(&mut core, QueryFilters::new().event_type(INTEGRITY_FAILURE_EVENT));
        assert_eq!(raised.len(), 1);
        let alert = raised[0].as_event().unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.category, Category::Security);
        assert_eq!(alert.body.details["tampered_event_ids"], json!(["t2"]));
    }

    #[test]
    fn stripping_the_signature_does_not_hide_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(config(dir.path()));
        for (i, user) in ["alice", "bob", "carol"].iter().enumerate() {
            core.log_event(fixed(&format!("t{}", i), BASE + i as i64, user, Severity::Info)).unwrap();
        }
        core.flush().unwrap();

        let path = dir.path().join(current_file_name(&date_key(BASE)));
        let edited: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| {
                let mut value: Value = serde_json::from_str(line).unwrap();
                if value["event_id"] == "t2" {
                    value["user_id"] = json!("mallory");
                    value.as_object_mut().unwrap().remove("signature");
                }
                value.to_string()
            })
            .collect();
        std::fs::write(&path, edited.join("\n") + "\n").unwrap();

        let report = core.verify_integrity(TimeRange::new(BASE - HOUR, BASE + HOUR)).unwrap();
        assert_eq!(report.tampered, vec!["t2".to_string()]);
        assert_eq!(report.valid, 2);
        assert_eq!(report.unsigned, 0);
    }

    #[test]
    fn degraded_records_may_be_unsigned() {
        let mut event = fixed("d1", BASE, "alice", Severity::Info);
        event.degraded = Some("signing failed".to_string());
        let report = integrity::verify_records(
            TimeRange::new(BASE - HOUR, BASE + HOUR),
            &[StoredRecord::Plain(event)],
            &keys().signer(),
            None,
            true,
        );
        assert_eq!(report.unsigned, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn oversized_integrity_window_stays_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            integrity_window_ms: u64::MAX,
            ..config(dir.path())
        });
        core.log_event(fixed("w1", now_millis(), "alice", Severity::Info)).unwrap();

        let report = core.verify_recent().unwrap();
        assert!(report.window.start <= report.window.end);
        assert_eq!(report.checked, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn corrupted_ciphertext_counts_as_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            encrypt_events: true,
            ..config(dir.path())
        });
        core.log_event(fixed("s1", BASE, "alice", Severity::Info)).unwrap();
        core.flush().unwrap();

        let records = stored(&mut core, QueryFilters::new());
        let StoredRecord::Sealed(mut sealed) = records[0].clone() else {
            panic!("expected a sealed record");
        };
        sealed.data = sealed.data.chars().rev().collect();
        let report = integrity::verify_records(
            TimeRange::new(BASE - HOUR, BASE + HOUR),
            &[StoredRecord::Sealed(sealed.clone())],
            &keys().signer(),
            Some(&keys().cipher()),
            true,
        );
        assert_eq!(report.tampered, vec!["s1".to_string()]);

        let without_key = integrity::verify_records(
            TimeRange::new(BASE - HOUR, BASE + HOUR),
            &[StoredRecord::Sealed(sealed)],
            &keys().signer(),
            None,
            true,
        );
        assert_eq!(without_key.unverifiable, 1);
        assert!(without_key.is_clean());
    }

    // ── Retention ─────────────────────────────────────────────────────────────

    #[test]
    fn retention_removes_only_expired_records() {
        let dir = tempfile::tempdir().unwrap();
        let (_storage, mut core) = core_with(AuditConfig {
            retention_days: 30,
            ..config(dir.path())
        });
        let now = now_millis();
        core.log_event(fixed("old", now - 31 * 24 * HOUR, "alice", Severity::Info)).unwrap();
        core.log_event(fixed("recent", now - HOUR, "alice", Severity::Info)).unwrap();
        core.flush().unwrap();

        assert_eq!(core.run_retention().unwrap(), 1);
        let ids: Vec<_> = stored(&mut core, QueryFilters::new()).iter().map(|r| r.event_id().to_string()).collect();
        assert_eq!(ids, vec!["recent"]);
    }

    // ── SIEM forwarding ───────────────────────────────────────────────────────

    #[test]
    fn flushed_batches_are_forwarded_to_the_siem() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, requests) = unbounded();
        let config = AuditConfig {
            siem_integration: Some(SiemConfig {
                kind: SiemKind::Webhook,
                endpoint: "https://hooks.example.test/audit".to_string(),
                token: Some("t0k".to_string()),
                index: None,
                timeout_ms: 1_000,
                headers: Default::default(),
            }),
            ..config(dir.path())
        };
        let (_storage, core) = core_with(config);
        let mut core = core.with_siem_transport(Arc::new(ChannelTransport { tx, status: 200 }));

        core.log_event(fixed("f1", BASE, "alice", Severity::Info)).unwrap();
        core.log_event(fixed("f2", BASE + 1, "bob", Severity::Info)).unwrap();
        core.flush().unwrap();

        let request = requests.recv_timeout(WAIT).unwrap();
        assert_eq!(request.url, "https://hooks.example.test/audit");
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["count"], 2);
        assert_eq!(body["events"][0]["event_id"], "f1");
    }

    #[test]
    fn siem_forwarding_needs_export_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, requests) = unbounded();
        let config = AuditConfig {
            export_enabled: false,
            siem_integration: Some(SiemConfig {
                kind: SiemKind::Webhook,
                endpoint: "https://hooks.example.test/audit".to_string(),
                token: None,
                index: None,
                timeout_ms: 1_000,
                headers: Default::default(),
            }),
            ..config(dir.path())
        };
        let (_storage, core) = core_with(config);
        let mut core = core.with_siem_transport(Arc::new(ChannelTransport { tx, status: 200 }));

        core.log_event(fixed("f1", BASE, "alice", Severity::Critical)).unwrap();
        assert!(requests.recv_timeout(Duration::from_millis(200)).is_err());
    }

    // ── AuditLogger service ───────────────────────────────────────────────────

    #[test]
    fn shutdown_flushes_what_is_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let storage = StorageService::start(&config).unwrap();
        let logger = AuditLogger::builder(config, storage.handle()).keys(keys()).start().unwrap();

        logger
            .log_data_access("alice", "read", "record", "r-1", Some("phi"), EventContext::new())
            .unwrap();
        logger
            .log_privacy_event("subject-1", "access", Some(Outcome::Success), EventContext::new())
            .unwrap();
        assert_eq!(logger.status().unwrap().buffered, 2);
        logger.shutdown();

        let records = storage.handle().query(QueryFilters::new(), QueryOptions::unlimited()).unwrap();
        assert_eq!(records.len(), 2);
        storage.shutdown().unwrap();
    }

    #[test]
    fn periodic_flush_runs_without_a_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            flush_interval_ms: 50,
            ..config(dir.path())
        };
        let storage = StorageService::start(&config).unwrap();
        let logger = AuditLogger::builder(config, storage.handle()).keys(keys()).start().unwrap();

        logger
            .log_terminal_command("bob", "ls", Outcome::Success, None, EventContext::new())
            .unwrap();

        let handle = storage.handle();
        let mut found = 0;
        for _ in 0..100 {
            found = handle.query(QueryFilters::new(), QueryOptions::unlimited()).unwrap().len();
            if found == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(found, 1);
    }

    #[test]
    fn logger_helpers_and_alert_registration_work_through_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let storage = StorageService::start(&config).unwrap();
        let store = InMemoryEventStore::new();
        let logger = AuditLogger::builder(config, storage.handle())
            .keys(keys())
            .event_store(Arc::new(store.clone()))
            .start()
            .unwrap();
        let (handler, alerts) = alert_channel();
        logger.register_alert_handler(handler).unwrap();

        logger
            .log_authorization("bob", "file", "/etc/shadow", "read", Outcome::Denied, Some("no role"), EventContext::new())
            .unwrap();
        logger
            .log_configuration_change("root", "audit.enabled", json!(true), json!(false), EventContext::new())
            .unwrap();
        logger
            .log_compliance_event("policy_review", "quarterly review", EventContext::new())
            .unwrap();
        logger
            .log_security_event("brute_force", Severity::Critical, "20 failures in 60s", EventContext::new().ip("10.0.0.9"))
            .unwrap();

        assert!(!alerts.recv_timeout(WAIT).unwrap().is_empty());
        let status = logger.status().unwrap();
        assert_eq!(status.flushed, 4);
        assert_eq!(status.key_fingerprint, keys().fingerprint());
        assert!(!status.ephemeral_keys);
        assert_eq!(store.total_records().unwrap(), 4);

        let denied = logger
            .query(QueryFilters::new().event_type("authorization_denied"), QueryOptions::unlimited())
            .unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].as_event().unwrap().severity, Severity::Medium);

        let report = logger.verify_integrity(TimeRange::last(HOUR)).unwrap();
        assert_eq!(report.valid, 4);
    }

    #[test]
    fn invalid_config_is_rejected_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let good = config(dir.path());
        let storage = StorageService::start(&good).unwrap();
        let err = AuditLogger::builder(
            AuditConfig {
                buffer_size: 0,
                ..good
            },
            storage.handle(),
        )
        .keys(keys())
        .start()
        .err()
        .unwrap();
        assert!(matches!(err, AuditError::ConfigError { .. }));
    }
}
