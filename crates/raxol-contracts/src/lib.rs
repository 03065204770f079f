//! # raxol-contracts
//!
//! Shared types for the Raxol audit engine: the audit event model, the
//! on-disk record shape, configuration, query options and the error type.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions, their serde shapes and small helpers.

pub mod config;
pub mod error;
pub mod event;
pub mod query;
pub mod record;
pub mod stats;

pub use config::{AuditConfig, KeySource, SiemConfig, SiemKind};
pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, Category, EventBody, Outcome, Severity};
pub use query::{QueryFilters, QueryOptions, SortField, SortOrder, TimeRange};
pub use record::{SealedEvent, StoredRecord};
pub use stats::StorageStatistics;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> AuditEvent {
        AuditEvent::with_id(
            "evt-1",
            1_700_000_000_000,
            Category::Authentication,
            Severity::Medium,
            EventBody::new("authentication_failure")
                .user("alice")
                .ip("10.0.0.5")
                .outcome(Outcome::Failure)
                .meta("method", "password")
                .detail("mfa_used", false),
        )
    }

    // ── Severity ─────────────────────────────────────────────────────────────

    #[test]
    fn severity_is_totally_ordered() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);

        let mut shuffled = vec![Severity::High, Severity::Info, Severity::Critical, Severity::Low];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Severity::Info, Severity::Low, Severity::High, Severity::Critical]
        );
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!("urgent".parse::<Severity>().is_err());
    }

    // ── Outcome ──────────────────────────────────────────────────────────────

    #[test]
    fn unknown_outcome_deserializes_to_unknown_variant() {
        let o: Outcome = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(o, Outcome::Unknown);
        let o: Outcome = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(o, Outcome::Denied);
        assert_eq!(serde_json::to_string(&Outcome::Success).unwrap(), "\"success\"");
    }

    // ── AuditEvent serde shape ───────────────────────────────────────────────

    #[test]
    fn event_serializes_flat_and_omits_absent_fields() {
        let value = serde_json::to_value(sample_event()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["category"], "authentication");
        assert_eq!(obj["severity"], "medium");
        assert_eq!(obj["event_type"], "authentication_failure");
        assert_eq!(obj["user_id"], "alice");
        assert_eq!(obj["mfa_used"], false, "details flatten into the event object");
        assert!(!obj.contains_key("session_id"));
        assert!(!obj.contains_key("signature"));
    }

    #[test]
    fn canonical_bytes_survive_a_disk_round_trip() {
        let mut event = sample_event();
        event.node = Some("node-a".to_string());
        event.enriched_at = Some(1_700_000_000_001);
        event.signature = Some("deadbeef".to_string());

        let line = serde_json::to_string(&event).unwrap();
        let decoded: AuditEvent = serde_json::from_str(&line).unwrap();

        assert_eq!(decoded, event);
        assert_eq!(decoded.canonical_bytes().unwrap(), event.canonical_bytes().unwrap());
    }

    #[test]
    fn canonical_bytes_ignore_signature_but_not_other_fields() {
        let event = sample_event();
        let mut signed = event.clone();
        signed.signature = Some("abc".to_string());
        assert_eq!(event.canonical_bytes().unwrap(), signed.canonical_bytes().unwrap());

        let mut mutated = event.clone();
        mutated.body.user_id = Some("mallory".to_string());
        assert_ne!(event.canonical_bytes().unwrap(), mutated.canonical_bytes().unwrap());
    }

    #[test]
    fn free_text_joins_populated_fields() {
        let event = AuditEvent::new(
            Category::Terminal,
            Severity::High,
            EventBody::new("command_executed")
                .description("unauthorized sudo attempt")
                .command("sudo rm -rf /"),
        );
        assert_eq!(event.free_text(), "unauthorized sudo attempt sudo rm -rf /");
    }

    // ── StoredRecord ─────────────────────────────────────────────────────────

    #[test]
    fn stored_record_distinguishes_sealed_and_plain_lines() {
        let plain = serde_json::to_string(&StoredRecord::from(sample_event())).unwrap();
        let sealed = serde_json::to_string(&StoredRecord::from(SealedEvent {
            event_id: "evt-2".to_string(),
            timestamp: 5,
            encrypted: true,
            algorithm: record::SEALED_ALGORITHM.to_string(),
            iv: "aXY=".to_string(),
            data: "ZGF0YQ==".to_string(),
        }))
        .unwrap();

        let plain: StoredRecord = serde_json::from_str(&plain).unwrap();
        let sealed: StoredRecord = serde_json::from_str(&sealed).unwrap();

        assert!(!plain.is_sealed());
        assert_eq!(plain.event_id(), "evt-1");
        assert!(sealed.is_sealed());
        assert_eq!(sealed.timestamp(), 5);
    }

    // ── Dates ────────────────────────────────────────────────────────────────

    #[test]
    fn date_key_and_iso8601_are_utc() {
        // 2023-11-14T22:13:20Z
        assert_eq!(event::date_key(1_700_000_000_000), "2023-11-14");
        assert_eq!(event::iso8601(1_700_000_000_000), "2023-11-14T22:13:20.000Z");
    }

    // ── Config ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_toml_yields_defaults() {
        let config = AuditConfig::from_toml_str("").unwrap();
        assert_eq!(config, AuditConfig::default());
        assert_eq!(config.buffer_size, 100);
        assert_eq!(config.log_level, Severity::Info);
    }

    #[test]
    fn toml_overrides_and_nested_tables_parse() {
        let toml = r#"
            log_level = "medium"
            buffer_size = 10
            encrypt_events = true

            [keys]
            source = "hex"
            signing_key = "0000000000000000000000000000000000000000000000000000000000000001"
            encryption_key = "0000000000000000000000000000000000000000000000000000000000000002"

            [siem_integration]
            type = "splunk"
            endpoint = "https://splunk.local:8088/services/collector"
            token = "hec-token"
        "#;
        let config = AuditConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.log_level, Severity::Medium);
        assert_eq!(config.buffer_size, 10);
        assert!(config.encrypt_events);
        assert!(matches!(config.keys, KeySource::Hex { .. }));
        let siem = config.siem_integration.unwrap();
        assert_eq!(siem.kind, SiemKind::Splunk);
        assert_eq!(siem.timeout_ms, 10_000);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = AuditConfig::from_toml_str("buffer_size = 0").unwrap_err();
        assert!(err.to_string().contains("buffer_size"));

        let err = AuditConfig::from_toml_str(
            "[siem_integration]\ntype = \"webhook\"\nendpoint = \"ftp://nope\"",
        )
        .unwrap_err();
        assert!(err.to_string().contains("http(s)"));

        let err = AuditConfig::from_toml_str("[keys]\nsource = \"hex\"\nsigning_key = \"zz\"\nencryption_key = \"zz\"")
            .unwrap_err();
        assert!(err.to_string().contains("64 hex"));
    }

    #[test]
    fn config_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.toml");
        std::fs::write(&path, "retention_days = 7\ncompress_logs = false\n").unwrap();

        let config = AuditConfig::from_file(&path).unwrap();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.retention_millis(), 7 * 86_400_000);
        assert!(!config.compress_logs);

        assert!(AuditConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }

    // ── AuditError ───────────────────────────────────────────────────────────

    #[test]
    fn catastrophic_errors_are_classified() {
        let full = AuditError::Io(std::io::Error::from(std::io::ErrorKind::StorageFull));
        assert!(full.is_catastrophic());

        let gone = AuditError::ServiceUnavailable { service: "storage".to_string() };
        assert!(gone.is_catastrophic());
        assert!(gone.to_string().contains("storage"));

        let transient = AuditError::Io(std::io::Error::from(std::io::ErrorKind::Interrupted));
        assert!(!transient.is_catastrophic());
    }
}
