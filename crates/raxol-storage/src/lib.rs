//! # raxol-storage
//!
//! Durable, append-only storage for audit records.
//!
//! ## Overview
//!
//! Records are written as newline-delimited JSON into one file per UTC day
//! (`audit_<YYYY-MM-DD>.log`). Five secondary indexes (`user_id`,
//! `session_id`, `resource_id`, `severity`, `event_type`) and an inverted
//! full-text index are kept in memory and rebuilt from disk whenever needed.
//!
//! `StorageEngine` holds the logic; `StorageService` runs it on a dedicated
//! worker thread and hands out cloneable `StorageHandle`s.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use raxol_storage::StorageService;
//!
//! let service = StorageService::start(&config)?;
//! let storage = service.handle();
//! storage.store_batch(records)?;
//! let page = storage.query(QueryFilters::new().user("alice"), QueryOptions::default())?;
//! service.shutdown()?;
//! ```

pub mod engine;
pub mod index;
pub mod search;
pub mod segment;
pub mod service;

pub use engine::{StorageEngine, StorageSettings};
pub use index::{FieldIndex, IndexedField};
pub use search::SearchIndex;
pub use service::{StorageHandle, StorageService, StorageTimeouts};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::Path;

    use raxol_contracts::event::now_millis;
    use raxol_contracts::{
        AuditConfig, AuditError, AuditEvent, Category, EventBody, QueryFilters, QueryOptions,
        SealedEvent, Severity, SortField, SortOrder, StoredRecord,
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// 2023-11-14T22:13:20Z
    const BASE: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn settings(root: &Path) -> StorageSettings {
        StorageSettings {
            root: root.to_path_buf(),
            compress_logs: false,
            max_file_size: 100 * 1024 * 1024,
        }
    }

    fn record(id: &str, ts: i64, user: &str, severity: Severity, description: &str) -> StoredRecord {
        StoredRecord::Plain(AuditEvent::with_id(
            id,
            ts,
            Category::Security,
            severity,
            EventBody::new("probe")
                .user(user)
                .session(format!("sess-{}", user))
                .description(description),
        ))
    }

    fn ids(records: &[StoredRecord]) -> Vec<String> {
        records.iter().map(|r| r.event_id().to_string()).collect()
    }

    fn seeded(root: &Path) -> StorageEngine {
        let mut engine = StorageEngine::open(settings(root)).unwrap();
        engine
            .store_batch(vec![
                record("e1", BASE, "alice", Severity::Info, "login from console"),
                record("e2", BASE + HOUR, "bob", Severity::High, "unauthorized sudo attempt"),
                record("e3", BASE + 2 * HOUR, "alice", Severity::Medium, "password changed"),
                record("e4", BASE + 3 * HOUR, "carol", Severity::Critical, "root shell spawned via sudo"),
                record("e5", BASE + 4 * HOUR, "alice", Severity::Low, "viewed audit report"),
            ])
            .unwrap();
        engine
    }

    // ── Writes & basic queries ────────────────────────────────────────────────

    /// Stored events come back newest-first by default.
    #[test]
    fn test_store_then_query_all() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());

        let all = engine.query(&QueryFilters::new(), &QueryOptions::default()).unwrap();
        assert_eq!(ids(&all), vec!["e5", "e4", "e3", "e2", "e1"]);
        assert!(dir.path().join("audit_2023-11-14.log").exists());
        assert!(dir.path().join("audit_2023-11-15.log").exists());
    }

    /// Each record lands in the file for the UTC date of its timestamp.
    #[test]
    fn test_records_are_partitioned_by_utc_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(settings(dir.path())).unwrap();
        // BASE is 22:13 UTC, so +2h crosses midnight.
        engine
            .store_batch(vec![
                record("d1", BASE, "alice", Severity::Info, "first day"),
                record("d2", BASE + 2 * HOUR, "alice", Severity::Info, "second day"),
            ])
            .unwrap();

        let day1 = std::fs::read_to_string(dir.path().join("audit_2023-11-14.log")).unwrap();
        let day2 = std::fs::read_to_string(dir.path().join("audit_2023-11-15.log")).unwrap();
        assert!(day1.contains("\"d1\"") && !day1.contains("\"d2\""));
        assert!(day2.contains("\"d2\""));
        assert_eq!(day1.lines().count(), 1);
    }

    /// Storing the same event twice keeps one copy.
    #[test]
    fn test_store_batch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = seeded(dir.path());

        let written = engine
            .store_batch(vec![
                record("e1", BASE, "alice", Severity::Info, "login from console"),
                record("e6", BASE + 5 * HOUR, "dave", Severity::Info, "new"),
                record("e6", BASE + 5 * HOUR, "dave", Severity::Info, "new"),
            ])
            .unwrap();
        assert_eq!(written, 1);

        let all = engine.query(&QueryFilters::new(), &QueryOptions::unlimited()).unwrap();
        assert_eq!(all.len(), 6);
    }

    // ── Filters ───────────────────────────────────────────────────────────────

    #[test]
    fn test_user_filter_uses_index() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        assert!(engine.index().is_populated(IndexedField::UserId));
        assert_eq!(engine.index().lookup(IndexedField::UserId, "alice").len(), 3);

        let opts = QueryOptions::default().sorted(SortField::Timestamp, SortOrder::Asc);
        let alice = engine.query(&QueryFilters::new().user("alice"), &opts).unwrap();
        assert_eq!(ids(&alice), vec!["e1", "e3", "e5"]);

        let nobody = engine.query(&QueryFilters::new().user("zed"), &opts).unwrap();
        assert!(nobody.is_empty());
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        let opts = QueryOptions::default().sorted(SortField::Timestamp, SortOrder::Asc);

        let window = engine
            .query(&QueryFilters::new().between(BASE + HOUR, BASE + 3 * HOUR), &opts)
            .unwrap();
        assert_eq!(ids(&window), vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_conjunctive_filters() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());

        let hits = engine
            .query(
                &QueryFilters::new().user("alice").severity(Severity::Medium),
                &QueryOptions::default(),
            )
            .unwrap();
        assert_eq!(ids(&hits), vec!["e3"]);

        let hits = engine
            .query(
                &QueryFilters::new().session("sess-carol").event_type("probe"),
                &QueryOptions::default(),
            )
            .unwrap();
        assert_eq!(ids(&hits), vec!["e4"]);

        let none = engine
            .query(
                &QueryFilters::new().user("alice").severity(Severity::Critical),
                &QueryOptions::default(),
            )
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_resource_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(settings(dir.path())).unwrap();
        let file_event = |id: &str, rid: &str| {
            StoredRecord::Plain(AuditEvent::with_id(
                id,
                BASE,
                Category::DataAccess,
                Severity::Info,
                EventBody::new("read").resource("file", rid),
            ))
        };
        engine
            .store_batch(vec![file_event("r1", "/etc/passwd"), file_event("r2", "/etc/hosts")])
            .unwrap();

        let by_type = engine
            .query(&QueryFilters::new().resource("file", None), &QueryOptions::default())
            .unwrap();
        assert_eq!(by_type.len(), 2);

        let by_id = engine
            .query(
                &QueryFilters::new().resource("file", Some("/etc/hosts".to_string())),
                &QueryOptions::default(),
            )
            .unwrap();
        assert_eq!(ids(&by_id), vec!["r2"]);
    }

    // ── Full-text search ──────────────────────────────────────────────────────

    #[test]
    fn test_text_search_hits_indexed_term() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        let opts = QueryOptions::default().sorted(SortField::Timestamp, SortOrder::Asc);

        let sudo = engine.query(&QueryFilters::new().text("sudo"), &opts).unwrap();
        assert_eq!(ids(&sudo), vec!["e2", "e4"]);

        let both = engine.query(&QueryFilters::new().text("Unauthorized SUDO"), &opts).unwrap();
        assert_eq!(ids(&both), vec!["e2"]);
    }

    #[test]
    fn test_text_search_absent_substring_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        let none = engine
            .query(&QueryFilters::new().text("zz"), &QueryOptions::default())
            .unwrap();
        assert!(none.is_empty());
    }

    /// Fragments that are not whole words are found through the substring
    /// fallback.
    #[test]
    fn test_text_search_falls_back_to_substring() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        assert!(engine.search_index().candidates("assw").is_none());

        let hits = engine
            .query(&QueryFilters::new().text("assw"), &QueryOptions::default())
            .unwrap();
        assert_eq!(ids(&hits), vec!["e3"]);
    }

    #[test]
    fn test_tokenizer_discards_short_terms() {
        let terms = search::tokenize("An rm of /etc by root-user");
        assert_eq!(terms, vec!["etc", "root", "user"]);
    }

    // ── Ordering & pagination ─────────────────────────────────────────────────

    #[test]
    fn test_pagination_is_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(settings(dir.path())).unwrap();
        // Several events share a timestamp so the id tie-break matters.
        let batch: Vec<StoredRecord> = (0..25)
            .map(|i| record(&format!("p{:02}", i), BASE + (i / 3) as i64, "u", Severity::Info, "x"))
            .collect();
        engine.store_batch(batch).unwrap();

        for (sort_by, order) in [
            (SortField::Timestamp, SortOrder::Desc),
            (SortField::Timestamp, SortOrder::Asc),
            (SortField::Severity, SortOrder::Desc),
        ] {
            let page = |offset, limit| {
                engine
                    .query(
                        &QueryFilters::new(),
                        &QueryOptions::page(offset, limit).sorted(sort_by, order),
                    )
                    .unwrap()
            };
            let mut joined = page(0, 7);
            joined.extend(page(7, 7));
            assert_eq!(ids(&joined), ids(&page(0, 14)));
        }
    }

    #[test]
    fn test_sort_by_severity() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        let desc = engine
            .query(
                &QueryFilters::new(),
                &QueryOptions::default().sorted(SortField::Severity, SortOrder::Desc),
            )
            .unwrap();
        assert_eq!(ids(&desc), vec!["e4", "e2", "e3", "e5", "e1"]);
    }

    #[test]
    fn test_offset_beyond_end_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        let page = engine
            .query(&QueryFilters::new(), &QueryOptions::page(50, 10))
            .unwrap();
        assert!(page.is_empty());
    }

    // ── Retention ─────────────────────────────────────────────────────────────

    #[test]
    fn test_delete_before_removes_exactly_older_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = seeded(dir.path());
        let before = engine
            .query(&QueryFilters::new().since(BASE + 2 * HOUR), &QueryOptions::unlimited())
            .unwrap();

        let deleted = engine.delete_before(BASE + 2 * HOUR).unwrap();
        assert_eq!(deleted, 2);

        let expired = engine
            .query(&QueryFilters::new().between(0, BASE + 2 * HOUR - 1), &QueryOptions::unlimited())
            .unwrap();
        assert!(expired.is_empty());

        let after = engine.query(&QueryFilters::new(), &QueryOptions::unlimited()).unwrap();
        assert_eq!(after, before, "surviving events must be unmodified");

        // Indexes were rebuilt: bob's only event is gone.
        assert!(engine.index().lookup(IndexedField::UserId, "bob").is_empty());
        assert!(engine.search_index().candidates("unauthorized").is_none());
    }

    #[test]
    fn test_delete_before_removes_emptied_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = seeded(dir.path());
        engine.delete_before(BASE + 100 * HOUR).unwrap();
        assert_eq!(engine.statistics().unwrap().file_count, 0);
    }

    // ── Rotation ──────────────────────────────────────────────────────────────

    #[test]
    fn test_rotation_renames_and_keeps_records_queryable() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(settings(dir.path())).unwrap();
        let now = now_millis();
        engine
            .store_batch(vec![record("n1", now, "alice", Severity::Info, "before rotation")])
            .unwrap();

        let rotated = engine.rotate().unwrap().expect("current file existed");
        let name = rotated.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("audit_") && name.contains(".log."));

        engine
            .store_batch(vec![record("n2", now, "alice", Severity::Info, "after rotation")])
            .unwrap();
        let all = engine.query(&QueryFilters::new(), &QueryOptions::unlimited()).unwrap();
        assert_eq!(all.len(), 2);

        // Nothing to rotate twice in a row once the current file is gone.
        engine.rotate().unwrap();
        assert!(engine.rotate().unwrap().is_none());
    }

    #[test]
    fn test_rotation_compresses_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(StorageSettings {
            compress_logs: true,
            ..settings(dir.path())
        })
        .unwrap();
        let now = now_millis();
        engine
            .store_batch(vec![record("z1", now, "alice", Severity::Info, "compress me")])
            .unwrap();
        let rotated = engine.rotate().unwrap().unwrap();
        engine.wait_for_compressions();

        assert!(!rotated.exists());
        let files = segment::SegmentDir::open(dir.path()).unwrap().list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(segment::is_compressed(&files[0]));

        let all = engine.query(&QueryFilters::new().text("compress"), &QueryOptions::default()).unwrap();
        assert_eq!(ids(&all), vec!["z1"]);

        // Retention rewrites compressed files in place.
        assert_eq!(engine.delete_before(now + 1).unwrap(), 1);
        assert!(engine.query(&QueryFilters::new(), &QueryOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_query_right_after_rotation_sees_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(StorageSettings {
            compress_logs: true,
            ..settings(dir.path())
        })
        .unwrap();
        let now = now_millis();
        let mut expected = 0;
        for round in 0..100 {
            let batch = (0..20)
                .map(|i| record(&format!("r{round}-{i}"), now, "alice", Severity::Info, "rotating"))
                .collect();
            engine.store_batch(batch).unwrap();
            expected += 20;
            engine.rotate().unwrap();

            let all = engine.query(&QueryFilters::new(), &QueryOptions::default()).unwrap();
            assert_eq!(all.len(), expected, "round {round}");
            engine.statistics().unwrap();
        }
        engine.wait_for_compressions();
    }

    #[test]
    fn test_read_file_falls_back_to_compressed_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(settings(dir.path())).unwrap();
        let now = now_millis();
        engine
            .store_batch(vec![record("g1", now, "alice", Severity::Info, "archived")])
            .unwrap();
        let rotated = engine.rotate().unwrap().unwrap();
        segment::compress_file(&rotated).unwrap();
        assert!(!rotated.exists());

        let segments = segment::SegmentDir::open(dir.path()).unwrap();
        let records = segments.read_file(&rotated).unwrap();
        assert_eq!(ids(&records), vec!["g1"]);

        let gone = dir.path().join("audit_1999-01-01.log.19990101T000000Z");
        assert!(segments.read_file(&gone).unwrap().is_empty());
    }

    #[test]
    fn test_size_based_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = StorageEngine::open(StorageSettings {
            max_file_size: 10,
            ..settings(dir.path())
        })
        .unwrap();
        engine.store_batch(vec![record("s1", BASE, "a", Severity::Info, "one")]).unwrap();
        engine.store_batch(vec![record("s2", BASE, "a", Severity::Info, "two")]).unwrap();

        let files = segment::SegmentDir::open(dir.path()).unwrap().list_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(engine.query(&QueryFilters::new(), &QueryOptions::default()).unwrap().len(), 2);
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Reopening without a snapshot rebuilds every index from disk.
    #[test]
    fn test_reopen_rebuilds_indexes() {
        let dir = tempfile::tempdir().unwrap();
        drop(seeded(dir.path()));

        let engine = StorageEngine::open(settings(dir.path())).unwrap();
        assert_eq!(engine.index().lookup(IndexedField::UserId, "alice").len(), 3);
        assert!(engine.search_index().candidates("sudo").is_some());
    }

    /// A snapshot written on close is loaded and consumed on the next open.
    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = seeded(dir.path());
        engine.close().unwrap();
        let snapshot = dir.path().join(segment::SNAPSHOT_FILE);
        assert!(snapshot.exists());

        let reopened = StorageEngine::open(settings(dir.path())).unwrap();
        assert!(!snapshot.exists(), "snapshot is consumed on load");
        assert_eq!(reopened.index(), engine.index());
        assert_eq!(reopened.search_index(), engine.search_index());
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        drop(seeded(dir.path()));
        std::fs::write(dir.path().join(segment::SNAPSHOT_FILE), b"{not json").unwrap();

        let engine = StorageEngine::open(settings(dir.path())).unwrap();
        assert_eq!(engine.index().lookup(IndexedField::UserId, "bob").len(), 1);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        drop(seeded(dir.path()));
        let path = dir.path().join("audit_2023-11-14.log");
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("this is not json\n");
        std::fs::write(&path, contents).unwrap();

        let engine = StorageEngine::open(settings(dir.path())).unwrap();
        let all = engine.query(&QueryFilters::new(), &QueryOptions::unlimited()).unwrap();
        assert_eq!(all.len(), 5);
    }

    // ── Sealed records ────────────────────────────────────────────────────────

    #[test]
    fn test_sealed_records_match_time_filters_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = seeded(dir.path());
        engine
            .store_batch(vec![StoredRecord::Sealed(SealedEvent {
                event_id: "sealed-1".to_string(),
                timestamp: BASE + 30 * 60_000,
                encrypted: true,
                algorithm: "aes-256-gcm".to_string(),
                iv: "AAAAAAAAAAAAAAAA".to_string(),
                data: "AAAA".to_string(),
            })])
            .unwrap();

        let window = engine
            .query(&QueryFilters::new().between(BASE, BASE + HOUR), &QueryOptions::unlimited())
            .unwrap();
        assert!(ids(&window).contains(&"sealed-1".to_string()));

        let by_user = engine
            .query(&QueryFilters::new().user("alice"), &QueryOptions::unlimited())
            .unwrap();
        assert!(!ids(&by_user).contains(&"sealed-1".to_string()));
    }

    // ── Statistics ────────────────────────────────────────────────────────────

    #[test]
    fn test_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded(dir.path());
        let stats = engine.statistics().unwrap();

        assert_eq!(stats.total_events, 5);
        assert_eq!(stats.file_count, 2);
        assert!(stats.size_bytes > 0);
        assert_eq!(stats.oldest_event, Some(BASE));
        assert_eq!(stats.newest_event, Some(BASE + 4 * HOUR));
        assert_eq!(
            stats.indexed_fields,
            vec!["user_id", "session_id", "resource_id", "severity", "event_type"]
        );
    }

    // ── Service ───────────────────────────────────────────────────────────────

    #[test]
    fn test_service_round_trip_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig::with_storage_path(dir.path());
        let service = StorageService::start(&config).unwrap();
        let storage = service.handle();

        let written = storage
            .store_batch(vec![
                record("h1", BASE, "alice", Severity::Info, "via handle"),
                record("h2", BASE + 1, "bob", Severity::High, "via handle"),
            ])
            .unwrap();
        assert_eq!(written, 2);

        let hits = storage
            .query(QueryFilters::new().user("bob"), QueryOptions::default())
            .unwrap();
        assert_eq!(ids(&hits), vec!["h2"]);
        assert_eq!(storage.statistics().unwrap().total_events, 2);
        assert_eq!(storage.delete_before(BASE + 1).unwrap(), 1);

        service.shutdown().unwrap();
        assert!(dir.path().join(segment::SNAPSHOT_FILE).exists());

        match storage.statistics() {
            Err(AuditError::ServiceUnavailable { service }) => assert_eq!(service, "storage"),
            other => panic!("expected ServiceUnavailable, got {:?}", other.map(|s| s.total_events)),
        }
    }

    #[test]
    fn test_service_handles_are_shared_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let service = StorageService::start(&AuditConfig::with_storage_path(dir.path())).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|t| {
                let storage = service.handle();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let id = format!("t{}-{}", t, i);
                        storage
                            .store_batch(vec![record(&id, BASE + i, "u", Severity::Info, "threaded")])
                            .unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let stats = service.handle().statistics().unwrap();
        assert_eq!(stats.total_events, 40);
    }
}
