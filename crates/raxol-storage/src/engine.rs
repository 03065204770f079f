//! The storage engine: durable writes, index maintenance and queries.
//!
//! `StorageEngine` is single-threaded by construction. All of its mutating
//! methods take `&mut self` and are driven by exactly one worker thread (see
//! `service.rs`), so the log files, the indexes and the set of known ids are
//! never touched concurrently.
//!
//! Write ordering: a batch is appended to disk first and only the groups that
//! reached disk are committed to the indexes. A failed write therefore never
//! leaves an index entry for an event that is not durable.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use raxol_contracts::event::{date_key, now_millis};
use raxol_contracts::{
    AuditConfig, AuditResult, QueryFilters, QueryOptions, SortField, SortOrder,
    StorageStatistics, StoredRecord,
};

use crate::index::{FieldIndex, IndexedField};
use crate::search::{substring_match, SearchIndex};
use crate::segment::{compress_file, SegmentDir};

/// Snapshot format version written to `indexes.dat`.
const SNAPSHOT_VERSION: u32 = 1;

/// Storage-relevant slice of `AuditConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub compress_logs: bool,
    pub max_file_size: u64,
}

impl From<&AuditConfig> for StorageSettings {
    fn from(config: &AuditConfig) -> Self {
        Self {
            root: config.storage_path.clone(),
            compress_logs: config.compress_logs,
            max_file_size: config.max_file_size,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    index: FieldIndex,
    search: SearchIndex,
    known_ids: Vec<String>,
}

/// Owner of the on-disk audit files and their in-memory indexes.
pub struct StorageEngine {
    settings: StorageSettings,
    dir: SegmentDir,
    index: FieldIndex,
    search: SearchIndex,
    known_ids: HashSet<String>,
    compressions: Vec<JoinHandle<()>>,
}

impl StorageEngine {
    /// Open the store at `settings.root`.
    ///
    /// Indexes come from `indexes.dat` when a valid snapshot is present;
    /// otherwise they are rebuilt by scanning every log file. A snapshot is
    /// consumed on load and rewritten only on graceful shutdown, so a crash
    /// can never leave a stale one behind.
    pub fn open(settings: StorageSettings) -> AuditResult<Self> {
        let dir = SegmentDir::open(&settings.root)?;
        let mut engine = Self {
            settings,
            dir,
            index: FieldIndex::new(),
            search: SearchIndex::new(),
            known_ids: HashSet::new(),
            compressions: Vec::new(),
        };

        if !engine.load_snapshot() {
            engine.rebuild_indexes()?;
        }

        info!(
            root = %engine.dir.root().display(),
            known_events = engine.known_ids.len(),
            "audit storage opened"
        );
        Ok(engine)
    }

    pub fn root(&self) -> &Path {
        self.dir.root()
    }

    pub fn index(&self) -> &FieldIndex {
        &self.index
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Persist `records`, grouped into the dated file of each record's
    /// timestamp, then index them.
    ///
    /// Records whose `event_id` is already stored are skipped, which makes
    /// retried flushes idempotent. Records that cannot be serialized are
    /// skipped with a warning. Returns the number of records written.
    ///
    /// If any group fails to write, the groups that did reach disk are still
    /// indexed and the first error is returned.
    pub fn store_batch(&mut self, records: Vec<StoredRecord>) -> AuditResult<usize> {
        let mut seen_in_batch = HashSet::new();
        let mut groups: BTreeMap<String, Vec<(StoredRecord, String)>> = BTreeMap::new();

        for record in records {
            let id = record.event_id().to_string();
            if self.known_ids.contains(&id) || !seen_in_batch.insert(id.clone()) {
                debug!(event_id = %id, "skipping already stored event");
                continue;
            }
            match serde_json::to_string(&record) {
                Ok(line) => groups
                    .entry(date_key(record.timestamp()))
                    .or_default()
                    .push((record, line)),
                Err(e) => warn!(event_id = %id, error = %e, "dropping unencodable audit record"),
            }
        }

        let mut written = 0;
        let mut first_error = None;

        for (date, group) in groups {
            if self.dir.current_size(&date) >= self.settings.max_file_size {
                if let Err(e) = self.rotate_date(&date) {
                    warn!(date = %date, error = %e, "size-based rotation failed, appending anyway");
                }
            }

            let lines: Vec<String> = group.iter().map(|(_, line)| line.clone()).collect();
            match self.dir.append(&date, &lines) {
                Ok(()) => {
                    for (record, _) in &group {
                        self.commit_to_indexes(record);
                    }
                    written += group.len();
                }
                Err(e) => {
                    warn!(date = %date, count = group.len(), error = %e, "audit append failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    fn commit_to_indexes(&mut self, record: &StoredRecord) {
        self.known_ids.insert(record.event_id().to_string());
        if let Some(event) = record.as_event() {
            self.index.insert(event);
            self.search.insert(event);
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Every stored record, in file enumeration order then line order.
    ///
    /// A record that appears in two files (possible for an instant while a
    /// rotated file is being compressed) is returned once.
    pub fn load_all(&self) -> AuditResult<Vec<StoredRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for path in self.dir.list_files()? {
            for record in self.dir.read_file(&path)? {
                if seen.insert(record.event_id().to_string()) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Answer a filtered, sorted, paginated query.
    pub fn query(&self, filters: &QueryFilters, options: &QueryOptions) -> AuditResult<Vec<StoredRecord>> {
        let candidates = self.indexed_candidates(filters);
        let text = filters
            .text_search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let text_hits = text.and_then(|t| self.search.candidates(t));

        let mut matched: Vec<StoredRecord> = self
            .load_all()?
            .into_iter()
            .filter(|record| {
                if let Some(ids) = &candidates {
                    if !ids.contains(record.event_id()) {
                        return false;
                    }
                }
                record_matches(record, filters, text, text_hits.as_ref())
            })
            .collect();

        match options.sort_order {
            SortOrder::Asc => matched.sort_by(|a, b| compare_records(a, b, options.sort_by)),
            SortOrder::Desc => matched.sort_by(|a, b| compare_records(b, a, options.sort_by)),
        }

        let page = matched.into_iter().skip(options.offset);
        Ok(match options.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }

    /// Narrow the candidate set through every filtered field whose index is
    /// populated. `None` means no index applied and every record is a
    /// candidate.
    fn indexed_candidates(&self, filters: &QueryFilters) -> Option<BTreeSet<String>> {
        let wanted = [
            (IndexedField::UserId, filters.user_id.clone()),
            (IndexedField::SessionId, filters.session_id.clone()),
            (
                IndexedField::ResourceId,
                filters.resource_type.as_ref().and(filters.resource_id.clone()),
            ),
            (IndexedField::Severity, filters.severity.map(|s| s.as_str().to_string())),
            (IndexedField::EventType, filters.event_type.clone()),
        ];

        let mut acc: Option<BTreeSet<String>> = None;
        for (field, value) in wanted {
            let Some(value) = value else { continue };
            if !self.index.is_populated(field) {
                continue;
            }
            let ids = self.index.lookup(field, &value);
            acc = Some(match acc {
                None => ids,
                Some(prev) => prev.intersection(&ids).cloned().collect(),
            });
        }
        acc
    }

    // ── Retention ─────────────────────────────────────────────────────────────

    /// Remove every record with `timestamp < cutoff`, rewriting each affected
    /// file, then rebuild all indexes from what remains.
    ///
    /// This is a full scan and rewrite: cost grows linearly with the store.
    pub fn delete_before(&mut self, cutoff: i64) -> AuditResult<usize> {
        self.wait_for_compressions();

        let mut deleted = 0;
        for path in self.dir.list_files()? {
            let records = self.dir.read_file(&path)?;
            let before = records.len();
            let kept: Vec<StoredRecord> = records
                .into_iter()
                .filter(|r| r.timestamp() >= cutoff)
                .collect();
            if kept.len() == before {
                continue;
            }
            deleted += before - kept.len();
            self.dir.rewrite(&path, &kept)?;
            debug!(path = %path.display(), removed = before - kept.len(), "retention rewrite");
        }

        if deleted > 0 {
            self.rebuild_indexes()?;
        }
        info!(cutoff, deleted, "retention sweep complete");
        Ok(deleted)
    }

    // ── Rotation ──────────────────────────────────────────────────────────────

    /// Rotate today's current file, if it exists.
    pub fn rotate(&mut self) -> AuditResult<Option<PathBuf>> {
        self.rotate_date(&date_key(now_millis()))
    }

    fn rotate_date(&mut self, date: &str) -> AuditResult<Option<PathBuf>> {
        self.reap_compressions();
        let Some(rotated) = self.dir.rotate(date, Utc::now())? else {
            return Ok(None);
        };
        info!(path = %rotated.display(), "rotated audit file");

        if self.settings.compress_logs {
            let path = rotated.clone();
            let handle = std::thread::Builder::new()
                .name("audit-compress".to_string())
                .spawn(move || match compress_file(&path) {
                    Ok(gz) => debug!(path = %gz.display(), "compressed rotated audit file"),
                    Err(e) => warn!(path = %path.display(), error = %e, "audit file compression failed"),
                })?;
            self.compressions.push(handle);
        }
        Ok(Some(rotated))
    }

    fn reap_compressions(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.compressions.drain(..).partition(|h| h.is_finished());
        for handle in finished {
            let _ = handle.join();
        }
        self.compressions = running;
    }

    /// Block until every background compression has completed.
    pub fn wait_for_compressions(&mut self) {
        for handle in self.compressions.drain(..) {
            if handle.join().is_err() {
                warn!("audit compression thread panicked");
            }
        }
    }

    // ── Indexes ───────────────────────────────────────────────────────────────

    /// Discard and rebuild every index from the files on disk.
    pub fn rebuild_indexes(&mut self) -> AuditResult<()> {
        self.index.clear();
        self.search.clear();
        self.known_ids.clear();
        for record in self.load_all()? {
            self.commit_to_indexes(&record);
        }
        debug!(events = self.known_ids.len(), "audit indexes rebuilt");
        Ok(())
    }

    /// Load and consume `indexes.dat`. Returns false when there is none or it
    /// cannot be used.
    fn load_snapshot(&mut self) -> bool {
        let path = self.dir.snapshot_path();
        let Ok(bytes) = std::fs::read(&path) else {
            return false;
        };
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(error = %e, "could not consume index snapshot, rebuilding instead");
            return false;
        }
        match serde_json::from_slice::<IndexSnapshot>(&bytes) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => {
                self.index = snapshot.index;
                self.search = snapshot.search;
                self.known_ids = snapshot.known_ids.into_iter().collect();
                debug!(events = self.known_ids.len(), "loaded index snapshot");
                true
            }
            Ok(snapshot) => {
                warn!(version = snapshot.version, "ignoring index snapshot with unknown version");
                false
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable index snapshot");
                false
            }
        }
    }

    /// Write `indexes.dat` for a fast next start.
    pub fn save_snapshot(&self) -> AuditResult<()> {
        let mut known_ids: Vec<String> = self.known_ids.iter().cloned().collect();
        known_ids.sort();
        let snapshot = IndexSnapshot {
            version: SNAPSHOT_VERSION,
            index: self.index.clone(),
            search: self.search.clone(),
            known_ids,
        };
        std::fs::write(self.dir.snapshot_path(), serde_json::to_vec(&snapshot)?)?;
        Ok(())
    }

    // ── Statistics & lifecycle ────────────────────────────────────────────────

    pub fn statistics(&self) -> AuditResult<StorageStatistics> {
        let records = self.load_all()?;
        let timestamps = records.iter().map(StoredRecord::timestamp);
        Ok(StorageStatistics {
            total_events: records.len(),
            size_bytes: self.dir.total_size()?,
            indexed_fields: IndexedField::ALL.iter().map(|f| f.as_str().to_string()).collect(),
            file_count: self.dir.list_files()?.len(),
            oldest_event: timestamps.clone().min(),
            newest_event: timestamps.max(),
        })
    }

    /// Finish background work and persist the index snapshot.
    pub fn close(&mut self) -> AuditResult<()> {
        self.wait_for_compressions();
        self.save_snapshot()?;
        info!(root = %self.dir.root().display(), "audit storage closed");
        Ok(())
    }
}

// ── Matching & ordering ───────────────────────────────────────────────────────

fn record_matches(
    record: &StoredRecord,
    filters: &QueryFilters,
    text: Option<&str>,
    text_hits: Option<&BTreeSet<String>>,
) -> bool {
    let ts = record.timestamp();
    if filters.start_time.is_some_and(|start| ts < start) {
        return false;
    }
    if filters.end_time.is_some_and(|end| ts > end) {
        return false;
    }

    let Some(event) = record.as_event() else {
        return filters.is_time_only();
    };
    let body = &event.body;

    let eq = |filter: &Option<String>, value: &Option<String>| match filter {
        Some(wanted) => value.as_deref() == Some(wanted.as_str()),
        None => true,
    };

    if !eq(&filters.user_id, &body.user_id) || !eq(&filters.session_id, &body.session_id) {
        return false;
    }
    if filters.severity.is_some_and(|s| s != event.severity) {
        return false;
    }
    if filters
        .event_type
        .as_deref()
        .is_some_and(|t| t != body.event_type)
    {
        return false;
    }
    if filters.resource_type.is_some()
        && (!eq(&filters.resource_type, &body.resource_type) || !eq(&filters.resource_id, &body.resource_id))
    {
        return false;
    }

    match (text, text_hits) {
        (None, _) => true,
        (Some(_), Some(hits)) => hits.contains(&event.event_id),
        (Some(query), None) => substring_match(event, query),
    }
}

/// Compare on `field`, breaking ties by `event_id` so ordering is total.
fn compare_records(a: &StoredRecord, b: &StoredRecord, field: SortField) -> Ordering {
    let primary = match field {
        SortField::Timestamp => a.timestamp().cmp(&b.timestamp()),
        SortField::Severity => a
            .as_event()
            .map(|e| e.severity)
            .cmp(&b.as_event().map(|e| e.severity)),
        SortField::EventType => a
            .as_event()
            .map(|e| e.event_type())
            .cmp(&b.as_event().map(|e| e.event_type())),
        SortField::UserId => a
            .as_event()
            .and_then(|e| e.body.user_id.as_deref())
            .cmp(&b.as_event().and_then(|e| e.body.user_id.as_deref())),
        SortField::EventId => Ordering::Equal,
    };
    primary.then_with(|| a.event_id().cmp(b.event_id()))
}
