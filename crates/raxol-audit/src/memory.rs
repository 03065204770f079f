//! In-memory implementation of `EventStore`.
//!
//! `InMemoryEventStore` is the reference implementation of the `EventStore`
//! trait. It keeps every appended record in a per-stream `Vec` protected by a
//! `Mutex`, so clones can be handed to the logger while a test or the demo
//! inspects what was appended.
//!
//! Appends carrying a `batch_id` the store has already accepted are
//! acknowledged again without storing anything, which is what makes a
//! retried flush safe.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use raxol_contracts::{AuditError, AuditResult, StoredRecord};
use raxol_core::{AppendOptions, EventStore};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct InMemoryState {
    /// Appended records per stream, in append order.
    pub(crate) streams: BTreeMap<String, Vec<StoredRecord>>,

    /// Ids returned for each batch already accepted.
    pub(crate) batches: HashMap<String, Vec<String>>,

    /// The next store-assigned sequence number.
    pub(crate) sequence: u64,

    /// Remaining appends to reject. Lets tests exercise the retry path.
    pub(crate) failures_pending: usize,
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An append-only, in-process event store.
///
/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct InMemoryEventStore {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        let state = InMemoryState {
            streams: BTreeMap::new(),
            batches: HashMap::new(),
            sequence: 0,
            failures_pending: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> AuditResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| AuditError::EventStore {
            reason: format!("event store lock poisoned: {}", e),
        })
    }

    /// Reject the next `count` appends with `AuditError::EventStore`.
    pub fn fail_next(&self, count: usize) -> AuditResult<()> {
        self.lock()?.failures_pending = count;
        Ok(())
    }

    /// A copy of everything appended to `stream_name`.
    pub fn stream(&self, stream_name: &str) -> AuditResult<Vec<StoredRecord>> {
        Ok(self.lock()?.streams.get(stream_name).cloned().unwrap_or_default())
    }

    pub fn stream_names(&self) -> AuditResult<Vec<String>> {
        Ok(self.lock()?.streams.keys().cloned().collect())
    }

    /// Records across all streams.
    pub fn total_records(&self) -> AuditResult<usize> {
        Ok(self.lock()?.streams.values().map(Vec::len).sum())
    }
}

// ── EventStore impl ───────────────────────────────────────────────────────────

impl EventStore for InMemoryEventStore {
    /// Append `records` to `stream_name` and return one id per record.
    ///
    /// Ids have the form `<stream>:<sequence>`. A repeated `batch_id` returns
    /// the ids issued the first time.
    fn append_events(
        &self,
        records: &[StoredRecord],
        stream_name: &str,
        opts: &AppendOptions,
    ) -> AuditResult<Vec<String>> {
        let mut state = self.lock()?;

        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(AuditError::EventStore {
                reason: format!("append to '{}' rejected", stream_name),
            });
        }

        if let Some(ids) = opts.batch_id.as_ref().and_then(|b| state.batches.get(b)) {
            debug!(stream = %stream_name, batch_id = ?opts.batch_id, "duplicate batch acknowledged");
            return Ok(ids.clone());
        }

        let mut ids = Vec::with_capacity(records.len());
        for _ in records {
            ids.push(format!("{}:{}", stream_name, state.sequence));
            state.sequence += 1;
        }
        state
            .streams
            .entry(stream_name.to_string())
            .or_default()
            .extend_from_slice(records);
        if let Some(batch_id) = &opts.batch_id {
            state.batches.insert(batch_id.clone(), ids.clone());
        }

        info!(
            stream = %stream_name,
            appended = records.len(),
            sequence = state.sequence,
            "event store append"
        );
        Ok(ids)
    }
}
