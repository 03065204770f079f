//! Storage statistics snapshot.

use serde::{Deserialize, Serialize};

/// Point-in-time figures describing the on-disk audit store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStatistics {
    pub total_events: usize,
    /// Sum of the sizes of every audit file, compressed or not.
    pub size_bytes: u64,
    pub indexed_fields: Vec<String>,
    pub file_count: usize,
    pub oldest_event: Option<i64>,
    pub newest_event: Option<i64>,
}
