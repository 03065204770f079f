//! Inverted full-text index over the free-text event fields.
//!
//! Terms are lowercased runs of word characters (`[A-Za-z0-9_]` and other
//! Unicode alphanumerics). Terms of two characters or fewer are discarded.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use raxol_contracts::AuditEvent;

/// Shortest term length that is indexed.
pub const MIN_TERM_LEN: usize = 3;

/// Split `text` into index terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// `term → event ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndex {
    terms: BTreeMap<String, BTreeSet<String>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: &AuditEvent) {
        for term in tokenize(&event.free_text()) {
            self.terms.entry(term).or_default().insert(event.event_id.clone());
        }
    }

    /// Ids of events containing every term of `query`.
    ///
    /// Returns `None` when the query has no indexable terms or when the
    /// intersection is empty. Callers then fall back to a substring scan,
    /// since the index only knows whole words.
    pub fn candidates(&self, query: &str) -> Option<BTreeSet<String>> {
        let terms = tokenize(query);
        let mut iter = terms.iter();
        let first = iter.next()?;
        let mut acc = self.terms.get(first)?.clone();
        for term in iter {
            let Some(ids) = self.terms.get(term) else {
                return None;
            };
            acc.retain(|id| ids.contains(id));
            if acc.is_empty() {
                return None;
            }
        }
        if acc.is_empty() {
            None
        } else {
            Some(acc)
        }
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }
}

/// Case-insensitive substring match over the event's free text.
pub fn substring_match(event: &AuditEvent, query: &str) -> bool {
    event.free_text().to_lowercase().contains(&query.to_lowercase())
}
