//! Query filters and pagination options for the storage engine.
//!
//! All filters are optional and conjunctive: an event must satisfy every
//! populated filter to be returned. An all-`None` `QueryFilters` matches every
//! stored record.

use serde::{Deserialize, Serialize};

use crate::event::Severity;

/// Conjunctive event filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilters {
    pub user_id: Option<String>,
    /// Inclusive lower bound on `timestamp` (epoch ms).
    pub start_time: Option<i64>,
    /// Inclusive upper bound on `timestamp` (epoch ms).
    pub end_time: Option<i64>,
    pub severity: Option<Severity>,
    pub event_type: Option<String>,
    pub resource_type: Option<String>,
    /// Only honored together with `resource_type`.
    pub resource_id: Option<String>,
    pub session_id: Option<String>,
    /// Free-text search over description, command, error message and denial
    /// reason.
    pub text_search: Option<String>,
}

impl QueryFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn between(mut self, start_time: i64, end_time: i64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    pub fn since(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: Option<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = resource_id;
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text_search = Some(text.into());
        self
    }

    /// True when only the time range (or nothing) is constrained. Sealed
    /// records can only ever match such filters.
    pub fn is_time_only(&self) -> bool {
        self.user_id.is_none()
            && self.severity.is_none()
            && self.event_type.is_none()
            && self.resource_type.is_none()
            && self.session_id.is_none()
            && self.text_search.is_none()
    }
}

/// Field results are ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Timestamp,
    Severity,
    EventType,
    UserId,
    EventId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Ordering and pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub offset: usize,
    /// `None` returns every matching record.
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub const DEFAULT_LIMIT: usize = 100;

    /// No limit, default ordering. Used by exports and reports.
    pub fn unlimited() -> Self {
        Self {
            limit: None,
            ..Self::default()
        }
    }

    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort_by: SortField, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            sort_by: SortField::Timestamp,
            sort_order: SortOrder::Desc,
            offset: 0,
            limit: Some(Self::DEFAULT_LIMIT),
        }
    }
}

/// An inclusive `[start, end]` window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// The window ending now and reaching `millis` into the past.
    pub fn last(millis: i64) -> Self {
        let end = crate::event::now_millis();
        Self {
            start: end.saturating_sub(millis),
            end,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    pub fn to_filters(self) -> QueryFilters {
        QueryFilters::new().between(self.start, self.end)
    }
}
