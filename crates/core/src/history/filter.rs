//! Query composition for history lookups.

use chrono::{DateTime, Utc};

use super::CompleteStatus;

/// Limit applied when the caller leaves it unset or non-positive.
pub const DEFAULT_LIMIT: i64 = 100;

/// Normalize a branch or category code to its stored form.
pub fn normalize_code(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Filter for querying history records.
///
/// Absent fields impose no constraint. Built per request and discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// Branch code, upper-cased.
    pub branch: Option<String>,
    /// Category tag, upper-cased.
    pub category: Option<String>,
    /// Acceptable lifecycle stages. Empty means any.
    pub statuses: Vec<CompleteStatus>,
    /// Lower bound on creation time (inclusive).
    pub start: Option<DateTime<Utc>>,
    /// Upper bound on creation time (inclusive).
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: i64,
}

impl FilterSpec {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    /// Filter by branch. Empty input clears the constraint.
    pub fn with_branch(mut self, branch: impl AsRef<str>) -> Self {
        self.branch = non_empty_code(branch.as_ref());
        self
    }

    /// Filter by category. Empty input clears the constraint.
    pub fn with_category(mut self, category: impl AsRef<str>) -> Self {
        self.category = non_empty_code(category.as_ref());
        self
    }

    /// Restrict to the given lifecycle stages.
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = CompleteStatus>) -> Self {
        let mut statuses: Vec<_> = statuses.into_iter().collect();
        statuses.sort();
        statuses.dedup();
        self.statuses = statuses;
        self
    }

    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Set limit. Zero or negative falls back to the default.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Limit actually applied to queries.
    pub fn effective_limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        }
    }
}

fn non_empty_code(value: &str) -> Option<String> {
    let code = normalize_code(value);
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}
