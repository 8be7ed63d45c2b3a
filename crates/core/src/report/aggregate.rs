//! Turns the unwound (ticket, event) view into per-ticket report buckets.
//!
//! Both variants group rows by ticket id in first-appearance order, so the
//! row order handed in decides which event wins: `aggregate_latest` expects
//! each ticket's events oldest first, `aggregate_first` newest first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::{CompleteStatus, HistoryRecord, HistoryRow, HistoryUpdateEvent};

/// Separator between contributor first names in the latest-state view.
pub const NAME_CHAIN_SEPARATOR: &str = " > ";

/// Separator between contributor full names in the vendor view.
pub const NAME_LIST_SEPARATOR: &str = ", ";

/// Report bucket a lifecycle stage falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportBucketKind {
    Complete,
    Progress,
    Pending,
}

impl ReportBucketKind {
    pub fn for_status(status: CompleteStatus) -> Self {
        match status {
            CompleteStatus::Info
            | CompleteStatus::Complete
            | CompleteStatus::RequestComplete
            | CompleteStatus::CompleteWithAttachment => ReportBucketKind::Complete,
            CompleteStatus::Progress => ReportBucketKind::Progress,
            CompleteStatus::RequestPending | CompleteStatus::Pending => ReportBucketKind::Pending,
        }
    }
}

impl CompleteStatus {
    /// Report bucket for this stage.
    pub fn bucket(self) -> ReportBucketKind {
        ReportBucketKind::for_status(self)
    }
}

/// One ticket as shown in a report.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryView {
    /// Ticket fields; the update log is not included.
    pub history: HistoryRecord,
    /// The event that decided the bucket.
    pub update: HistoryUpdateEvent,
    /// Everyone who touched the ticket, in order of first contribution.
    pub contributors: String,
    /// Working time in seconds, excluding time parked in `Pending`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<i64>,
}

/// Tickets split into the three report buckets.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct HistoryReport {
    pub complete: Vec<HistoryView>,
    pub progress: Vec<HistoryView>,
    pub pending: Vec<HistoryView>,
}

impl HistoryReport {
    pub fn bucket(&self, kind: ReportBucketKind) -> &[HistoryView] {
        match kind {
            ReportBucketKind::Complete => &self.complete,
            ReportBucketKind::Progress => &self.progress,
            ReportBucketKind::Pending => &self.pending,
        }
    }

    /// Number of tickets across all buckets.
    pub fn len(&self) -> usize {
        self.complete.len() + self.progress.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn from_views(views: impl IntoIterator<Item = HistoryView>) -> Self {
        let mut report = HistoryReport::default();
        for view in views {
            match view.update.complete_status.bucket() {
                ReportBucketKind::Complete => report.complete.push(view),
                ReportBucketKind::Progress => report.progress.push(view),
                ReportBucketKind::Pending => report.pending.push(view),
            }
        }
        report
    }
}

/// Options for the latest-state aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatestOptions {
    /// Ignore events after this instant.
    pub until: Option<DateTime<Utc>>,
    /// Accumulate working time into `elapsed_secs`.
    pub track_elapsed: bool,
}

/// A view under construction; names are joined once the pass is done.
struct ViewBuilder {
    history: HistoryRecord,
    update: HistoryUpdateEvent,
    names: Vec<String>,
    elapsed_secs: Option<i64>,
}

impl ViewBuilder {
    fn new(row: &HistoryRow, name: &str, track_elapsed: bool) -> Self {
        let mut builder = Self {
            history: row.history.clone(),
            update: row.update.clone(),
            names: Vec::new(),
            elapsed_secs: track_elapsed.then_some(0),
        };
        builder.add_name(name);
        builder
    }

    /// Record `name` unless it is empty or already credited.
    fn add_name(&mut self, name: &str) {
        if !name.is_empty() && !self.names.iter().any(|existing| existing == name) {
            self.names.push(name.to_string());
        }
    }

    fn finish(self, separator: &str) -> HistoryView {
        HistoryView {
            history: self.history,
            update: self.update,
            contributors: self.names.join(separator),
            elapsed_secs: self.elapsed_secs,
        }
    }
}

/// Latest-state view: one entry per ticket, bucketed by its most recent stage.
///
/// Rows must be grouped by ticket with events oldest first. Events after
/// `options.until` are skipped, as are tickets whose status label marks them
/// as maintenance.
pub fn aggregate_latest(rows: &[HistoryRow], options: &LatestOptions) -> HistoryReport {
    let mut builders: Vec<ViewBuilder> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        if options.until.is_some_and(|until| row.update.time > until) {
            continue;
        }
        if row.history.is_maintenance() {
            continue;
        }

        let token = first_name(&row.update.updated_by);
        match index.get(row.history.id.as_str()) {
            None => {
                index.insert(&row.history.id, builders.len());
                builders.push(ViewBuilder::new(row, token, options.track_elapsed));
            }
            Some(&i) => {
                let builder = &mut builders[i];
                if let Some(elapsed) = builder.elapsed_secs.as_mut() {
                    // Time parked in Pending does not count.
                    if builder.update.complete_status != CompleteStatus::Pending {
                        *elapsed += (row.update.time - builder.update.time).num_seconds().max(0);
                    }
                }
                builder.add_name(token);
                builder.update = row.update.clone();
            }
        }
    }

    HistoryReport::from_views(
        builders
            .into_iter()
            .map(|builder| builder.finish(NAME_CHAIN_SEPARATOR)),
    )
}

/// Vendor view: one entry per ticket, bucketed by the first event seen.
///
/// Rows must be grouped by ticket with events newest first, so the first
/// event seen is the latest. Later rows only add contributor names.
pub fn aggregate_first(rows: &[HistoryRow]) -> HistoryReport {
    let mut builders: Vec<ViewBuilder> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        let name = row.update.updated_by.trim();
        match index.get(row.history.id.as_str()) {
            None => {
                index.insert(&row.history.id, builders.len());
                builders.push(ViewBuilder::new(row, name, false));
            }
            Some(&i) => builders[i].add_name(name),
        }
    }

    HistoryReport::from_views(
        builders
            .into_iter()
            .map(|builder| builder.finish(NAME_LIST_SEPARATOR)),
    )
}

fn first_name(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or("")
}
