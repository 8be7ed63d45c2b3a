//! Core history data types.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current shape of persisted history records.
pub const HISTORY_SCHEMA_VERSION: i32 = 2;

/// Status label that keeps a ticket out of period reports.
pub const MAINTENANCE_STATUS: &str = "MAINTENANCE";

// ============================================================================
// Lifecycle stage
// ============================================================================

/// Lifecycle stage of a history ticket.
///
/// Serialized as its integer code. Codes outside the enumeration are rejected
/// at deserialization time rather than mapped to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum CompleteStatus {
    /// Work is ongoing.
    Progress = 0,
    /// Waiting on an approval before work can be parked.
    RequestPending = 1,
    /// Parked; time spent here is not counted as working time.
    Pending = 2,
    /// Finished. No further edits.
    Complete = 3,
    /// Informational entry. No further edits.
    Info = 4,
    /// Finished on site, waiting for confirmation.
    RequestComplete = 5,
    /// Finished with a supporting document attached.
    CompleteWithAttachment = 6,
}

/// Error for integer codes that do not name a lifecycle stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid complete_status code: {0}")]
pub struct InvalidCompleteStatus(pub i32);

impl CompleteStatus {
    /// Every stage, in code order.
    pub const ALL: [CompleteStatus; 7] = [
        CompleteStatus::Progress,
        CompleteStatus::RequestPending,
        CompleteStatus::Pending,
        CompleteStatus::Complete,
        CompleteStatus::Info,
        CompleteStatus::RequestComplete,
        CompleteStatus::CompleteWithAttachment,
    ];

    /// Integer code used in storage and on the wire.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable label for reports.
    pub fn label(self) -> &'static str {
        match self {
            CompleteStatus::Progress => "Progress",
            CompleteStatus::RequestPending => "Request Pending",
            CompleteStatus::Pending => "Pending",
            CompleteStatus::Complete => "Complete",
            CompleteStatus::Info => "Info",
            CompleteStatus::RequestComplete => "Request Complete",
            CompleteStatus::CompleteWithAttachment => "Complete With Attachment",
        }
    }

    /// Terminal stages refuse further edits.
    pub fn is_terminal(self) -> bool {
        matches!(self, CompleteStatus::Complete | CompleteStatus::Info)
    }
}

impl TryFrom<i32> for CompleteStatus {
    type Error = InvalidCompleteStatus;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        CompleteStatus::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or(InvalidCompleteStatus(code))
    }
}

impl From<CompleteStatus> for i32 {
    fn from(status: CompleteStatus) -> Self {
        status.code()
    }
}

impl std::fmt::Display for CompleteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Records
// ============================================================================

/// One entry in a ticket's append-only update log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryUpdateEvent {
    pub time: DateTime<Utc>,
    /// Display name of the updater, e.g. "Ari Setiawan".
    pub updated_by: String,
    pub updated_by_id: String,
    pub problem: String,
    pub problem_resolve: String,
    pub complete_status: CompleteStatus,
    /// Work was done by an outside vendor.
    #[serde(default)]
    pub vendor: bool,
}

/// A tracked incident or maintenance ticket against an asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub version: i32,
    pub category: String,
    pub branch: String,
    pub parent_id: String,
    pub parent_name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub created_by_id: String,
    pub status: String,
    pub problem: String,
    pub problem_resolve: String,
    pub complete_status: CompleteStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tag: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Fence value for the next edit.
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_by_id: String,
    #[serde(default)]
    pub updates: Vec<HistoryUpdateEvent>,
}

impl HistoryRecord {
    /// The status text marks this ticket as scheduled maintenance.
    pub fn is_maintenance(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(MAINTENANCE_STATUS)
    }
}

/// One ticket joined with exactly one of its update events.
///
/// `history.updates` is left empty; the event lives in `update`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryRow {
    pub history: HistoryRecord,
    pub update: HistoryUpdateEvent,
}

/// Per-branch count of tickets in a given stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchCount {
    pub branch: String,
    pub count: i64,
}

/// Current time at the millisecond precision used by storage.
///
/// Timestamps handed back to callers must round-trip exactly so they can be
/// used as edit fences.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
