//! History storage trait and request types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{
    BranchCount, CompleteStatus, FilterSpec, HistoryRecord, HistoryRow, InvalidCompleteStatus,
};

/// Error type for history operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// Store unreachable, timed out, or failed unexpectedly.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No record matches the id/branch/time constraints.
    #[error("History not found: {0}")]
    NotFound(String),

    /// Edit fence did not match the stored record.
    ///
    /// Covers a missing record, a branch mismatch, a stale `updated_at` and a
    /// record already in a terminal stage alike.
    #[error("History {id} was modified or closed; re-fetch and retry")]
    Fenced { id: String },

    /// Malformed input, rejected before touching the store.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<InvalidCompleteStatus> for HistoryError {
    fn from(e: InvalidCompleteStatus) -> Self {
        HistoryError::Validation(e.to_string())
    }
}

/// Request to create a new history ticket.
#[derive(Debug, Clone)]
pub struct CreateHistoryRequest {
    pub category: String,
    pub branch: String,
    pub parent_id: String,
    pub parent_name: String,
    pub status: String,
    pub problem: String,
    pub problem_resolve: String,
    pub complete_status: CompleteStatus,
    /// Start of the reported issue window. Defaults to creation time.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Absent tags are stored as an empty list.
    pub tag: Option<Vec<String>>,
    pub image: Option<String>,
    pub vendor: bool,
    /// Display name of the creator.
    pub created_by: String,
    pub created_by_id: String,
}

/// Field updates applied by a fenced edit.
#[derive(Debug, Clone)]
pub struct HistoryEdit {
    pub status: String,
    pub problem: String,
    pub problem_resolve: String,
    pub complete_status: CompleteStatus,
    /// `None` keeps the stored value.
    pub end_time: Option<DateTime<Utc>>,
    /// `None` keeps the stored tags.
    pub tag: Option<Vec<String>>,
    pub vendor: bool,
    pub updated_by: String,
    pub updated_by_id: String,
}

/// Event ordering within each ticket for the unwound view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindOrder {
    OldestFirst,
    NewestFirst,
}

/// Trait for history storage backends.
///
/// `edit_with_fence` must be a single atomic conditional update; a separate
/// read followed by a write would let two editors pass the same fence.
pub trait HistoryStore: Send + Sync {
    /// Create a new history ticket.
    fn insert(&self, request: CreateHistoryRequest) -> Result<HistoryRecord, HistoryError>;

    /// Apply `edit` only if the record matches id, `fence_branch` and
    /// `fence_updated_at` and is not in a terminal stage.
    fn edit_with_fence(
        &self,
        id: &str,
        edit: HistoryEdit,
        fence_branch: &str,
        fence_updated_at: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError>;

    /// Delete a ticket created at or after `not_older_than`.
    /// Returns the deleted record.
    fn delete(
        &self,
        id: &str,
        branch: &str,
        not_older_than: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError>;

    /// Get a ticket by ID. An empty branch matches any branch.
    fn get(&self, id: &str, branch: &str) -> Result<HistoryRecord, HistoryError>;

    /// List tickets matching the filter, most recently updated first.
    fn find(&self, filter: &FilterSpec) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// All tickets for an asset, newest id first.
    fn find_for_parent(&self, parent_id: &str) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Tickets created or updated by a user. Only the time range and limit
    /// of the filter apply.
    fn find_for_user(
        &self,
        user_id: &str,
        filter: &FilterSpec,
    ) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Count tickets in `status` grouped by branch, largest first, ties broken
    /// by branch descending. An empty branch counts all branches.
    fn count_by_status(
        &self,
        branch: &str,
        status: CompleteStatus,
    ) -> Result<Vec<BranchCount>, HistoryError>;

    /// Set the image reference of a ticket.
    fn upload_image(
        &self,
        id: &str,
        branch: &str,
        image: &str,
    ) -> Result<HistoryRecord, HistoryError>;

    /// One row per (ticket, update event) for report generation.
    ///
    /// Tickets match on branch, category and stage; the time range keeps
    /// tickets created at or before `end` and updated at or after `start`.
    /// Rows are grouped by ticket id and ordered within a ticket by `order`.
    /// The filter limit is not applied.
    fn find_unwound(
        &self,
        filter: &FilterSpec,
        order: UnwindOrder,
        vendor_only: bool,
    ) -> Result<Vec<HistoryRow>, HistoryError>;
}
