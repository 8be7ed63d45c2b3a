//! Per-branch ticket counts for one lifecycle stage.

use serde::Serialize;

use crate::history::{BranchCount, CompleteStatus, HistoryError, HistoryStore};

/// Dashboard summary of tickets in one stage.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusSummary {
    pub status: CompleteStatus,
    pub label: &'static str,
    /// Sum over all branches listed.
    pub total: i64,
    /// Largest count first, ties by branch descending.
    pub branches: Vec<BranchCount>,
}

impl StatusSummary {
    pub fn from_counts(status: CompleteStatus, branches: Vec<BranchCount>) -> Self {
        Self {
            status,
            label: status.label(),
            total: branches.iter().map(|b| b.count).sum(),
            branches,
        }
    }
}

/// Count tickets in `status`, for one branch or (empty branch) all of them.
pub fn summarize(
    store: &dyn HistoryStore,
    branch: &str,
    status: CompleteStatus,
) -> Result<StatusSummary, HistoryError> {
    let branches = store.count_by_status(branch, status)?;
    Ok(StatusSummary::from_counts(status, branches))
}
