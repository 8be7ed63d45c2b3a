//! Testing utilities: fixtures and store doubles.
//!
//! # Example
//!
//! ```rust,ignore
//! use assetlog_core::testing::{fixtures, FailingHistoryStore};
//!
//! let store = SqliteHistoryStore::in_memory()?;
//! let record = store.insert(fixtures::create_request("BJM", "CCTV", "CAM-01"))?;
//!
//! // Error paths
//! let service = HistoryService::new(Arc::new(FailingHistoryStore));
//! ```

mod mock_history_store;

pub use mock_history_store::{FailingHistoryStore, SlowHistoryStore};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::history::{
        CompleteStatus, CreateHistoryRequest, HistoryEdit, HistoryRecord, HistoryRow,
        HistoryUpdateEvent, HISTORY_SCHEMA_VERSION,
    };

    /// Fixed reference time for records built without a store.
    pub fn reference_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Create a request for a new in-progress CCTV-style ticket.
    pub fn create_request(branch: &str, category: &str, parent_id: &str) -> CreateHistoryRequest {
        CreateHistoryRequest {
            category: category.to_string(),
            branch: branch.to_string(),
            parent_id: parent_id.to_string(),
            parent_name: format!("{} unit", parent_id),
            status: "down".to_string(),
            problem: "no video signal".to_string(),
            problem_resolve: String::new(),
            complete_status: CompleteStatus::Progress,
            start_time: None,
            end_time: None,
            tag: Some(vec!["onsite".to_string()]),
            image: None,
            vendor: false,
            created_by: "Ari Setiawan".to_string(),
            created_by_id: "u-ari".to_string(),
        }
    }

    /// Create an edit moving a ticket to `status`.
    pub fn edit(status: CompleteStatus) -> HistoryEdit {
        HistoryEdit {
            status: "down".to_string(),
            problem: "no video signal".to_string(),
            problem_resolve: format!("moved to {}", status.label()),
            complete_status: status,
            end_time: None,
            tag: None,
            vendor: false,
            updated_by: "Budi Santoso".to_string(),
            updated_by_id: "u-budi".to_string(),
        }
    }

    /// Create a ticket record with one seed event at the reference time.
    pub fn history_record(id: &str, branch: &str) -> HistoryRecord {
        let at = reference_time();
        HistoryRecord {
            id: id.to_string(),
            version: HISTORY_SCHEMA_VERSION,
            category: "CCTV".to_string(),
            branch: branch.to_string(),
            parent_id: "CAM-01".to_string(),
            parent_name: "Lobby camera".to_string(),
            created_at: at,
            created_by: "Ari Setiawan".to_string(),
            created_by_id: "u-ari".to_string(),
            status: "down".to_string(),
            problem: "no video signal".to_string(),
            problem_resolve: String::new(),
            complete_status: CompleteStatus::Progress,
            start_time: at,
            end_time: None,
            tag: Vec::new(),
            image: None,
            updated_at: at,
            updated_by: "Ari Setiawan".to_string(),
            updated_by_id: "u-ari".to_string(),
            updates: vec![update_event("Ari Setiawan", CompleteStatus::Progress, at)],
        }
    }

    /// Create an update event.
    pub fn update_event(
        updated_by: &str,
        status: CompleteStatus,
        time: DateTime<Utc>,
    ) -> HistoryUpdateEvent {
        HistoryUpdateEvent {
            time,
            updated_by: updated_by.to_string(),
            updated_by_id: format!("u-{}", updated_by.to_lowercase().replace(' ', "-")),
            problem: "no video signal".to_string(),
            problem_resolve: String::new(),
            complete_status: status,
            vendor: false,
        }
    }

    /// Create one unwound row: ticket `id` joined with a single event.
    pub fn row(id: &str, updated_by: &str, status: CompleteStatus, time: DateTime<Utc>) -> HistoryRow {
        let mut history = history_record(id, "BJM");
        history.updates.clear();
        HistoryRow {
            history,
            update: update_event(updated_by, status, time),
        }
    }
}
