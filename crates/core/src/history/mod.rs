//! History tickets for tracked assets.
//!
//! A ticket records an incident or maintenance job against one asset and keeps
//! an append-only log of every update. Edits are guarded by an optimistic
//! fence on the last-known branch and `updated_at`.

mod deadline;
mod filter;
mod service;
mod sqlite_store;
mod store;
mod types;

pub use deadline::Deadline;
pub use filter::{normalize_code, FilterSpec, DEFAULT_LIMIT};
pub use service::{HistoryService, DEFAULT_STORE_TIMEOUT};
pub use sqlite_store::SqliteHistoryStore;
pub use store::{CreateHistoryRequest, HistoryEdit, HistoryError, HistoryStore, UnwindOrder};
pub use types::{
    now_millis, BranchCount, CompleteStatus, HistoryRecord, HistoryRow, HistoryUpdateEvent,
    InvalidCompleteStatus, HISTORY_SCHEMA_VERSION, MAINTENANCE_STATUS,
};
