//! Report views built from history tickets.

mod aggregate;
mod summary;

pub use aggregate::{
    aggregate_first, aggregate_latest, HistoryReport, HistoryView, LatestOptions,
    ReportBucketKind, NAME_CHAIN_SEPARATOR, NAME_LIST_SEPARATOR,
};
pub use summary::{summarize, StatusSummary};
