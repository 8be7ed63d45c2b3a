//! Report endpoints: latest state per ticket, bucketed by stage.

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use assetlog_core::HistoryReport;

use super::error::ApiError;
use super::histories::HistoryQuery;
use crate::state::AppState;

/// Latest event per ticket, with the chain of people who worked on it
pub async fn period_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryReport>, ApiError> {
    let filter = params.to_filter()?;
    let report = state.history().period_report(filter, params.until).await?;
    Ok(Json(report))
}

/// Like the period report, with working seconds per ticket
pub async fn monthly_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryReport>, ApiError> {
    let filter = params.to_filter()?;
    let report = state.history().monthly_report(filter, params.until).await?;
    Ok(Json(report))
}

/// Tickets with vendor work, keyed on their newest vendor event
pub async fn vendor_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryReport>, ApiError> {
    let filter = params.to_filter()?;
    let report = state.history().vendor_report(filter).await?;
    Ok(Json(report))
}
