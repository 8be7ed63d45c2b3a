//! History ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use assetlog_core::{
    CompleteStatus, CreateHistoryRequest, FilterSpec, HistoryEdit, HistoryRecord, Identity,
    StatusSummary,
};

use super::error::{ApiError, ApiJson};
use super::middleware::AuthUser;
use crate::metrics::record_mutation;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters shared by history listings and reports.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub branch: Option<String>,
    pub category: Option<String>,
    /// Comma-separated stage codes, e.g. `0,2`
    pub complete_status: Option<String>,
    /// Creation time lower bound (RFC 3339)
    pub start: Option<DateTime<Utc>>,
    /// Creation time upper bound (RFC 3339)
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of results; reports ignore it
    pub limit: Option<i64>,
    /// Report cutoff: events after this time are ignored
    pub until: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    /// Build the store filter these parameters describe.
    pub fn to_filter(&self) -> Result<FilterSpec, ApiError> {
        let mut filter = FilterSpec::new()
            .with_branch(self.branch.as_deref().unwrap_or_default())
            .with_category(self.category.as_deref().unwrap_or_default())
            .with_time_range(self.start, self.end);

        if let Some(ref codes) = self.complete_status {
            filter = filter.with_statuses(parse_statuses(codes)?);
        }
        if let Some(limit) = self.limit {
            filter = filter.with_limit(limit);
        }

        Ok(filter)
    }
}

/// Request body for creating a ticket
#[derive(Debug, Deserialize)]
pub struct CreateHistoryBody {
    pub category: String,
    pub branch: String,
    pub parent_id: String,
    #[serde(default)]
    pub parent_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub problem_resolve: String,
    #[serde(default)]
    pub complete_status: Option<CompleteStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub tag: Option<Vec<String>>,
    pub image: Option<String>,
    #[serde(default)]
    pub vendor: bool,
    /// Honoured only when authentication is disabled
    pub created_by: Option<String>,
    /// Honoured only when authentication is disabled
    pub created_by_id: Option<String>,
}

/// Request body for editing a ticket.
///
/// `branch` and `updated_at` form the fence: the edit applies only if the
/// stored ticket still has exactly these values.
#[derive(Debug, Deserialize)]
pub struct EditHistoryBody {
    pub branch: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub problem_resolve: String,
    pub complete_status: CompleteStatus,
    pub end_time: Option<DateTime<Utc>>,
    pub tag: Option<Vec<String>>,
    #[serde(default)]
    pub vendor: bool,
    /// Honoured only when authentication is disabled
    pub updated_by: Option<String>,
    /// Honoured only when authentication is disabled
    pub updated_by_id: Option<String>,
}

/// Request body for attaching an image reference
#[derive(Debug, Deserialize)]
pub struct UploadImageBody {
    pub branch: String,
    pub image: String,
}

/// Query parameters naming a branch
#[derive(Debug, Default, Deserialize)]
pub struct BranchParams {
    pub branch: Option<String>,
}

/// Query parameters for the stage summary
#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub branch: Option<String>,
    pub complete_status: Option<i32>,
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListHistoriesResponse {
    pub histories: Vec<HistoryRecord>,
    pub count: usize,
}

impl From<Vec<HistoryRecord>> for ListHistoriesResponse {
    fn from(histories: Vec<HistoryRecord>) -> Self {
        Self {
            count: histories.len(),
            histories,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new ticket
pub async fn create_history(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    ApiJson(body): ApiJson<CreateHistoryBody>,
) -> Result<(StatusCode, Json<HistoryRecord>), ApiError> {
    let (created_by, created_by_id) = actor(&identity, body.created_by, body.created_by_id);
    let request = CreateHistoryRequest {
        category: body.category,
        branch: body.branch,
        parent_id: body.parent_id,
        parent_name: body.parent_name,
        status: body.status,
        problem: body.problem,
        problem_resolve: body.problem_resolve,
        complete_status: body.complete_status.unwrap_or(CompleteStatus::Progress),
        start_time: body.start_time,
        end_time: body.end_time,
        tag: body.tag,
        image: body.image,
        vendor: body.vendor,
        created_by,
        created_by_id,
    };

    let result = state.history().create(request).await;
    record_mutation("create", result.is_ok());
    Ok((StatusCode::CREATED, Json(result?)))
}

/// List tickets matching the query
pub async fn list_histories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ListHistoriesResponse>, ApiError> {
    let filter = params.to_filter()?;
    let histories = state.history().list(filter).await?;
    Ok(Json(histories.into()))
}

/// Get a ticket by ID, optionally restricted to a branch
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BranchParams>,
) -> Result<Json<HistoryRecord>, ApiError> {
    let branch = params.branch.unwrap_or_default();
    let record = state.history().get(&id, &branch).await?;
    Ok(Json(record))
}

/// Apply an edit guarded by the branch/updated_at fence
pub async fn edit_history(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<EditHistoryBody>,
) -> Result<Json<HistoryRecord>, ApiError> {
    let (updated_by, updated_by_id) = actor(&identity, body.updated_by, body.updated_by_id);
    let edit = HistoryEdit {
        status: body.status,
        problem: body.problem,
        problem_resolve: body.problem_resolve,
        complete_status: body.complete_status,
        end_time: body.end_time,
        tag: body.tag,
        vendor: body.vendor,
        updated_by,
        updated_by_id,
    };

    let result = state
        .history()
        .edit(&id, edit, &body.branch, body.updated_at)
        .await;
    record_mutation("edit", result.is_ok());
    Ok(Json(result?))
}

/// Delete a recently created ticket
pub async fn delete_history(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<BranchParams>,
) -> Result<Json<HistoryRecord>, ApiError> {
    if !identity.can_delete_history() {
        record_mutation("delete", false);
        return Err(ApiError::forbidden("Deleting history requires the admin role"));
    }

    let branch = params.branch.unwrap_or_default();
    let result = state
        .history()
        .delete(&id, &branch, state.delete_window(), &identity.user_id)
        .await;
    record_mutation("delete", result.is_ok());
    Ok(Json(result?))
}

/// Attach an image reference to a ticket
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UploadImageBody>,
) -> Result<Json<HistoryRecord>, ApiError> {
    let result = state
        .history()
        .upload_image(&id, &body.branch, &body.image, &identity.user_id)
        .await;
    record_mutation("image", result.is_ok());
    Ok(Json(result?))
}

/// All tickets for one asset, newest first
pub async fn list_for_parent(
    State(state): State<Arc<AppState>>,
    Path(parent_id): Path<String>,
) -> Result<Json<ListHistoriesResponse>, ApiError> {
    let histories = state.history().list_for_parent(&parent_id).await?;
    Ok(Json(histories.into()))
}

/// Tickets a user opened or touched
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ListHistoriesResponse>, ApiError> {
    let filter = params.to_filter()?;
    let histories = state.history().list_for_user(&user_id, filter).await?;
    Ok(Json(histories.into()))
}

/// Per-branch counts of tickets in one stage
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<StatusSummary>, ApiError> {
    let code = params
        .complete_status
        .ok_or_else(|| ApiError::bad_request("complete_status is required"))?;
    let status =
        CompleteStatus::try_from(code).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let branch = params.branch.unwrap_or_default();
    let summary = state.history().summary(&branch, status).await?;
    Ok(Json(summary))
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a comma-separated list of stage codes.
fn parse_statuses(codes: &str) -> Result<Vec<CompleteStatus>, ApiError> {
    codes
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            let value: i32 = code
                .parse()
                .map_err(|_| ApiError::bad_request(format!("invalid complete_status: {}", code)))?;
            CompleteStatus::try_from(value).map_err(|e| ApiError::bad_request(e.to_string()))
        })
        .collect()
}

/// Who is acting: the authenticated identity, or the caller's claim when
/// authentication is disabled.
fn actor(identity: &Identity, name: Option<String>, id: Option<String>) -> (String, String) {
    if identity.method == "none" {
        (
            name.unwrap_or_else(|| identity.name.clone()),
            id.unwrap_or_else(|| identity.user_id.clone()),
        )
    } else {
        (identity.name.clone(), identity.user_id.clone())
    }
}
