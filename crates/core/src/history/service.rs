//! Async facade over a [`HistoryStore`].
//!
//! Validates input before touching the store, runs each blocking store call
//! under a timeout, logs failures and emits audit events for mutations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::{
    normalize_code, CompleteStatus, CreateHistoryRequest, Deadline, FilterSpec, HistoryEdit,
    HistoryError, HistoryRecord, HistoryStore, UnwindOrder,
};
use crate::audit::{AuditEvent, AuditHandle};
use crate::report::{
    aggregate_first, aggregate_latest, summarize, HistoryReport, LatestOptions, StatusSummary,
};

/// Timeout applied to each store call unless configured otherwise.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a timed-out call may take to report whether it committed.
const SETTLE_GRACE: Duration = Duration::from_millis(50);

/// History operations as exposed to the API layer.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn HistoryStore>,
    audit: Option<AuditHandle>,
    timeout: Duration,
}

impl HistoryService {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            store,
            audit: None,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Emit audit events for successful mutations.
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a ticket.
    pub async fn create(
        &self,
        request: CreateHistoryRequest,
    ) -> Result<HistoryRecord, HistoryError> {
        require("branch", &request.branch)?;
        require("category", &request.category)?;
        require("parent_id", &request.parent_id)?;
        require("created_by_id", &request.created_by_id)?;

        let record = self.run("create", move |store| store.insert(request)).await?;

        info!(
            "Created history {} for {} in {}",
            record.id, record.parent_id, record.branch
        );
        self.emit(AuditEvent::HistoryCreated {
            history_id: record.id.clone(),
            branch: record.branch.clone(),
            category: record.category.clone(),
            parent_id: record.parent_id.clone(),
            complete_status: record.complete_status.code(),
            created_by_id: record.created_by_id.clone(),
        });

        Ok(record)
    }

    /// Apply an edit if the ticket still matches the caller's fence.
    pub async fn edit(
        &self,
        id: &str,
        edit: HistoryEdit,
        fence_branch: &str,
        fence_updated_at: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError> {
        require("id", id)?;
        require("branch", fence_branch)?;
        require("updated_by_id", &edit.updated_by_id)?;

        let id_owned = id.to_string();
        let branch = fence_branch.to_string();
        let vendor = edit.vendor;
        let record = self
            .run("edit", move |store| {
                store.edit_with_fence(&id_owned, edit, &branch, fence_updated_at)
            })
            .await?;

        debug!(
            "Edited history {} -> {}",
            record.id, record.complete_status
        );
        self.emit(AuditEvent::HistoryEdited {
            history_id: record.id.clone(),
            branch: record.branch.clone(),
            complete_status: record.complete_status.code(),
            vendor,
            updated_by_id: record.updated_by_id.clone(),
        });

        Ok(record)
    }

    /// Delete a ticket created within the last `window`.
    pub async fn delete(
        &self,
        id: &str,
        branch: &str,
        window: chrono::Duration,
        deleted_by: &str,
    ) -> Result<HistoryRecord, HistoryError> {
        require("id", id)?;
        require("branch", branch)?;

        let not_older_than = Utc::now().checked_sub_signed(window).ok_or_else(|| {
            HistoryError::Validation(format!("delete window of {} is out of range", window))
        })?;
        let id_owned = id.to_string();
        let branch = branch.to_string();
        let record = self
            .run("delete", move |store| {
                store.delete(&id_owned, &branch, not_older_than)
            })
            .await?;

        info!("Deleted history {} by {}", record.id, deleted_by);
        self.emit(AuditEvent::HistoryDeleted {
            history_id: record.id.clone(),
            branch: record.branch.clone(),
            deleted_by: deleted_by.to_string(),
        });

        Ok(record)
    }

    /// Get a ticket. An empty branch matches any branch.
    pub async fn get(&self, id: &str, branch: &str) -> Result<HistoryRecord, HistoryError> {
        require("id", id)?;
        let id = id.to_string();
        let branch = branch.to_string();
        self.run("get", move |store| store.get(&id, &branch)).await
    }

    pub async fn list(&self, filter: FilterSpec) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.run("list", move |store| store.find(&filter)).await
    }

    pub async fn list_for_parent(
        &self,
        parent_id: &str,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        require("parent_id", parent_id)?;
        let parent_id = parent_id.to_string();
        self.run("list_for_parent", move |store| {
            store.find_for_parent(&parent_id)
        })
        .await
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        filter: FilterSpec,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        require("user_id", user_id)?;
        let user_id = user_id.to_string();
        self.run("list_for_user", move |store| {
            store.find_for_user(&user_id, &filter)
        })
        .await
    }

    /// Set the image reference of a ticket.
    pub async fn upload_image(
        &self,
        id: &str,
        branch: &str,
        image: &str,
        uploaded_by: &str,
    ) -> Result<HistoryRecord, HistoryError> {
        require("id", id)?;
        require("branch", branch)?;
        require("image", image)?;

        let id_owned = id.to_string();
        let branch = branch.to_string();
        let image_owned = image.to_string();
        let record = self
            .run("upload_image", move |store| {
                store.upload_image(&id_owned, &branch, &image_owned)
            })
            .await?;

        self.emit(AuditEvent::HistoryImageUploaded {
            history_id: record.id.clone(),
            branch: record.branch.clone(),
            image: image.to_string(),
            uploaded_by: uploaded_by.to_string(),
        });

        Ok(record)
    }

    /// Per-branch counts of tickets in `status`.
    pub async fn summary(
        &self,
        branch: &str,
        status: CompleteStatus,
    ) -> Result<StatusSummary, HistoryError> {
        let branch = normalize_code(branch);
        self.run("summary", move |store| summarize(store, &branch, status))
            .await
    }

    /// Latest state of each ticket, ignoring events after `until`.
    pub async fn period_report(
        &self,
        filter: FilterSpec,
        until: Option<DateTime<Utc>>,
    ) -> Result<HistoryReport, HistoryError> {
        let options = LatestOptions {
            until,
            track_elapsed: false,
        };
        self.latest_report("period_report", filter, options).await
    }

    /// Like [`period_report`](Self::period_report), with working time per ticket.
    pub async fn monthly_report(
        &self,
        filter: FilterSpec,
        until: Option<DateTime<Utc>>,
    ) -> Result<HistoryReport, HistoryError> {
        let options = LatestOptions {
            until,
            track_elapsed: true,
        };
        self.latest_report("monthly_report", filter, options).await
    }

    /// Tickets with vendor work, bucketed by their latest vendor event.
    pub async fn vendor_report(&self, filter: FilterSpec) -> Result<HistoryReport, HistoryError> {
        self.run("vendor_report", move |store| {
            let rows = store.find_unwound(&filter, UnwindOrder::NewestFirst, true)?;
            Ok(aggregate_first(&rows))
        })
        .await
    }

    async fn latest_report(
        &self,
        op: &'static str,
        filter: FilterSpec,
        options: LatestOptions,
    ) -> Result<HistoryReport, HistoryError> {
        self.run(op, move |store| {
            let rows = store.find_unwound(&filter, UnwindOrder::OldestFirst, false)?;
            Ok(aggregate_latest(&rows, &options))
        })
        .await
    }

    /// Run a blocking store call on the blocking pool, bounded by the timeout.
    ///
    /// The call runs under a [`Deadline`] so the store abandons it (rolling
    /// back any statement in flight) once the caller has timed out.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, HistoryError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HistoryStore) -> Result<T, HistoryError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let deadline = Deadline::after(self.timeout);
        let mut task =
            tokio::task::spawn_blocking(move || deadline.scope(|| f(store.as_ref())));

        let result = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(HistoryError::Persistence(format!("{} task failed: {}", op, e))),
            // A statement finishing right at the deadline may still have
            // committed; report what the store actually did if it says so soon.
            Err(_) => match tokio::time::timeout(SETTLE_GRACE, &mut task).await {
                Ok(Ok(Ok(value))) => Ok(value),
                Ok(Ok(Err(e))) if !matches!(e, HistoryError::Persistence(_)) => Err(e),
                _ => Err(HistoryError::Persistence(format!(
                    "{} timed out after {}ms",
                    op,
                    self.timeout.as_millis()
                ))),
            },
        };

        if let Err(ref e) = result {
            match e {
                HistoryError::Persistence(_) => error!("History {} failed: {}", op, e),
                _ => debug!("History {} rejected: {}", op, e),
            }
        }

        result
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.try_emit(event);
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), HistoryError> {
    if value.trim().is_empty() {
        return Err(HistoryError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
