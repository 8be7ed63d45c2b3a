//! History store doubles for exercising error and timeout paths.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::history::{
    BranchCount, CompleteStatus, CreateHistoryRequest, FilterSpec, HistoryEdit, HistoryError,
    HistoryRecord, HistoryRow, HistoryStore, UnwindOrder,
};

/// Store whose every call fails with a persistence error, as an unreachable
/// database would.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingHistoryStore;

impl FailingHistoryStore {
    fn unavailable<T>() -> Result<T, HistoryError> {
        Err(HistoryError::Persistence("store unavailable".to_string()))
    }
}

impl HistoryStore for FailingHistoryStore {
    fn insert(&self, _request: CreateHistoryRequest) -> Result<HistoryRecord, HistoryError> {
        Self::unavailable()
    }

    fn edit_with_fence(
        &self,
        _id: &str,
        _edit: HistoryEdit,
        _fence_branch: &str,
        _fence_updated_at: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError> {
        Self::unavailable()
    }

    fn delete(
        &self,
        _id: &str,
        _branch: &str,
        _not_older_than: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError> {
        Self::unavailable()
    }

    fn get(&self, _id: &str, _branch: &str) -> Result<HistoryRecord, HistoryError> {
        Self::unavailable()
    }

    fn find(&self, _filter: &FilterSpec) -> Result<Vec<HistoryRecord>, HistoryError> {
        Self::unavailable()
    }

    fn find_for_parent(&self, _parent_id: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        Self::unavailable()
    }

    fn find_for_user(
        &self,
        _user_id: &str,
        _filter: &FilterSpec,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        Self::unavailable()
    }

    fn count_by_status(
        &self,
        _branch: &str,
        _status: CompleteStatus,
    ) -> Result<Vec<BranchCount>, HistoryError> {
        Self::unavailable()
    }

    fn upload_image(
        &self,
        _id: &str,
        _branch: &str,
        _image: &str,
    ) -> Result<HistoryRecord, HistoryError> {
        Self::unavailable()
    }

    fn find_unwound(
        &self,
        _filter: &FilterSpec,
        _order: UnwindOrder,
        _vendor_only: bool,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        Self::unavailable()
    }
}

/// Store that sleeps before delegating each call to `inner`.
pub struct SlowHistoryStore {
    inner: Arc<dyn HistoryStore>,
    delay: Duration,
}

impl SlowHistoryStore {
    pub fn new(inner: Arc<dyn HistoryStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    fn pause(&self) -> &dyn HistoryStore {
        std::thread::sleep(self.delay);
        self.inner.as_ref()
    }
}

impl HistoryStore for SlowHistoryStore {
    fn insert(&self, request: CreateHistoryRequest) -> Result<HistoryRecord, HistoryError> {
        self.pause().insert(request)
    }

    fn edit_with_fence(
        &self,
        id: &str,
        edit: HistoryEdit,
        fence_branch: &str,
        fence_updated_at: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError> {
        self.pause()
            .edit_with_fence(id, edit, fence_branch, fence_updated_at)
    }

    fn delete(
        &self,
        id: &str,
        branch: &str,
        not_older_than: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError> {
        self.pause().delete(id, branch, not_older_than)
    }

    fn get(&self, id: &str, branch: &str) -> Result<HistoryRecord, HistoryError> {
        self.pause().get(id, branch)
    }

    fn find(&self, filter: &FilterSpec) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.pause().find(filter)
    }

    fn find_for_parent(&self, parent_id: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.pause().find_for_parent(parent_id)
    }

    fn find_for_user(
        &self,
        user_id: &str,
        filter: &FilterSpec,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.pause().find_for_user(user_id, filter)
    }

    fn count_by_status(
        &self,
        branch: &str,
        status: CompleteStatus,
    ) -> Result<Vec<BranchCount>, HistoryError> {
        self.pause().count_by_status(branch, status)
    }

    fn upload_image(
        &self,
        id: &str,
        branch: &str,
        image: &str,
    ) -> Result<HistoryRecord, HistoryError> {
        self.pause().upload_image(id, branch, image)
    }

    fn find_unwound(
        &self,
        filter: &FilterSpec,
        order: UnwindOrder,
        vendor_only: bool,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        self.pause().find_unwound(filter, order, vendor_only)
    }
}
