//! Per-call deadline handed from [`HistoryService`](super::HistoryService)
//! to the store running on the blocking pool.
//!
//! The service scopes every store call with a [`Deadline`]. A store that can
//! abort work reads it back with [`Deadline::current`] and must not start (or
//! finish) a write once it has expired, so a call the caller already gave up
//! on never lands.

use std::time::{Duration, Instant};

tokio::task_local! {
    static CALL_DEADLINE: Deadline;
}

/// Instant after which a store call must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// `None` when the timeout is too large to represent.
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Run `f` with `self` as the deadline of the current store call.
    pub fn scope<R>(self, f: impl FnOnce() -> R) -> R {
        CALL_DEADLINE.sync_scope(self, f)
    }

    /// Deadline of the store call running on this thread, if any.
    pub fn current() -> Option<Self> {
        CALL_DEADLINE.try_with(|deadline| *deadline).ok()
    }
}
