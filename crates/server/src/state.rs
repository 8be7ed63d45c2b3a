use std::sync::Arc;

use assetlog_core::{AuditStore, Authenticator, Config, HistoryService, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    history: HistoryService,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        history: HistoryService,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            authenticator,
            history,
            audit_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    /// Deletion window from `[history] delete_window_hours`.
    pub fn delete_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.config.history.delete_window_hours))
    }
}
