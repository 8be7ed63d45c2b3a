use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuditEventEnvelope;

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // History lifecycle
    HistoryCreated {
        history_id: String,
        branch: String,
        category: String,
        parent_id: String,
        /// Stage code at creation
        complete_status: i32,
        created_by_id: String,
    },
    HistoryEdited {
        history_id: String,
        branch: String,
        /// Stage code after the edit
        complete_status: i32,
        /// Work was done by an outside vendor
        vendor: bool,
        updated_by_id: String,
    },
    /// Ticket was permanently deleted.
    HistoryDeleted {
        history_id: String,
        branch: String,
        deleted_by: String,
    },
    HistoryImageUploaded {
        history_id: String,
        branch: String,
        image: String,
        uploaded_by: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::HistoryCreated { .. } => "history_created",
            Self::HistoryEdited { .. } => "history_edited",
            Self::HistoryDeleted { .. } => "history_deleted",
            Self::HistoryImageUploaded { .. } => "history_image_uploaded",
        }
    }

    /// Extract history_id if this event concerns a ticket
    pub fn history_id(&self) -> Option<&str> {
        match self {
            Self::HistoryCreated { history_id, .. }
            | Self::HistoryEdited { history_id, .. }
            | Self::HistoryDeleted { history_id, .. }
            | Self::HistoryImageUploaded { history_id, .. } => Some(history_id),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    /// Extract user_id if this event was triggered by a user action
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::HistoryCreated { created_by_id, .. } => Some(created_by_id),
            Self::HistoryEdited { updated_by_id, .. } => Some(updated_by_id),
            Self::HistoryDeleted { deleted_by, .. } => Some(deleted_by),
            Self::HistoryImageUploaded { uploaded_by, .. } => Some(uploaded_by),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub history_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}

impl From<AuditEventEnvelope> for AuditRecord {
    /// The id stays 0 until the store assigns one.
    fn from(envelope: AuditEventEnvelope) -> Self {
        Self {
            id: 0,
            timestamp: envelope.timestamp,
            event_type: envelope.event.event_type().to_string(),
            history_id: envelope.event.history_id().map(String::from),
            user_id: envelope.event.user_id().map(String::from),
            data: envelope.event,
        }
    }
}
