pub mod audit;
pub mod auth;
pub mod config;
pub mod history;
pub mod report;
pub mod testing;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditRecord, AuditStore, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, JwtAuthenticator,
    NoneAuthenticator, ADMIN_ROLE,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use history::{
    normalize_code, BranchCount, CompleteStatus, CreateHistoryRequest, FilterSpec, HistoryEdit,
    HistoryError, HistoryRecord, HistoryRow, HistoryService, HistoryStore, HistoryUpdateEvent,
    SqliteHistoryStore, UnwindOrder,
};
pub use report::{
    aggregate_first, aggregate_latest, HistoryReport, HistoryView, LatestOptions,
    ReportBucketKind, StatusSummary,
};
