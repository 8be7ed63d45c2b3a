use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::DateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, ToSql};

use super::{AuditError, AuditFilter, AuditRecord, AuditStore};

/// How long a write waits while the histories table holds the file lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed audit store. Timestamps are epoch milliseconds, as in the
/// histories table, which may live in the same file.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::from_connection(Connection::open(path).map_err(db_err)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::from_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                history_id TEXT,
                user_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_events_history_id ON audit_events(history_id);
            CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
            CREATE INDEX IF NOT EXISTS idx_audit_events_user_id ON audit_events(user_id);
            "#,
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<AuditRecord> {
        let timestamp_ms: i64 = row.get(1)?;
        let timestamp = DateTime::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(1, timestamp_ms)
        })?;
        let data_json: String = row.get(5)?;
        let data = serde_json::from_str(&data_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

        Ok(AuditRecord {
            id: row.get(0)?,
            timestamp,
            event_type: row.get(2)?,
            history_id: row.get(3)?,
            user_id: row.get(4)?,
            data,
        })
    }
}

/// `WHERE` conditions for an [`AuditFilter`] with their bound values.
#[derive(Default)]
struct FilterClause {
    conditions: Vec<&'static str>,
    params: Vec<Box<dyn ToSql>>,
}

impl FilterClause {
    fn for_filter(filter: &AuditFilter) -> Self {
        let mut clause = Self::default();
        if let Some(ref history_id) = filter.history_id {
            clause.push("history_id = ?", history_id.clone());
        }
        if let Some(ref event_type) = filter.event_type {
            clause.push("event_type = ?", event_type.clone());
        }
        if let Some(ref user_id) = filter.user_id {
            clause.push("user_id = ?", user_id.clone());
        }
        if let Some(from) = filter.from {
            clause.push("timestamp >= ?", from.timestamp_millis());
        }
        if let Some(to) = filter.to {
            clause.push("timestamp <= ?", to.timestamp_millis());
        }
        clause
    }

    fn push(&mut self, condition: &'static str, param: impl ToSql + 'static) {
        self.conditions.push(condition);
        self.params.push(Box::new(param));
    }

    fn render(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    fn param_refs(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, history_id, user_id, data) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.timestamp.timestamp_millis(),
                record.event_type,
                record.history_id,
                record.user_id,
                data_json,
            ],
        )
        .map_err(db_err)?;

        Ok(conn.last_insert_rowid())
    }

    /// Newest first; ties keep insertion order reversed.
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let mut clause = FilterClause::for_filter(filter);
        let sql = format!(
            "SELECT id, timestamp, event_type, history_id, user_id, data FROM audit_events {} \
             ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            clause.render()
        );
        clause.params.push(Box::new(filter.limit));
        clause.params.push(Box::new(filter.offset));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(clause.param_refs().as_slice(), Self::row_to_record)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let clause = FilterClause::for_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", clause.render());

        let conn = self.conn()?;
        conn.query_row(&sql, clause.param_refs().as_slice(), |row| row.get(0))
            .map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> AuditError {
    AuditError::Database(e.to_string())
}
