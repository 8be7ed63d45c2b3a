//! SQLite-backed history store implementation.
//!
//! Each ticket is one row. Tags and the update log are kept as JSON columns,
//! so an edit (field changes plus the appended log entry) is one statement.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::deadline::Deadline;
use super::filter::normalize_code;
use super::types::{now_millis, InvalidCompleteStatus, HISTORY_SCHEMA_VERSION};
use super::{
    BranchCount, CompleteStatus, CreateHistoryRequest, FilterSpec, HistoryEdit, HistoryError,
    HistoryRecord, HistoryRow, HistoryStore, HistoryUpdateEvent, UnwindOrder,
};

/// Column order expected by `row_to_record`.
const HISTORY_COLUMNS: [&str; 21] = [
    "id",
    "version",
    "category",
    "branch",
    "parent_id",
    "parent_name",
    "created_at",
    "created_by",
    "created_by_id",
    "status",
    "problem",
    "problem_resolve",
    "complete_status",
    "start_time",
    "end_time",
    "tag",
    "image",
    "updated_at",
    "updated_by",
    "updated_by_id",
    "updates",
];

const TAG_COLUMN: usize = 15;
const UPDATES_COLUMN: usize = 20;

/// Default time a statement waits on a locked database file.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a caller with a deadline retries a contended connection.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// VM instructions between deadline checks while a statement runs.
const DEADLINE_CHECK_OPS: i32 = 1000;

/// SQLite-backed history store.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Create a new SQLite history store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite history store (useful for testing).
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Override how long a statement waits on a locked database.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self, HistoryError> {
        self.conn()?.busy_timeout(timeout).map_err(db_err)?;
        Ok(self)
    }

    fn from_connection(conn: Connection) -> Result<Self, HistoryError> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS histories (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                category TEXT NOT NULL,
                branch TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                parent_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                created_by TEXT NOT NULL,
                created_by_id TEXT NOT NULL,
                status TEXT NOT NULL,
                problem TEXT NOT NULL,
                problem_resolve TEXT NOT NULL,
                complete_status INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                tag TEXT NOT NULL DEFAULT '[]',
                image TEXT,
                updated_at INTEGER NOT NULL,
                updated_by TEXT NOT NULL,
                updated_by_id TEXT NOT NULL,
                updates TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_histories_branch ON histories(branch);
            CREATE INDEX IF NOT EXISTS idx_histories_parent_id ON histories(parent_id);
            CREATE INDEX IF NOT EXISTS idx_histories_updated_at ON histories(updated_at);
            CREATE INDEX IF NOT EXISTS idx_histories_complete_status ON histories(complete_status);
            "#,
        )
        .map_err(db_err)
    }

    /// Lock the connection for one store call.
    ///
    /// Under a [`Deadline`] the wait for the lock is bounded, and statements
    /// run on the returned connection are interrupted (and rolled back) once
    /// the deadline passes.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        let Some(deadline) = Deadline::current() else {
            let conn = self.conn.lock().map_err(|_| lock_poisoned())?;
            conn.progress_handler(0, None::<fn() -> bool>);
            return Ok(conn);
        };

        let conn = loop {
            match self.conn.try_lock() {
                Ok(conn) => break conn,
                Err(TryLockError::Poisoned(_)) => return Err(lock_poisoned()),
                Err(TryLockError::WouldBlock) if deadline.expired() => {
                    return Err(deadline_exceeded());
                }
                Err(TryLockError::WouldBlock) => std::thread::sleep(LOCK_RETRY_INTERVAL),
            }
        };
        if deadline.expired() {
            return Err(deadline_exceeded());
        }
        conn.progress_handler(DEADLINE_CHECK_OPS, Some(move || deadline.expired()));
        Ok(conn)
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<HistoryRecord> {
        let tag_json: String = row.get(TAG_COLUMN)?;
        let tag: Vec<String> = serde_json::from_str(&tag_json)
            .map_err(|e| decode_failure(TAG_COLUMN, Type::Text, e.into()))?;

        let updates_json: String = row.get(UPDATES_COLUMN)?;
        let updates = decode_updates(&updates_json)
            .map_err(|e| decode_failure(UPDATES_COLUMN, Type::Text, e))?;

        let end_time = row
            .get::<_, Option<i64>>(14)?
            .map(|ms| millis_to_datetime(14, ms))
            .transpose()?;

        Ok(HistoryRecord {
            id: row.get(0)?,
            version: row.get(1)?,
            category: row.get(2)?,
            branch: row.get(3)?,
            parent_id: row.get(4)?,
            parent_name: row.get(5)?,
            created_at: millis_column(row, 6)?,
            created_by: row.get(7)?,
            created_by_id: row.get(8)?,
            status: row.get(9)?,
            problem: row.get(10)?,
            problem_resolve: row.get(11)?,
            complete_status: status_column(row, 12)?,
            start_time: millis_column(row, 13)?,
            end_time,
            tag,
            image: row.get(16)?,
            updated_at: millis_column(row, 17)?,
            updated_by: row.get(18)?,
            updated_by_id: row.get(19)?,
            updates,
        })
    }

    /// Maps rows selected with `unwound_columns`: the record columns (with an
    /// empty update log) followed by the single event.
    fn row_to_unwound(row: &Row) -> rusqlite::Result<HistoryRow> {
        let history = Self::row_to_record(row)?;
        let event_idx = HISTORY_COLUMNS.len();
        let event_json: String = row.get(event_idx)?;
        let update = serde_json::from_str::<StoredUpdate>(&event_json)
            .map_err(DecodeError::from)
            .and_then(StoredUpdate::into_event)
            .map_err(|e| decode_failure(event_idx, Type::Text, e))?;

        Ok(HistoryRow { history, update })
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn insert(&self, request: CreateHistoryRequest) -> Result<HistoryRecord, HistoryError> {
        let now = now_millis();
        let id = uuid::Uuid::now_v7().to_string();

        let first_update = HistoryUpdateEvent {
            time: now,
            updated_by: request.created_by.clone(),
            updated_by_id: request.created_by_id.clone(),
            problem: request.problem.clone(),
            problem_resolve: request.problem_resolve.clone(),
            complete_status: request.complete_status,
            vendor: request.vendor,
        };

        let record = HistoryRecord {
            id,
            version: HISTORY_SCHEMA_VERSION,
            category: normalize_code(&request.category),
            branch: normalize_code(&request.branch),
            parent_id: request.parent_id,
            parent_name: request.parent_name,
            created_at: now,
            created_by: request.created_by.clone(),
            created_by_id: request.created_by_id.clone(),
            status: request.status,
            problem: request.problem,
            problem_resolve: request.problem_resolve,
            complete_status: request.complete_status,
            start_time: request.start_time.map(|t| t.trunc_subsecs(3)).unwrap_or(now),
            end_time: request.end_time.map(|t| t.trunc_subsecs(3)),
            tag: request.tag.unwrap_or_default(),
            image: request.image,
            updated_at: now,
            updated_by: request.created_by,
            updated_by_id: request.created_by_id,
            updates: vec![first_update],
        };

        let tag_json = to_json(&record.tag)?;
        let stored_updates: Vec<StoredUpdate> =
            record.updates.iter().map(StoredUpdate::from).collect();
        let updates_json = to_json(&stored_updates)?;

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO histories ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
                column_list("")
            ),
            params![
                record.id,
                record.version,
                record.category,
                record.branch,
                record.parent_id,
                record.parent_name,
                record.created_at.timestamp_millis(),
                record.created_by,
                record.created_by_id,
                record.status,
                record.problem,
                record.problem_resolve,
                record.complete_status.code(),
                record.start_time.timestamp_millis(),
                record.end_time.map(|t| t.timestamp_millis()),
                tag_json,
                record.image,
                record.updated_at.timestamp_millis(),
                record.updated_by,
                record.updated_by_id,
                updates_json,
            ],
        )
        .map_err(db_err)?;

        Ok(record)
    }

    fn edit_with_fence(
        &self,
        id: &str,
        edit: HistoryEdit,
        fence_branch: &str,
        fence_updated_at: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError> {
        let now = now_millis();
        let event = StoredUpdate {
            time: now.timestamp_millis(),
            updated_by: edit.updated_by.clone(),
            updated_by_id: edit.updated_by_id.clone(),
            problem: edit.problem.clone(),
            problem_resolve: edit.problem_resolve.clone(),
            complete_status: edit.complete_status.code(),
            vendor: edit.vendor,
        };
        let event_json = to_json(&event)?;
        let tag_json = edit.tag.as_ref().map(to_json).transpose()?;

        // The new updated_at is strictly greater than the fence, so the fence
        // can never match twice. The appended event carries the same time.
        let sql = format!(
            "UPDATE histories SET \
                status = ?1, problem = ?2, problem_resolve = ?3, complete_status = ?4, \
                end_time = COALESCE(?5, end_time), tag = COALESCE(?6, tag), \
                updated_by = ?7, updated_by_id = ?8, \
                updated_at = max(?9, updated_at + 1), \
                updates = json_insert(updates, '$[#]', json_set(json(?10), '$.time', max(?9, updated_at + 1))) \
             WHERE id = ?11 AND branch = ?12 AND updated_at = ?13 AND complete_status NOT IN ({}) \
             RETURNING {}",
            terminal_codes(),
            column_list("")
        );

        let conn = self.conn()?;
        conn.query_row(
            &sql,
            params![
                edit.status,
                edit.problem,
                edit.problem_resolve,
                edit.complete_status.code(),
                edit.end_time.map(|t| t.timestamp_millis()),
                tag_json,
                edit.updated_by,
                edit.updated_by_id,
                now.timestamp_millis(),
                event_json,
                id,
                normalize_code(fence_branch),
                fence_updated_at.timestamp_millis(),
            ],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| HistoryError::Fenced { id: id.to_string() })
    }

    fn delete(
        &self,
        id: &str,
        branch: &str,
        not_older_than: DateTime<Utc>,
    ) -> Result<HistoryRecord, HistoryError> {
        let sql = format!(
            "DELETE FROM histories WHERE id = ?1 AND branch = ?2 AND created_at >= ?3 RETURNING {}",
            column_list("")
        );

        let conn = self.conn()?;
        conn.query_row(
            &sql,
            params![id, normalize_code(branch), not_older_than.timestamp_millis()],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    fn get(&self, id: &str, branch: &str) -> Result<HistoryRecord, HistoryError> {
        let mut clause = WhereClause::default();
        clause.push("id = ?", id.to_string());
        let branch = normalize_code(branch);
        if !branch.is_empty() {
            clause.push("branch = ?", branch);
        }

        let sql = format!(
            "SELECT {} FROM histories {}",
            column_list(""),
            clause.render()
        );

        let conn = self.conn()?;
        conn.query_row(&sql, clause.param_refs().as_slice(), Self::row_to_record)
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    fn find(&self, filter: &FilterSpec) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut clause = WhereClause::default();
        clause.push_identity_filters(filter, "");
        if let Some(start) = filter.start {
            clause.push("created_at >= ?", start.timestamp_millis());
        }
        if let Some(end) = filter.end {
            clause.push("created_at <= ?", end.timestamp_millis());
        }
        clause.params.push(Box::new(filter.effective_limit()));

        let sql = format!(
            "SELECT {} FROM histories {} ORDER BY updated_at DESC, id DESC LIMIT ?",
            column_list(""),
            clause.render()
        );

        let conn = self.conn()?;
        query_all(&conn, &sql, &clause, Self::row_to_record)
    }

    fn find_for_parent(&self, parent_id: &str) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut clause = WhereClause::default();
        clause.push("parent_id = ?", parent_id.to_string());

        let sql = format!(
            "SELECT {} FROM histories {} ORDER BY id DESC",
            column_list(""),
            clause.render()
        );

        let conn = self.conn()?;
        query_all(&conn, &sql, &clause, Self::row_to_record)
    }

    fn find_for_user(
        &self,
        user_id: &str,
        filter: &FilterSpec,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut clause = WhereClause::default();
        clause.conditions.push(
            "(created_by_id = ? OR EXISTS (SELECT 1 FROM json_each(histories.updates) AS u \
             WHERE json_extract(u.value, '$.updated_by_id') = ?))"
                .to_string(),
        );
        clause.params.push(Box::new(user_id.to_string()));
        clause.params.push(Box::new(user_id.to_string()));
        if let Some(start) = filter.start {
            clause.push("created_at >= ?", start.timestamp_millis());
        }
        if let Some(end) = filter.end {
            clause.push("created_at <= ?", end.timestamp_millis());
        }
        clause.params.push(Box::new(filter.effective_limit()));

        let sql = format!(
            "SELECT {} FROM histories {} ORDER BY updated_at DESC, id DESC LIMIT ?",
            column_list(""),
            clause.render()
        );

        let conn = self.conn()?;
        query_all(&conn, &sql, &clause, Self::row_to_record)
    }

    fn count_by_status(
        &self,
        branch: &str,
        status: CompleteStatus,
    ) -> Result<Vec<BranchCount>, HistoryError> {
        let mut clause = WhereClause::default();
        clause.push("complete_status = ?", status.code());
        let branch = normalize_code(branch);
        if !branch.is_empty() {
            clause.push("branch = ?", branch);
        }

        let sql = format!(
            "SELECT branch, COUNT(*) AS total FROM histories {} \
             GROUP BY branch ORDER BY total DESC, branch DESC",
            clause.render()
        );

        let conn = self.conn()?;
        query_all(&conn, &sql, &clause, |row| {
            Ok(BranchCount {
                branch: row.get(0)?,
                count: row.get(1)?,
            })
        })
    }

    fn upload_image(
        &self,
        id: &str,
        branch: &str,
        image: &str,
    ) -> Result<HistoryRecord, HistoryError> {
        let sql = format!(
            "UPDATE histories SET image = ?1 WHERE id = ?2 AND branch = ?3 RETURNING {}",
            column_list("")
        );

        let conn = self.conn()?;
        conn.query_row(
            &sql,
            params![image, id, normalize_code(branch)],
            Self::row_to_record,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    fn find_unwound(
        &self,
        filter: &FilterSpec,
        order: UnwindOrder,
        vendor_only: bool,
    ) -> Result<Vec<HistoryRow>, HistoryError> {
        let mut clause = WhereClause::default();
        clause.push_identity_filters(filter, "h.");
        if let Some(start) = filter.start {
            clause.push("h.updated_at >= ?", start.timestamp_millis());
        }
        if let Some(end) = filter.end {
            clause.push("h.created_at <= ?", end.timestamp_millis());
        }
        if vendor_only {
            clause
                .conditions
                .push("json_extract(u.value, '$.vendor') = 1".to_string());
        }

        let direction = match order {
            UnwindOrder::OldestFirst => "ASC",
            UnwindOrder::NewestFirst => "DESC",
        };

        let sql = format!(
            "SELECT {columns}, u.value FROM histories AS h, json_each(h.updates) AS u {clause} \
             ORDER BY h.id ASC, json_extract(u.value, '$.time') {direction}, u.key {direction}",
            columns = unwound_columns(),
            clause = clause.render(),
        );

        let conn = self.conn()?;
        query_all(&conn, &sql, &clause, Self::row_to_unwound)
    }
}

// ============================================================================
// Query helpers
// ============================================================================

/// Conditions and positional parameters of a dynamic WHERE clause.
#[derive(Default)]
struct WhereClause {
    conditions: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    fn push(&mut self, condition: &str, param: impl ToSql + 'static) {
        self.conditions.push(condition.to_string());
        self.params.push(Box::new(param));
    }

    /// Branch, category and stage constraints, with an optional table prefix.
    fn push_identity_filters(&mut self, filter: &FilterSpec, prefix: &str) {
        if let Some(ref branch) = filter.branch {
            self.push(&format!("{prefix}branch = ?"), branch.clone());
        }

        if let Some(ref category) = filter.category {
            self.push(&format!("{prefix}category = ?"), category.clone());
        }

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            self.conditions
                .push(format!("{prefix}complete_status IN ({placeholders})"));
            for status in &filter.statuses {
                self.params.push(Box::new(status.code()));
            }
        }
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

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    clause: &WhereClause,
    map: impl FnMut(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, HistoryError> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt
        .query_map(clause.param_refs().as_slice(), map)
        .map_err(db_err)?;

    let mut items = Vec::new();
    for row_result in rows {
        items.push(row_result.map_err(db_err)?);
    }
    Ok(items)
}

fn column_list(prefix: &str) -> String {
    HISTORY_COLUMNS
        .iter()
        .map(|column| format!("{prefix}{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Record columns for the unwound view, with the update log blanked out.
fn unwound_columns() -> String {
    HISTORY_COLUMNS
        .iter()
        .map(|column| match *column {
            "updates" => "'[]'".to_string(),
            other => format!("h.{other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn terminal_codes() -> String {
    CompleteStatus::ALL
        .into_iter()
        .filter(|status| status.is_terminal())
        .map(|status| status.code().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn db_err(e: rusqlite::Error) -> HistoryError {
    match e.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => deadline_exceeded(),
        _ => HistoryError::Persistence(e.to_string()),
    }
}

fn deadline_exceeded() -> HistoryError {
    HistoryError::Persistence("store call deadline exceeded".to_string())
}

fn lock_poisoned() -> HistoryError {
    HistoryError::Persistence("connection lock poisoned".to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HistoryError> {
    serde_json::to_string(value).map_err(|e| HistoryError::Persistence(e.to_string()))
}

// ============================================================================
// Column decoding
// ============================================================================

#[derive(Debug, Error)]
enum DecodeError {
    #[error("timestamp out of range: {0}")]
    Timestamp(i64),

    #[error(transparent)]
    Status(#[from] InvalidCompleteStatus),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn decode_failure(idx: usize, ty: Type, e: DecodeError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

fn millis_to_datetime(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| decode_failure(idx, Type::Integer, DecodeError::Timestamp(ms)))
}

fn millis_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    millis_to_datetime(idx, row.get(idx)?)
}

fn status_column(row: &Row, idx: usize) -> rusqlite::Result<CompleteStatus> {
    let code: i32 = row.get(idx)?;
    CompleteStatus::try_from(code).map_err(|e| decode_failure(idx, Type::Integer, e.into()))
}

fn decode_updates(json: &str) -> Result<Vec<HistoryUpdateEvent>, DecodeError> {
    let stored: Vec<StoredUpdate> = serde_json::from_str(json)?;
    stored.into_iter().map(StoredUpdate::into_event).collect()
}

/// Update-log entry as stored in the JSON column. Times are epoch
/// milliseconds so SQL can order events numerically.
#[derive(Debug, Serialize, Deserialize)]
struct StoredUpdate {
    time: i64,
    updated_by: String,
    updated_by_id: String,
    problem: String,
    problem_resolve: String,
    complete_status: i32,
    #[serde(default)]
    vendor: bool,
}

impl StoredUpdate {
    fn into_event(self) -> Result<HistoryUpdateEvent, DecodeError> {
        Ok(HistoryUpdateEvent {
            time: DateTime::from_timestamp_millis(self.time)
                .ok_or(DecodeError::Timestamp(self.time))?,
            updated_by: self.updated_by,
            updated_by_id: self.updated_by_id,
            problem: self.problem,
            problem_resolve: self.problem_resolve,
            complete_status: CompleteStatus::try_from(self.complete_status)?,
            vendor: self.vendor,
        })
    }
}

impl From<&HistoryUpdateEvent> for StoredUpdate {
    fn from(event: &HistoryUpdateEvent) -> Self {
        Self {
            time: event.time.timestamp_millis(),
            updated_by: event.updated_by.clone(),
            updated_by_id: event.updated_by_id.clone(),
            problem: event.problem.clone(),
            problem_resolve: event.problem_resolve.clone(),
            complete_status: event.complete_status.code(),
            vendor: event.vendor,
        }
    }
}
