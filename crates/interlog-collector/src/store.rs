//! SQLite-backed interaction storage.

use chrono::{DateTime, SecondsFormat, Utc};
use interlog_core::{
    InteractionRecord, JsonMap, LearningValue, ResultStatus, TaskType, UnknownVariant,
};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from interaction store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UnknownVariant> for StoreError {
    fn from(e: UnknownVariant) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(e: chrono::ParseError) -> Self {
        StoreError::Corrupt(format!("bad timestamp: {e}"))
    }
}

const COLUMNS: &str = "id, session_id, timestamp, command, arguments, context, task_type, \
     subcategory, complexity, execution_time_s, tools_used, adapters_used, result_status, \
     output_data, error_info, accuracy_score, satisfaction, learning_value, user_identifier, \
     environment_info";

/// Filters for listing interactions. Every filter is optional and they combine with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionQuery {
    pub task_type: Option<TaskType>,
    /// Empty means no filter.
    #[serde(default)]
    pub learning_values: Vec<LearningValue>,
    /// Empty means no filter.
    #[serde(default)]
    pub result_statuses: Vec<ResultStatus>,
    pub session_id: Option<String>,
    /// Inclusive lower bound on `timestamp`.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl InteractionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records worth exporting as training examples.
    pub fn training_candidates() -> Self {
        Self::new()
            .learning_values([LearningValue::High, LearningValue::Medium])
            .result_statuses([ResultStatus::SuccessPerfect, ResultStatus::SuccessPartial])
    }

    pub fn task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn learning_values(mut self, values: impl IntoIterator<Item = LearningValue>) -> Self {
        self.learning_values = values.into_iter().collect();
        self
    }

    pub fn result_statuses(mut self, statuses: impl IntoIterator<Item = ResultStatus>) -> Self {
        self.result_statuses = statuses.into_iter().collect();
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Aggregate statistics for one collector session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_execution_time_s: f64,
    pub avg_accuracy: Option<f64>,
    pub avg_satisfaction: Option<f64>,
    pub by_task_type: BTreeMap<String, u64>,
    pub by_learning_value: BTreeMap<String, u64>,
}

/// Fixed-width UTC encoding; lexicographic order matches time order.
pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Row as stored, before text columns are decoded.
struct RawRow {
    id: String,
    session_id: String,
    timestamp: String,
    command: String,
    arguments: String,
    context: String,
    task_type: String,
    subcategory: String,
    complexity: String,
    execution_time_s: f64,
    tools_used: String,
    adapters_used: String,
    result_status: String,
    output_data: Option<String>,
    error_info: Option<String>,
    accuracy_score: Option<f64>,
    satisfaction: Option<u8>,
    learning_value: String,
    user_identifier: Option<String>,
    environment_info: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            timestamp: row.get(2)?,
            command: row.get(3)?,
            arguments: row.get(4)?,
            context: row.get(5)?,
            task_type: row.get(6)?,
            subcategory: row.get(7)?,
            complexity: row.get(8)?,
            execution_time_s: row.get(9)?,
            tools_used: row.get(10)?,
            adapters_used: row.get(11)?,
            result_status: row.get(12)?,
            output_data: row.get(13)?,
            error_info: row.get(14)?,
            accuracy_score: row.get(15)?,
            satisfaction: row.get(16)?,
            learning_value: row.get(17)?,
            user_identifier: row.get(18)?,
            environment_info: row.get(19)?,
        })
    }

    fn decode(self) -> Result<InteractionRecord, StoreError> {
        let optional_map = |s: Option<String>| -> Result<Option<JsonMap>, StoreError> {
            s.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
        };

        Ok(InteractionRecord {
            timestamp: decode_timestamp(&self.timestamp)?,
            arguments: serde_json::from_str(&self.arguments)?,
            context: serde_json::from_str(&self.context)?,
            task_type: self.task_type.parse()?,
            complexity: self.complexity.parse()?,
            tools_used: serde_json::from_str(&self.tools_used)?,
            adapters_used: serde_json::from_str(&self.adapters_used)?,
            result_status: self.result_status.parse()?,
            output_data: optional_map(self.output_data)?,
            error_info: optional_map(self.error_info)?,
            learning_value: self.learning_value.parse()?,
            environment_info: serde_json::from_str(&self.environment_info)?,
            id: self.id,
            session_id: self.session_id,
            command: self.command,
            subcategory: self.subcategory,
            execution_time_s: self.execution_time_s,
            accuracy_score: self.accuracy_score,
            satisfaction: self.satisfaction,
            user_identifier: self.user_identifier,
        })
    }
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<RawRow>>,
) -> Result<Vec<InteractionRecord>, StoreError> {
    let mut records = Vec::new();
    for row in rows {
        records.push(row?.decode()?);
    }
    Ok(records)
}

/// SQLite-backed interaction storage.
///
/// Closed records live in one wide `interactions` table keyed by id. When the
/// snapshot outbox is enabled, every write also queues the id in
/// `snapshot_outbox` inside the same transaction.
pub struct InteractionStore {
    conn: Mutex<Connection>,
    outbox: bool,
}

impl InteractionStore {
    /// Opens (or creates) the store at the given database path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            outbox: false,
        };
        store.init_schema()?;
        tracing::info!("Interaction store initialized at {}", path.display());
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            outbox: false,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Queues every stored record for a filesystem snapshot.
    pub fn with_snapshot_outbox(mut self) -> Self {
        self.outbox = true;
        self
    }

    pub fn outbox_enabled(&self) -> bool {
        self.outbox
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                command TEXT NOT NULL,
                arguments TEXT NOT NULL,
                context TEXT NOT NULL,
                task_type TEXT NOT NULL,
                subcategory TEXT NOT NULL,
                complexity TEXT NOT NULL,
                execution_time_s REAL NOT NULL,
                tools_used TEXT NOT NULL,
                adapters_used TEXT NOT NULL,
                result_status TEXT NOT NULL,
                output_data TEXT,
                error_info TEXT,
                accuracy_score REAL,
                satisfaction INTEGER,
                learning_value TEXT NOT NULL,
                user_identifier TEXT,
                environment_info TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS snapshot_outbox (
                record_id TEXT PRIMARY KEY,
                enqueued_at TEXT NOT NULL,
                FOREIGN KEY (record_id) REFERENCES interactions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_interactions_timestamp ON interactions(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_interactions_session ON interactions(session_id);
            CREATE INDEX IF NOT EXISTS idx_interactions_task_type ON interactions(task_type);
            CREATE INDEX IF NOT EXISTS idx_outbox_enqueued ON snapshot_outbox(enqueued_at);
            "#,
        )?;

        Ok(())
    }

    /// Inserts or replaces a record by id.
    pub fn store(&self, record: &InteractionRecord) -> Result<(), StoreError> {
        let optional_json = |m: &Option<JsonMap>| -> Result<Option<String>, serde_json::Error> {
            m.as_ref().map(serde_json::to_string).transpose()
        };

        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO interactions ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
            ),
            params![
                record.id,
                record.session_id,
                encode_timestamp(&record.timestamp),
                record.command,
                serde_json::to_string(&record.arguments)?,
                serde_json::to_string(&record.context)?,
                record.task_type.as_str(),
                record.subcategory,
                record.complexity.as_str(),
                record.execution_time_s,
                serde_json::to_string(&record.tools_used)?,
                serde_json::to_string(&record.adapters_used)?,
                record.result_status.as_str(),
                optional_json(&record.output_data)?,
                optional_json(&record.error_info)?,
                record.accuracy_score,
                record.satisfaction,
                record.learning_value.as_str(),
                record.user_identifier,
                serde_json::to_string(&record.environment_info)?,
            ],
        )?;

        if self.outbox {
            tx.execute(
                "INSERT OR REPLACE INTO snapshot_outbox (record_id, enqueued_at) VALUES (?1, ?2)",
                params![record.id, encode_timestamp(&Utc::now())],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Retrieves a record by id.
    pub fn get(&self, id: &str) -> Result<Option<InteractionRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM interactions WHERE id = ?1"))?;
        let result = stmt.query_row(params![id], RawRow::from_row);

        match result {
            Ok(raw) => Ok(Some(raw.decode()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let count = conn.query_row("SELECT COUNT(*) FROM interactions", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Lists records matching the query, newest first.
    pub fn query(&self, query: &InteractionQuery) -> Result<Vec<InteractionRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut sql = format!("SELECT {COLUMNS} FROM interactions WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(task_type) = query.task_type {
            sql.push_str(" AND task_type = ?");
            params_vec.push(Box::new(task_type.as_str()));
        }

        push_in_clause(
            &mut sql,
            &mut params_vec,
            "learning_value",
            query.learning_values.iter().map(|v| v.as_str()),
        );
        push_in_clause(
            &mut sql,
            &mut params_vec,
            "result_status",
            query.result_statuses.iter().map(|s| s.as_str()),
        );

        if let Some(ref session_id) = query.session_id {
            sql.push_str(" AND session_id = ?");
            params_vec.push(Box::new(session_id.clone()));
        }

        if let Some(start) = query.start_time {
            sql.push_str(" AND timestamp >= ?");
            params_vec.push(Box::new(encode_timestamp(&start)));
        }

        if let Some(end) = query.end_time {
            sql.push_str(" AND timestamp <= ?");
            params_vec.push(Box::new(encode_timestamp(&end)));
        }

        sql.push_str(" ORDER BY timestamp DESC");

        match (query.limit, query.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), RawRow::from_row)?;

        collect_records(rows)
    }

    /// Aggregates the closed records of one session.
    pub fn session_stats(&self, session_id: &str) -> Result<SessionStats, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut stats = conn.query_row(
            r#"SELECT
               COUNT(*),
               COALESCE(SUM(CASE WHEN result_status LIKE 'success%' THEN 1 ELSE 0 END), 0),
               COALESCE(AVG(execution_time_s), 0.0),
               AVG(accuracy_score),
               AVG(satisfaction)
               FROM interactions WHERE session_id = ?1"#,
            params![session_id],
            |row| {
                let total: u64 = row.get(0)?;
                let successes: u64 = row.get(1)?;
                Ok(SessionStats {
                    session_id: session_id.to_string(),
                    total,
                    successes,
                    failures: total - successes,
                    avg_execution_time_s: row.get(2)?,
                    avg_accuracy: row.get(3)?,
                    avg_satisfaction: row.get(4)?,
                    ..Default::default()
                })
            },
        )?;

        stats.by_task_type = group_counts(&conn, "task_type", session_id)?;
        stats.by_learning_value = group_counts(&conn, "learning_value", session_id)?;
        Ok(stats)
    }

    /// Oldest queued snapshot records, up to `limit`.
    pub fn pending_snapshots(&self, limit: usize) -> Result<Vec<InteractionRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let columns = COLUMNS
            .split(", ")
            .map(|c| format!("i.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {columns} FROM snapshot_outbox o
             JOIN interactions i ON i.id = o.record_id
             ORDER BY o.enqueued_at, o.rowid LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], RawRow::from_row)?;

        collect_records(rows)
    }

    /// Removes a record from the snapshot outbox once its file exists.
    pub fn ack_snapshot(&self, record_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        conn.execute("DELETE FROM snapshot_outbox WHERE record_id = ?1", params![record_id])?;
        Ok(())
    }

    /// Moves a queued snapshot to the back of the outbox.
    pub fn defer_snapshot(&self, record_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;
        // Reinserting assigns a fresh rowid, which breaks enqueued_at ties.
        let removed = tx.execute(
            "DELETE FROM snapshot_outbox WHERE record_id = ?1",
            params![record_id],
        )?;
        if removed > 0 {
            tx.execute(
                "INSERT INTO snapshot_outbox (record_id, enqueued_at) VALUES (?1, ?2)",
                params![record_id, encode_timestamp(&Utc::now())],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn pending_snapshot_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let count = conn.query_row("SELECT COUNT(*) FROM snapshot_outbox", [], |r| r.get(0))?;
        Ok(count)
    }
}

fn push_in_clause(
    sql: &mut String,
    params_vec: &mut Vec<Box<dyn rusqlite::ToSql>>,
    column: &str,
    values: impl Iterator<Item = &'static str>,
) {
    let values: Vec<&'static str> = values.collect();
    if values.is_empty() {
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!(" AND {column} IN ({placeholders})"));
    for v in values {
        params_vec.push(Box::new(v));
    }
}

fn group_counts(
    conn: &Connection,
    column: &str,
    session_id: &str,
) -> Result<BTreeMap<String, u64>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM interactions WHERE session_id = ?1 GROUP BY {column}"
    ))?;
    let rows = stmt.query_map(params![session_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
    })?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}
