//! Checkpoint store for meta_prompter
//!
//! Persists conversation snapshots keyed by `(thread_id, timestamp)`, the
//! run/step audit trail, and the conversation name registry. All access goes
//! through one process-wide `SqlitePool`; when the pool is exhausted callers
//! queue until the acquire timeout and then fail with `StorageUnavailable`.

pub mod payload;
mod schema;

pub use payload::{DecodeError, Payload};
pub use schema::*;

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] sqlx::Error),
    #[error("Failed to decode checkpoint {thread_id}@{timestamp}: {source}")]
    Decode {
        thread_id: String,
        timestamp: String,
        #[source]
        source: DecodeError,
    },
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Conversation already exists: {0}")]
    ConversationExists(String),
}

impl StoreError {
    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unavailable = match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => true,
            // SQLITE_BUSY / SQLITE_LOCKED
            sqlx::Error::Database(db_err) => matches!(db_err.code().as_deref(), Some("5" | "6")),
            _ => false,
        };
        if unavailable {
            StoreError::StorageUnavailable(err)
        } else {
            StoreError::Database(err)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Sizing of the shared connection pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Current time in the store's sortable timestamp format
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Next checkpoint timestamp for a thread, strictly after `previous`.
///
/// Wall-clock time is used unless it would not sort after the previous
/// checkpoint, in which case the previous timestamp is bumped by 1µs.
pub fn next_timestamp(previous: Option<&str>) -> String {
    let now = Utc::now();
    let Some(prev) = previous.and_then(|p| DateTime::parse_from_rfc3339(p).ok()) else {
        return format_timestamp(now);
    };
    let prev = prev.with_timezone(&Utc);
    if now > prev {
        format_timestamp(now)
    } else {
        format_timestamp(prev + ChronoDuration::microseconds(1))
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    // Fixed-width, so lexicographic order equals chronological order
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn require(field: &str, value: &str) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::InvalidQuery(format!("{field} must not be empty")));
    }
    Ok(())
}

const UPSERT_CHECKPOINT: &str = "
    INSERT INTO checkpoints
        (thread_id, timestamp, parent_timestamp, state_type, state, metadata_type, metadata)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT (thread_id, timestamp)
    DO UPDATE SET state_type = excluded.state_type,
                  state = excluded.state,
                  metadata_type = excluded.metadata_type,
                  metadata = excluded.metadata";

const SELECT_CHECKPOINT_COLUMNS: &str =
    "SELECT thread_id, timestamp, parent_timestamp, state_type, state, metadata_type, metadata
     FROM checkpoints";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create database at the given path
    pub async fn open<P: AsRef<Path>>(path: P, config: &PoolConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // A single long-lived connection keeps the in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Checkpoint Operations ====================

    /// Upsert a checkpoint keyed by `(thread_id, timestamp)`.
    ///
    /// Writing an existing key replaces its state and metadata, which makes
    /// retries of the same step safe.
    pub async fn put_checkpoint(
        &self,
        thread_id: &str,
        timestamp: &str,
        parent_timestamp: Option<&str>,
        state: &Payload,
        metadata: &Payload,
    ) -> StoreResult<CheckpointRef> {
        require("thread_id", thread_id)?;
        require("timestamp", timestamp)?;

        let (state_type, state_bytes) = state.dumps();
        let (metadata_type, metadata_bytes) = metadata.dumps();

        sqlx::query(UPSERT_CHECKPOINT)
            .bind(thread_id)
            .bind(timestamp)
            .bind(parent_timestamp)
            .bind(state_type)
            .bind(state_bytes)
            .bind(metadata_type)
            .bind(metadata_bytes)
            .execute(&self.pool)
            .await?;

        tracing::debug!(
            thread_id = %thread_id,
            timestamp = %timestamp,
            parent = ?parent_timestamp,
            "Checkpoint stored"
        );

        Ok(CheckpointRef {
            thread_id: thread_id.to_string(),
            timestamp: timestamp.to_string(),
        })
    }

    /// Fetch one checkpoint, or the latest for the thread when `timestamp` is `None`
    pub async fn get_checkpoint(
        &self,
        thread_id: &str,
        timestamp: Option<&str>,
    ) -> StoreResult<Option<Checkpoint>> {
        require("thread_id", thread_id)?;

        let row = match timestamp {
            Some(ts) => {
                sqlx::query(&format!(
                    "{SELECT_CHECKPOINT_COLUMNS} WHERE thread_id = ?1 AND timestamp = ?2"
                ))
                .bind(thread_id)
                .bind(ts)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{SELECT_CHECKPOINT_COLUMNS} WHERE thread_id = ?1 ORDER BY timestamp DESC LIMIT 1"
                ))
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(checkpoint_from_row).transpose()
    }

    /// Stream checkpoints of a thread, newest first.
    ///
    /// Each call issues a fresh query; nothing is cached between calls.
    pub fn list_checkpoints<'a>(
        &'a self,
        thread_id: &'a str,
        before: Option<&'a str>,
        limit: Option<u32>,
    ) -> BoxStream<'a, StoreResult<Checkpoint>> {
        if let Err(e) = require("thread_id", thread_id) {
            return stream::once(async move { Err(e) }).boxed();
        }

        // LIMIT -1 means unbounded in SQLite
        let limit = limit.map_or(-1, i64::from);

        sqlx::query(
            "SELECT thread_id, timestamp, parent_timestamp, state_type, state, metadata_type, metadata
             FROM checkpoints
             WHERE thread_id = ?1 AND (?2 IS NULL OR timestamp < ?2)
             ORDER BY timestamp DESC
             LIMIT ?3",
        )
        .bind(thread_id)
        .bind(before)
        .bind(limit)
        .fetch(&self.pool)
        .map(|row| {
            row.map_err(StoreError::from)
                .and_then(|r| checkpoint_from_row(&r))
        })
        .boxed()
    }

    // ==================== Run Audit Operations ====================

    /// Get or create a run record in `started` status
    pub async fn start_run(&self, run_id: &str, thread_id: &str) -> StoreResult<Run> {
        require("run_id", run_id)?;
        sqlx::query(
            "INSERT INTO runs (run_id, thread_id, status, start_time)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (run_id) DO NOTHING",
        )
        .bind(run_id)
        .bind(thread_id)
        .bind(RunStatus::Started.to_string())
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        self.get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::InvalidQuery(format!("run {run_id} vanished after insert")))
    }

    /// Set the final status and end time of a run
    pub async fn finish_run(&self, run_id: &str, status: RunStatus) -> StoreResult<()> {
        sqlx::query("UPDATE runs SET status = ?1, end_time = ?2 WHERE run_id = ?3")
            .bind(status.to_string())
            .bind(now_timestamp())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_step(&self, step: &Step) -> StoreResult<()> {
        require("run_id", &step.run_id)?;
        require("step_id", &step.step_id)?;
        sqlx::query(
            "INSERT OR REPLACE INTO steps
                (run_id, step_id, start_time, end_time, inputs, outputs, step_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&step.run_id)
        .bind(&step.step_id)
        .bind(&step.start_time)
        .bind(&step.end_time)
        .bind(step.inputs.to_string())
        .bind(step.outputs.to_string())
        .bind(&step.step_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> StoreResult<Option<Run>> {
        let row = sqlx::query(
            "SELECT run_id, thread_id, status, start_time, end_time FROM runs WHERE run_id = ?1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    /// List runs, most recent first
    pub async fn list_runs(&self) -> StoreResult<Vec<Run>> {
        let rows = sqlx::query(
            "SELECT run_id, thread_id, status, start_time, end_time FROM runs
             ORDER BY start_time DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }

    pub async fn latest_run(&self) -> StoreResult<Option<Run>> {
        let row = sqlx::query(
            "SELECT run_id, thread_id, status, start_time, end_time FROM runs
             ORDER BY start_time DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    /// Steps of a run in execution order
    pub async fn get_steps(&self, run_id: &str) -> StoreResult<Vec<Step>> {
        let rows = sqlx::query(
            "SELECT run_id, step_id, start_time, end_time, inputs, outputs, step_type
             FROM steps WHERE run_id = ?1 ORDER BY start_time ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(step_from_row).collect()
    }

    pub async fn get_step(&self, run_id: &str, step_id: &str) -> StoreResult<Option<Step>> {
        let row = sqlx::query(
            "SELECT run_id, step_id, start_time, end_time, inputs, outputs, step_type
             FROM steps WHERE run_id = ?1 AND step_id = ?2",
        )
        .bind(run_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(step_from_row).transpose()
    }

    // ==================== Conversation Registry ====================

    pub async fn create_conversation(
        &self,
        thread_id: &str,
        name: &str,
    ) -> StoreResult<ConversationRecord> {
        require("thread_id", thread_id)?;
        let result = sqlx::query("INSERT INTO conversations (thread_id, name) VALUES (?1, ?2)")
            .bind(thread_id)
            .bind(name)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(ConversationRecord {
                thread_id: thread_id.to_string(),
                name: name.to_string(),
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::ConversationExists(thread_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_conversations(&self) -> StoreResult<Vec<ConversationRecord>> {
        let rows = sqlx::query("SELECT thread_id, name FROM conversations ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ConversationRecord {
                    thread_id: row.try_get("thread_id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    pub async fn rename_conversation(
        &self,
        thread_id: &str,
        name: &str,
    ) -> StoreResult<ConversationRecord> {
        let updated = sqlx::query("UPDATE conversations SET name = ?1 WHERE thread_id = ?2")
            .bind(name)
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(thread_id.to_string()));
        }
        Ok(ConversationRecord {
            thread_id: thread_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Remove a registry entry. Checkpoints of the thread are kept.
    pub async fn delete_conversation(&self, thread_id: &str) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM conversations WHERE thread_id = ?1")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(thread_id.to_string()));
        }
        Ok(())
    }
}

/// Parse a checkpoint row, decoding both tagged payloads
fn checkpoint_from_row(row: &SqliteRow) -> StoreResult<Checkpoint> {
    let thread_id: String = row.try_get("thread_id")?;
    let timestamp: String = row.try_get("timestamp")?;
    let state_type: String = row.try_get("state_type")?;
    let state_bytes: Vec<u8> = row.try_get("state")?;
    let metadata_type: String = row.try_get("metadata_type")?;
    let metadata_bytes: Vec<u8> = row.try_get("metadata")?;

    let decode = |tag: &str, bytes: &[u8]| {
        Payload::loads(tag, bytes).map_err(|source| StoreError::Decode {
            thread_id: thread_id.clone(),
            timestamp: timestamp.clone(),
            source,
        })
    };
    let state = decode(&state_type, &state_bytes)?;
    let metadata = decode(&metadata_type, &metadata_bytes)?;

    Ok(Checkpoint {
        parent_timestamp: row.try_get("parent_timestamp")?,
        thread_id,
        timestamp,
        state,
        metadata,
    })
}

fn run_from_row(row: &SqliteRow) -> StoreResult<Run> {
    Ok(Run {
        run_id: row.try_get("run_id")?,
        thread_id: row.try_get("thread_id")?,
        status: parse_run_status(row.try_get::<&str, _>("status")?),
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
    })
}

fn step_from_row(row: &SqliteRow) -> StoreResult<Step> {
    let parse_json = |column: &str| -> StoreResult<serde_json::Value> {
        let text: String = row.try_get(column)?;
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
    };
    Ok(Step {
        run_id: row.try_get("run_id")?,
        step_id: row.try_get("step_id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        inputs: parse_json("inputs")?,
        outputs: parse_json("outputs")?,
        step_type: row.try_get("step_type")?,
    })
}
