use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{AnalysisLog, AnalysisStatus, SequenceCounter, Storage, UploadRecord};
use crate::config::DatabaseConfig;
use crate::error::{CounterError, CounterResult, StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// How long a writer waits for another process to release the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory instance (single connection).
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Read the persisted next value. `None` means no id was ever issued.
async fn read_next_value(conn: &mut SqliteConnection) -> CounterResult<Option<u64>> {
    let row: Option<(String, Option<String>)> = sqlx::query_as(
        "SELECT typeof(next_value), CAST(next_value AS TEXT) FROM sequence_state WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    let Some((kind, raw)) = row else {
        return Ok(None);
    };

    let raw = raw.unwrap_or_default();
    if kind != "integer" {
        return Err(CounterError::Corruption {
            message: format!("next_value holds {} value {:?}", kind, raw),
        });
    }

    match raw.parse::<i64>() {
        Ok(value) if value >= 1 => Ok(Some(value as u64)),
        _ => Err(CounterError::Corruption {
            message: format!("next_value {:?} is not a positive integer", raw),
        }),
    }
}

/// Body of the critical section: read, compute, persist.
async fn issue_next(conn: &mut SqliteConnection) -> CounterResult<u64> {
    let issued = read_next_value(conn).await?.unwrap_or(1);
    let following = issued
        .checked_add(1)
        .filter(|v| *v <= i64::MAX as u64)
        .ok_or_else(|| CounterError::Corruption {
            message: format!("next_value {} cannot be advanced", issued),
        })?;

    sqlx::query(
        r#"
        INSERT INTO sequence_state (id, next_value) VALUES (1, ?)
        ON CONFLICT(id) DO UPDATE SET next_value = excluded.next_value
        "#,
    )
    .bind(following as i64)
    .execute(&mut *conn)
    .await?;

    Ok(issued)
}

/// End the critical section: COMMIT on success, ROLLBACK on any failure,
/// including a failed COMMIT. Returns false when the connection may still
/// hold the write lock.
async fn finish(conn: &mut SqliteConnection, outcome: &mut CounterResult<u64>) -> bool {
    if outcome.is_ok() {
        match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => return true,
            Err(e) => *outcome = Err(e.into()),
        }
    }

    match sqlx::query("ROLLBACK").execute(&mut *conn).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Failed to roll back sequence update");
            false
        }
    }
}

/// Run the critical section on a single connection.
async fn next_locked(pool: SqlitePool) -> CounterResult<u64> {
    let mut conn = pool.acquire().await?;

    // IMMEDIATE takes the database write lock up front, which excludes
    // every other connection and process until COMMIT.
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let mut outcome = issue_next(&mut conn).await;
    if !finish(&mut conn, &mut outcome).await {
        // Closed rather than returned to the pool with the lock held.
        drop(conn.detach());
    }
    outcome
}

#[async_trait]
impl SequenceCounter for SqliteStorage {
    async fn next(&self) -> CounterResult<u64> {
        // Detached so a dropped request cannot strand an open write transaction.
        let issued = tokio::spawn(next_locked(self.pool.clone()))
            .await
            .map_err(|e| CounterError::Interrupted {
                message: e.to_string(),
            })??;

        debug!(sequence_id = issued, "Issued sequence id");
        Ok(issued)
    }

    async fn peek(&self) -> CounterResult<u64> {
        let mut conn = self.pool.acquire().await?;
        Ok(read_next_value(&mut conn).await?.unwrap_or(1))
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn insert_upload(&self, record: &UploadRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads (sequence_id, raw_filename, wav_filename, wav_path, duration_seconds, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.sequence_id as i64)
        .bind(&record.raw_filename)
        .bind(&record.wav_filename)
        .bind(&record.wav_path)
        .bind(record.duration_seconds)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_upload(&self, wav_filename: &str) -> StorageResult<Option<UploadRecord>> {
        let row: Option<UploadRow> = sqlx::query_as(
            r#"
            SELECT sequence_id, raw_filename, wav_filename, wav_path, duration_seconds, created_at
            FROM uploads
            WHERE wav_filename = ?
            "#,
        )
        .bind(wav_filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn recent_uploads(&self, limit: u32) -> StorageResult<Vec<UploadRecord>> {
        let rows: Vec<UploadRow> = sqlx::query_as(
            r#"
            SELECT sequence_id, raw_filename, wav_filename, wav_path, duration_seconds, created_at
            FROM uploads
            ORDER BY sequence_id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn log_analysis(&self, log: &AnalysisLog) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analyses (id, wav_filename, status, reason, raw_text, attempts, latency_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.wav_filename)
        .bind(log.status.as_str())
        .bind(&log.reason)
        .bind(&log.raw_text)
        .bind(log.attempts as i64)
        .bind(log.latency_ms)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_analyses(&self, wav_filename: &str) -> StorageResult<Vec<AnalysisLog>> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(
            r#"
            SELECT id, wav_filename, status, reason, raw_text, attempts, latency_ms, created_at
            FROM analyses
            WHERE wav_filename = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(wav_filename)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

fn parse_timestamp(value: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct UploadRow {
    sequence_id: i64,
    raw_filename: String,
    wav_filename: String,
    wav_path: String,
    duration_seconds: f64,
    created_at: String,
}

impl From<UploadRow> for UploadRecord {
    fn from(row: UploadRow) -> Self {
        Self {
            sequence_id: row.sequence_id.max(0) as u64,
            raw_filename: row.raw_filename,
            wav_filename: row.wav_filename,
            wav_path: row.wav_path,
            duration_seconds: row.duration_seconds,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    wav_filename: String,
    status: String,
    reason: Option<String>,
    raw_text: Option<String>,
    attempts: i64,
    latency_ms: i64,
    created_at: String,
}

impl From<AnalysisRow> for AnalysisLog {
    fn from(row: AnalysisRow) -> Self {
        Self {
            id: row.id,
            wav_filename: row.wav_filename,
            status: row.status.parse().unwrap_or(AnalysisStatus::ServiceError),
            reason: row.reason,
            raw_text: row.raw_text,
            attempts: row.attempts.max(0) as u32,
            latency_ms: row.latency_ms,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
