//! Persistence for ingested recordings.
//!
//! Two halves:
//! - [`SqliteStorage`]: the durable sequence counter plus upload and analysis
//!   records, kept in one SQLite file shared by every worker process.
//! - [`FileStore`]: raw uploads and converted WAV files on disk.

mod files;
mod sqlite;

pub use files::{sequence_id_from_filename, wav_filename_for, FileStore};
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CounterResult, StorageResult};

/// A successfully ingested recording. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Durable sequence id, always >= 1.
    pub sequence_id: u64,
    /// Name of the raw upload under the raw directory.
    pub raw_filename: String,
    /// Public handle, derived from `sequence_id`.
    pub wav_filename: String,
    /// Absolute or configured path of the WAV file.
    pub wav_path: String,
    /// Duration of the converted audio.
    pub duration_seconds: f64,
    /// When ingestion completed.
    pub created_at: DateTime<Utc>,
}

/// Status recorded for an analyze call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Model output parsed into a full result.
    Ok,
    /// Model output never matched the schema.
    ParseError,
    /// The model service itself failed.
    ServiceError,
}

impl AnalysisStatus {
    /// Column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Ok => "ok",
            AnalysisStatus::ParseError => "parse_error",
            AnalysisStatus::ServiceError => "service_error",
        }
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(AnalysisStatus::Ok),
            "parse_error" => Ok(AnalysisStatus::ParseError),
            "service_error" => Ok(AnalysisStatus::ServiceError),
            _ => Err(format!("Unknown analysis status: {}", s)),
        }
    }
}

/// Log entry for a single analyze call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisLog {
    pub id: String,
    pub wav_filename: String,
    pub status: AnalysisStatus,
    pub reason: Option<String>,
    pub raw_text: Option<String>,
    /// Model requests issued (1 or 2).
    pub attempts: u32,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl AnalysisLog {
    /// Start a log entry for the given recording.
    pub fn new(wav_filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            wav_filename: wav_filename.into(),
            status: AnalysisStatus::Ok,
            reason: None,
            raw_text: None,
            attempts: 0,
            latency_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// Record a parsed result.
    pub fn success(mut self, raw_text: impl Into<String>, attempts: u32, latency_ms: i64) -> Self {
        self.status = AnalysisStatus::Ok;
        self.raw_text = Some(raw_text.into());
        self.attempts = attempts;
        self.latency_ms = latency_ms;
        self
    }

    /// Record output that could not be parsed.
    pub fn parse_failure(
        mut self,
        raw_text: impl Into<String>,
        reason: impl Into<String>,
        attempts: u32,
        latency_ms: i64,
    ) -> Self {
        self.status = AnalysisStatus::ParseError;
        self.raw_text = Some(raw_text.into());
        self.reason = Some(reason.into());
        self.attempts = attempts;
        self.latency_ms = latency_ms;
        self
    }

    /// Record a model service failure.
    ///
    /// `raw_text` is the output of an earlier attempt, if one came back.
    pub fn service_failure(
        mut self,
        reason: impl Into<String>,
        raw_text: Option<&str>,
        attempts: u32,
        latency_ms: i64,
    ) -> Self {
        self.status = AnalysisStatus::ServiceError;
        self.reason = Some(reason.into());
        self.raw_text = raw_text.map(str::to_string);
        self.attempts = attempts;
        self.latency_ms = latency_ms;
        self
    }
}

/// Durable, strictly increasing id source shared by every worker.
///
/// `next` must read, increment, and persist under mutual exclusion that holds
/// across processes, and only return once the new state is durable.
#[async_trait]
pub trait SequenceCounter: Send + Sync {
    /// Issue the next id. The first id ever issued is 1.
    async fn next(&self) -> CounterResult<u64>;

    /// Value the next call to `next` would issue, without consuming it.
    async fn peek(&self) -> CounterResult<u64>;
}

/// Record persistence for uploads and analyses.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Register an ingested recording.
    async fn insert_upload(&self, record: &UploadRecord) -> StorageResult<()>;

    /// Look up a recording by its WAV filename.
    async fn get_upload(&self, wav_filename: &str) -> StorageResult<Option<UploadRecord>>;

    /// Most recent recordings, newest first.
    async fn recent_uploads(&self, limit: u32) -> StorageResult<Vec<UploadRecord>>;

    /// Append an analysis log entry.
    async fn log_analysis(&self, log: &AnalysisLog) -> StorageResult<()>;

    /// Analysis history for one recording, oldest first.
    async fn get_analyses(&self, wav_filename: &str) -> StorageResult<Vec<AnalysisLog>>;
}
