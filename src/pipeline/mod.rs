//! Pipeline orchestrator: ingest (store + convert) and analyze (locate + score).

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{AnalysisOutcome, ResponseNormalizer};
use crate::audio::{AudioConverter, FfmpegConverter};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::genai::{AnalysisService, GeminiClient};
use crate::storage::{
    AnalysisLog, FileStore, SequenceCounter, SqliteStorage, Storage, UploadRecord,
};

/// Outcome of an analyze call, tagged with the file it ran against.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub wav_filename: String,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
}

/// Composes storage, conversion and analysis behind `ingest` and `analyze`.
#[derive(Clone)]
pub struct Pipeline {
    files: FileStore,
    storage: SqliteStorage,
    counter: Arc<dyn SequenceCounter>,
    converter: Arc<dyn AudioConverter>,
    normalizer: ResponseNormalizer,
    retain_raw: bool,
}

impl Pipeline {
    pub fn new(
        files: FileStore,
        storage: SqliteStorage,
        converter: Arc<dyn AudioConverter>,
        service: Arc<dyn AnalysisService>,
    ) -> Self {
        Self {
            files,
            counter: Arc::new(storage.clone()),
            storage,
            converter,
            normalizer: ResponseNormalizer::new(service),
            retain_raw: false,
        }
    }

    /// Keep raw uploads after a successful conversion.
    pub fn with_retain_raw(mut self, retain: bool) -> Self {
        self.retain_raw = retain;
        self
    }

    /// Issue sequence ids from another counter. Defaults to the database.
    pub fn with_counter(mut self, counter: Arc<dyn SequenceCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Wire up the production components from configuration.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let files = FileStore::open(config.storage.raw_dir(), config.storage.wav_dir()).await?;
        let storage = SqliteStorage::new(&config.database).await?;
        let converter = Arc::new(FfmpegConverter::new(&config.audio));
        let service = Arc::new(GeminiClient::new(&config.genai, config.request.clone())?);

        Ok(Self::new(files, storage, converter, service)
            .with_retain_raw(config.storage.retain_raw_uploads))
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Persist, convert and register one upload.
    ///
    /// The sequence id is only taken once conversion succeeded. A failure
    /// after the raw file is written leaves it in place and registers nothing.
    pub async fn ingest(&self, bytes: &[u8], original_name: &str) -> AppResult<UploadRecord> {
        if bytes.is_empty() {
            return Err(AppError::invalid_input("uploaded file is empty"));
        }

        let start = Instant::now();
        let raw_path = self.files.store_raw(bytes, original_name).await?;

        let audio = match self.converter.normalize(&raw_path).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(
                    raw_path = %raw_path.display(),
                    error = %e,
                    "Conversion failed, raw upload kept"
                );
                return Err(e.into());
            }
        };

        let sequence_id = self.counter.next().await?;
        let wav_filename = self.files.store_wav(&audio.wav_bytes, sequence_id).await?;

        let record = UploadRecord {
            sequence_id,
            raw_filename: file_name(&raw_path),
            wav_path: self.files.wav_dir().join(&wav_filename).display().to_string(),
            wav_filename,
            duration_seconds: audio.duration_seconds,
            created_at: Utc::now(),
        };
        self.storage.insert_upload(&record).await?;

        if !self.retain_raw {
            self.files.discard_raw(&raw_path).await;
        }

        info!(
            sequence_id,
            wav_filename = %record.wav_filename,
            duration_seconds = record.duration_seconds,
            latency_ms = start.elapsed().as_millis() as u64,
            "Upload ingested"
        );

        Ok(record)
    }

    /// Analyze a WAV file, or the most recent one when no name is given.
    ///
    /// Parse failures come back as [`AnalysisOutcome::Failed`]; only
    /// resolution and model service failures are errors. A service failure
    /// on the retry still carries the first attempt's raw text.
    pub async fn analyze(
        &self,
        wav_filename: Option<&str>,
        keywords: &[String],
    ) -> AppResult<AnalysisReport> {
        let keywords = clean_keywords(keywords);

        let wav_filename = match wav_filename.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => self
                .files
                .most_recent()
                .await?
                .ok_or_else(|| AppError::not_found("no wav files available"))?,
        };
        let wav_path = self.files.resolve(&wav_filename).await?;

        let start = Instant::now();
        let result = self.normalizer.run(&wav_path, &keywords).await;
        let latency_ms = start.elapsed().as_millis() as i64;

        let log = AnalysisLog::new(&wav_filename);
        let log = match &result {
            Ok(AnalysisOutcome::Ok {
                raw_text, attempts, ..
            }) => log.success(raw_text.as_str(), *attempts, latency_ms),
            Ok(AnalysisOutcome::Failed {
                raw_text,
                reason,
                attempt_reasons,
            }) => log.parse_failure(
                raw_text.as_str(),
                reason.as_str(),
                attempt_reasons.len() as u32,
                latency_ms,
            ),
            Err(failure) => log.service_failure(
                failure.to_string(),
                failure.raw_text.as_deref(),
                failure.attempt_reasons.len() as u32,
                latency_ms,
            ),
        };
        if let Err(e) = self.storage.log_analysis(&log).await {
            warn!(wav_filename = %wav_filename, error = %e, "Failed to log analysis");
        }

        let outcome = result?;
        info!(
            wav_filename = %wav_filename,
            ok = outcome.is_ok(),
            attempts = outcome.attempts(),
            latency_ms,
            "Analysis finished"
        );

        Ok(AnalysisReport {
            wav_filename,
            outcome,
        })
    }

    /// WAV filenames, most recent first.
    pub async fn list(&self) -> AppResult<Vec<String>> {
        Ok(self.files.list_wav_files().await?)
    }

    /// Next sequence value, without consuming it.
    pub async fn peek_next_id(&self) -> AppResult<u64> {
        Ok(self.counter.peek().await?)
    }
}

fn clean_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
