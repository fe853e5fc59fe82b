//! Shared fixtures for pipeline and API tests.
//!
//! Provides an in-process converter that emits a real WAV, a scripted
//! analysis service that counts calls, and a pipeline wired to both.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use speech_scorer::audio::{AudioConverter, NormalizedAudio, TARGET_SAMPLE_RATE};
use speech_scorer::error::{
    AnalysisServiceError, AnalysisServiceResult, ConversionError, ConversionResult, CounterError,
    CounterResult,
};
use speech_scorer::genai::{AnalysisService, AudioHandle};
use speech_scorer::storage::{FileStore, SequenceCounter, SqliteStorage};
use speech_scorer::Pipeline;

/// Silent mono 16 kHz WAV of the given length.
pub fn silent_wav(seconds: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..(seconds * TARGET_SAMPLE_RATE as f64) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Converter that ignores its input and returns a fixed WAV.
pub struct FakeConverter {
    pub seconds: f64,
    pub calls: AtomicUsize,
}

impl FakeConverter {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AudioConverter for FakeConverter {
    async fn normalize(&self, raw_path: &Path) -> ConversionResult<NormalizedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(raw_path.exists(), "raw upload must exist during conversion");
        Ok(NormalizedAudio {
            wav_bytes: silent_wav(self.seconds),
            duration_seconds: self.seconds,
        })
    }
}

/// Converter that always fails like a tool rejecting its input.
pub struct FailingConverter;

#[async_trait]
impl AudioConverter for FailingConverter {
    async fn normalize(&self, _raw_path: &Path) -> ConversionResult<NormalizedAudio> {
        Err(ConversionError::Failed {
            program: "ffmpeg".to_string(),
            status: 1,
            diagnostics: "Invalid data found when processing input".to_string(),
        })
    }
}

/// Counter whose persisted state cannot be read.
pub struct CorruptCounter;

#[async_trait]
impl SequenceCounter for CorruptCounter {
    async fn next(&self) -> CounterResult<u64> {
        Err(CounterError::Corruption {
            message: "next_value holds text value \"garbage\"".to_string(),
        })
    }

    async fn peek(&self) -> CounterResult<u64> {
        self.next().await
    }
}

/// Analysis service that replays scripted responses in order.
#[derive(Default)]
pub struct ScriptedService {
    responses: Mutex<VecDeque<AnalysisServiceResult<String>>>,
    pub uploads: AtomicUsize,
    pub generates: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new(responses: Vec<AnalysisServiceResult<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn generates(&self) -> usize {
        self.generates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn upload_audio(&self, wav_path: &Path) -> AnalysisServiceResult<AudioHandle> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(AudioHandle {
            name: format!("files/{}", wav_path.display()),
            uri: "https://example.test/v1beta/files/fake".to_string(),
            mime_type: "audio/wav".to_string(),
        })
    }

    async fn generate(&self, _audio: &AudioHandle, prompt: &str) -> AnalysisServiceResult<String> {
        self.generates.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AnalysisServiceError::InvalidResponse {
                    message: "no scripted response left".to_string(),
                })
            })
    }
}

/// A well-formed model answer.
pub fn valid_analysis_text(fluency: i64) -> String {
    json!({
        "transcript": "so um I think ownership is the key idea",
        "scores": {
            "fluency": fluency,
            "confidence": 70,
            "filler_rate_per_min": 3.2,
            "tone": "Neutral",
            "keyword_coverage_pct": 50
        },
        "counts": {"total_words": 8, "total_fillers": 1, "long_pauses": 0},
        "suggestions": ["Drop the filler at the start"]
    })
    .to_string()
}

/// Temporary upload directory plus a pipeline over it.
pub struct TestPipeline {
    pub dir: TempDir,
    pub pipeline: Pipeline,
}

pub async fn test_pipeline(
    converter: Arc<dyn AudioConverter>,
    service: Arc<dyn AnalysisService>,
) -> TestPipeline {
    let dir = TempDir::new().unwrap();
    let files = FileStore::open(dir.path().join("raw"), dir.path().join("wav"))
        .await
        .unwrap();
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let pipeline = Pipeline::new(files, storage, converter, service);
    TestPipeline { dir, pipeline }
}

/// Names of the regular files in a directory.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
