//! Audio normalization to mono 16 kHz PCM WAV.
//!
//! Conversion is delegated to an external executable run as a subprocess
//! ([`FfmpegConverter`]); the resulting WAV header is probed with `hound` to
//! report the duration.

use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::AudioConfig;
use crate::error::{ConversionError, ConversionResult};

/// Output channel count.
pub const TARGET_CHANNELS: u16 = 1;
/// Output sample rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Keep at most this much of the tool's stderr in error messages.
const MAX_DIAGNOSTIC_CHARS: usize = 2_000;

/// Converted audio ready to be stored.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    pub wav_bytes: Vec<u8>,
    pub duration_seconds: f64,
}

/// Turns an arbitrary uploaded audio file into normalized WAV bytes.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Convert the file at `raw_path`. The input file is never modified.
    async fn normalize(&self, raw_path: &Path) -> ConversionResult<NormalizedAudio>;
}

/// [`AudioConverter`] backed by an ffmpeg-compatible executable.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    program: String,
}

impl FfmpegConverter {
    /// Create a converter running the configured executable.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            program: config.ffmpeg_path.clone(),
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-nostdin")
            .arg("-y")
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(input)
            .arg("-vn")
            .arg("-ac")
            .arg(TARGET_CHANNELS.to_string())
            .arg("-ar")
            .arg(TARGET_SAMPLE_RATE.to_string())
            .args(["-c:a", "pcm_s16le"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn normalize(&self, raw_path: &Path) -> ConversionResult<NormalizedAudio> {
        let start = Instant::now();

        // Scratch directory next to the input; removed on drop.
        let scratch = match raw_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => tempfile::tempdir_in(parent)?,
            _ => tempfile::tempdir()?,
        };
        let output_path = scratch.path().join("normalized.wav");

        debug!(
            program = %self.program,
            input = %raw_path.display(),
            "Starting audio conversion"
        );

        let output = self
            .command(raw_path, &output_path)
            .output()
            .await
            .map_err(|source| ConversionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let diagnostics = diagnostics_from(&output.stderr);

        if !output.status.success() {
            let status = output.status.code().unwrap_or(-1);
            warn!(
                program = %self.program,
                exit_code = status,
                latency_ms = start.elapsed().as_millis() as u64,
                diagnostics = %diagnostics,
                "Audio conversion failed"
            );
            return Err(ConversionError::Failed {
                program: self.program.clone(),
                status,
                diagnostics,
            });
        }

        let wav_bytes = match tokio::fs::read(&output_path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                return Err(ConversionError::MissingOutput {
                    program: self.program.clone(),
                    diagnostics: format!("output file is empty. {}", diagnostics).trim().to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConversionError::MissingOutput {
                    program: self.program.clone(),
                    diagnostics,
                })
            }
            Err(e) => return Err(ConversionError::Io(e)),
        };

        let duration_seconds = wav_duration_seconds(&wav_bytes)?;

        info!(
            program = %self.program,
            bytes = wav_bytes.len(),
            duration_seconds,
            latency_ms = start.elapsed().as_millis() as u64,
            "Audio conversion succeeded"
        );

        Ok(NormalizedAudio {
            wav_bytes,
            duration_seconds,
        })
    }
}

/// Duration of a PCM WAV held in memory, in seconds.
pub fn wav_duration_seconds(wav_bytes: &[u8]) -> ConversionResult<f64> {
    let reader = hound::WavReader::new(Cursor::new(wav_bytes)).map_err(|e| {
        ConversionError::InvalidWav {
            message: e.to_string(),
        }
    })?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }

    // `duration` counts frames (samples per channel).
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

fn diagnostics_from(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        return text.to_string();
    }
    // The tail carries the actual error.
    let skip = text.chars().count() - MAX_DIAGNOSTIC_CHARS;
    format!("...{}", text.chars().skip(skip).collect::<String>())
}
