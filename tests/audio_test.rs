//! Integration tests for the ffmpeg-backed converter
//!
//! Uses small shell scripts standing in for the conversion executable. The
//! cases run sequentially in one test so no script is executed while another
//! is still being written.

#![cfg(unix)]

mod helpers;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use helpers::silent_wav;
use speech_scorer::audio::{AudioConverter, FfmpegConverter};
use speech_scorer::config::AudioConfig;
use speech_scorer::error::ConversionError;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn converter(program: &Path) -> FfmpegConverter {
    FfmpegConverter::new(&AudioConfig {
        ffmpeg_path: program.display().to_string(),
    })
}

#[tokio::test]
async fn test_ffmpeg_converter_with_stub_executables() {
    let bin = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();

    let fixture = bin.path().join("fixture.wav");
    std::fs::write(&fixture, silent_wav(2.0)).unwrap();

    let input = uploads.path().join("answer.webm");
    std::fs::write(&input, b"opaque container bytes").unwrap();

    // Success: copy the fixture to the output path (last argument)
    let ok = write_script(
        bin.path(),
        "ok-ffmpeg",
        &format!(
            "for last in \"$@\"; do :; done\ncp \"{}\" \"$last\"",
            fixture.display()
        ),
    );
    let audio = converter(&ok).normalize(&input).await.unwrap();
    assert_eq!(audio.wav_bytes, silent_wav(2.0));
    assert!((audio.duration_seconds - 2.0).abs() < 1e-9);
    assert!(input.exists());

    // Scratch output directory is cleaned up
    let leftovers: Vec<_> = std::fs::read_dir(uploads.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    assert!(leftovers.is_empty());

    // Non-zero exit carries stderr
    let failing = write_script(
        bin.path(),
        "failing-ffmpeg",
        "echo 'answer.webm: Invalid data found when processing input' >&2\nexit 1",
    );
    match converter(&failing).normalize(&input).await.unwrap_err() {
        ConversionError::Failed {
            status,
            diagnostics,
            ..
        } => {
            assert_eq!(status, 1);
            assert!(diagnostics.contains("Invalid data found"));
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert!(input.exists(), "raw input must survive a failed conversion");

    // Exit 0 without writing anything
    let silent = write_script(bin.path(), "silent-ffmpeg", "echo 'nothing to do' >&2\nexit 0");
    match converter(&silent).normalize(&input).await.unwrap_err() {
        ConversionError::MissingOutput { diagnostics, .. } => {
            assert!(diagnostics.contains("nothing to do"))
        }
        other => panic!("expected MissingOutput, got {:?}", other),
    }

    // Output that is not a WAV
    let garbage = write_script(
        bin.path(),
        "garbage-ffmpeg",
        "for last in \"$@\"; do :; done\necho 'not audio' > \"$last\"",
    );
    assert!(matches!(
        converter(&garbage).normalize(&input).await.unwrap_err(),
        ConversionError::InvalidWav { .. }
    ));
}
