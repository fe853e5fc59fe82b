//! Command-line surface.
//!
//! `serve` (the default) runs the HTTP service; the other commands run one
//! pipeline operation against the configured upload directory and exit.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::pipeline::Pipeline;

/// Speech recording ingestion and scoring service.
#[derive(Parser, Debug)]
#[command(name = "speech-scorer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The chosen command, defaulting to `serve`.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve {
            bind: None,
            upload_dir: None,
        })
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Listen address, overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,

        /// Upload directory, overrides UPLOAD_DIR
        #[arg(long)]
        upload_dir: Option<PathBuf>,
    },

    /// Store and convert one audio file
    Ingest {
        /// Audio file in any container ffmpeg understands
        file: PathBuf,
    },

    /// Analyze a WAV file (the most recent one by default)
    Analyze {
        /// WAV filename as returned by ingest
        #[arg(long)]
        file: Option<String>,

        /// Keyword to check coverage for (repeatable)
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },

    /// List WAV files, most recent first
    List,

    /// Show the next sequence id without consuming it
    NextId,
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Exit code for an analysis whose model output never parsed.
pub const EXIT_PARSE_FAILURE: i32 = 2;

/// Execute a one-shot command.
pub async fn execute_command(command: Commands, pipeline: &Pipeline) -> CliResult {
    match command {
        Commands::Serve { .. } => CliResult::error("serve is not a one-shot command"),
        Commands::Ingest { file } => execute_ingest(pipeline, file).await,
        Commands::Analyze { file, keywords } => {
            execute_analyze(pipeline, file.as_deref(), &keywords).await
        }
        Commands::List => match pipeline.list().await {
            Ok(files) => CliResult::success(files.join("\n")),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::NextId => match pipeline.peek_next_id().await {
            Ok(next) => CliResult::success(next.to_string()),
            Err(e) => CliResult::error(e.to_string()),
        },
    }
}

async fn execute_ingest(pipeline: &Pipeline, file: PathBuf) -> CliResult {
    let bytes = match tokio::fs::read(&file).await {
        Ok(bytes) => bytes,
        Err(e) => return CliResult::error(format!("Failed to read {}: {}", file.display(), e)),
    };
    let original_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match pipeline.ingest(&bytes, &original_name).await {
        Ok(record) => to_json(&record),
        Err(e) => CliResult::error(e.to_string()),
    }
}

async fn execute_analyze(pipeline: &Pipeline, file: Option<&str>, keywords: &[String]) -> CliResult {
    match pipeline.analyze(file, keywords).await {
        Ok(report) => {
            let ok = report.outcome.is_ok();
            let mut result = to_json(&report);
            if !ok && result.exit_code == 0 {
                result.exit_code = EXIT_PARSE_FAILURE;
            }
            result
        }
        Err(e) => CliResult::error(e.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> CliResult {
    match serde_json::to_string_pretty(value) {
        Ok(json) => CliResult::success(json),
        Err(e) => CliResult::error(format!("Failed to serialize output: {}", e)),
    }
}
