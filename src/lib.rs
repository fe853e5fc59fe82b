//! # Speech Scorer
//!
//! An HTTP service that ingests recorded speech, normalizes it to 16 kHz mono
//! WAV under a durable sequence id, and scores it with a hosted generative
//! model that returns a structured analysis.
//!
//! ## Architecture
//!
//! ```text
//! Client → axum (server) → Pipeline ─┬→ FileStore (raw/, wav/)
//!                                     ├→ ffmpeg (audio)
//!                                     ├→ SQLite (sequence state, records)
//!                                     └→ Gemini REST (genai) → ResponseNormalizer
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use speech_scorer::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let pipeline = Pipeline::from_config(&config).await?;
//!     let record = pipeline.ingest(&std::fs::read("answer.webm")?, "answer.webm").await?;
//!     let report = pipeline.analyze(Some(&record.wav_filename), &[]).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

/// Result schema, JSON extraction and the response normalizer.
pub mod analysis;
/// Audio conversion to the canonical WAV format.
pub mod audio;
/// Command-line surface.
pub mod cli;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Client for the hosted generative model.
pub mod genai;
/// Ingest and analyze orchestration.
pub mod pipeline;
/// Structured-output prompts.
pub mod prompts;
/// HTTP router and handlers.
pub mod server;
/// Sequence counter, records and file storage.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::Pipeline;
pub use server::{build_router, AppState, SharedState};
