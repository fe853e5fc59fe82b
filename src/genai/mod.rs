//! Analysis client for the hosted generative model.
//!
//! [`AnalysisService`] is the seam the response normalizer drives;
//! [`GeminiClient`] implements it over the Gemini REST API.

mod client;
mod types;

pub use client::GeminiClient;
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

use crate::error::AnalysisServiceResult;

/// External model capability: audio + prompt in, raw text out.
///
/// Transport failures are returned as errors and never retried here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Upload a WAV file once; the handle can back several requests.
    async fn upload_audio(&self, wav_path: &Path) -> AnalysisServiceResult<AudioHandle>;

    /// Issue one structured-output request against uploaded audio.
    async fn generate(&self, audio: &AudioHandle, prompt: &str) -> AnalysisServiceResult<String>;
}
