use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{parse_analysis, AnalysisOutcome, AnalysisResult};
use crate::error::AnalysisFailure;
use crate::genai::AnalysisService;
use crate::prompts;

/// Model requests issued per analysis, retry included.
pub const MAX_ATTEMPTS: u32 = 2;

/// Prompt used for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    /// Regular structured-output prompt.
    Primary,
    /// JSON-only restatement, used once after a parse failure.
    Strict,
}

impl PromptVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVariant::Primary => "primary",
            PromptVariant::Strict => "strict",
        }
    }

    /// Build the prompt text for this variant.
    pub fn prompt(&self, keywords: &[String]) -> String {
        match self {
            PromptVariant::Primary => prompts::analysis_prompt(keywords),
            PromptVariant::Strict => prompts::strict_analysis_prompt(keywords),
        }
    }

    /// Variant for the next attempt, if one is allowed.
    fn next(&self) -> Option<PromptVariant> {
        match self {
            PromptVariant::Primary => Some(PromptVariant::Strict),
            PromptVariant::Strict => None,
        }
    }
}

/// Turns raw model output into a typed [`AnalysisOutcome`].
///
/// The audio is uploaded once. A parse failure on the primary prompt earns
/// exactly one retry with the strict prompt against the same upload.
/// Transport failures are returned as errors and never retried; they keep
/// the raw text of an earlier unparseable response.
#[derive(Clone)]
pub struct ResponseNormalizer {
    service: Arc<dyn AnalysisService>,
}

impl ResponseNormalizer {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }

    /// Analyze one WAV file.
    pub async fn run(
        &self,
        wav_path: &Path,
        keywords: &[String],
    ) -> Result<AnalysisOutcome, AnalysisFailure> {
        let start = Instant::now();
        let audio = self.service.upload_audio(wav_path).await?;

        let mut variant = PromptVariant::Primary;
        let mut attempt_reasons = Vec::new();
        let mut last_raw_text = None;

        loop {
            let attempt = attempt_reasons.len() as u32 + 1;
            debug!(attempt, prompt = variant.as_str(), "Requesting analysis");

            let raw_text = match self
                .service
                .generate(&audio, &variant.prompt(keywords))
                .await
            {
                Ok(text) => text,
                Err(source) => {
                    return Err(AnalysisFailure {
                        source,
                        raw_text: last_raw_text,
                        attempt_reasons,
                    })
                }
            };

            match parse_analysis(&raw_text) {
                Ok(result) => {
                    info!(
                        attempt,
                        prompt = variant.as_str(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Analysis parsed"
                    );
                    return Ok(AnalysisOutcome::Ok {
                        result: reconcile_keywords(result, keywords),
                        raw_text,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(
                        attempt,
                        prompt = variant.as_str(),
                        reason = %reason,
                        raw_len = raw_text.len(),
                        "Model output did not parse"
                    );
                    attempt_reasons.push(reason.clone());

                    match variant.next() {
                        Some(next) => {
                            variant = next;
                            last_raw_text = Some(raw_text);
                        }
                        None => {
                            return Ok(AnalysisOutcome::Failed {
                                raw_text,
                                reason,
                                attempt_reasons,
                            })
                        }
                    }
                }
            }
        }
    }
}

/// Coverage is meaningless without keywords, whatever the model said.
fn reconcile_keywords(mut result: AnalysisResult, keywords: &[String]) -> AnalysisResult {
    if keywords.is_empty() {
        result.scores.keyword_coverage_pct = None;
    }
    result
}
