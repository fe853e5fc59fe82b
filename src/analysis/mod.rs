//! Speech analysis results and the model-output parse boundary.
//!
//! - [`AnalysisResult`]: the validated result schema
//! - [`parse_analysis`]: JSON extraction, validation, and numeric coercion
//! - [`ResponseNormalizer`]: primary request, one strict retry, typed outcome

mod normalizer;
mod parse;

pub use normalizer::*;
pub use parse::*;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Validated analysis of one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub transcript: String,
    pub scores: Scores,
    pub counts: Counts,
    /// Ordered, possibly empty.
    pub suggestions: Vec<String>,
}

/// Numeric judgments, clamped to their valid ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<u8>,
    /// 0-100
    pub fluency: u8,
    /// 0-100
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filler: Option<u8>,
    /// >= 0, one decimal place
    pub filler_rate_per_min: f64,
    pub tone: Tone,
    /// 0-100, `None` when no keywords were supplied.
    pub keyword_coverage_pct: Option<f64>,
}

/// Word-level counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total_words: u32,
    pub total_fillers: u32,
    pub long_pauses: u32,
}

/// Overall tone of the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Positive,
    Negative,
    Anxious,
    Angry,
    Happy,
    /// Any other label the model chose, lowercased.
    Other(String),
}

impl Tone {
    /// Parse a model label, case-insensitively. Empty labels are rejected.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        let tone = match label.as_str() {
            "" => return None,
            "neutral" => Tone::Neutral,
            "positive" => Tone::Positive,
            "negative" => Tone::Negative,
            "anxious" => Tone::Anxious,
            "angry" => Tone::Angry,
            "happy" => Tone::Happy,
            _ => Tone::Other(label),
        };
        Some(tone)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Positive => "positive",
            Tone::Negative => "negative",
            Tone::Anxious => "anxious",
            Tone::Angry => "angry",
            Tone::Happy => "happy",
            Tone::Other(label) => label,
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Tone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Tone::from_label(&label).ok_or_else(|| serde::de::Error::custom("tone must not be empty"))
    }
}

/// Result of driving the model to a parseable answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Parsed result plus the raw text it came from.
    Ok {
        result: AnalysisResult,
        raw_text: String,
        /// Model requests issued (1 or 2).
        attempts: u32,
    },
    /// No attempt parsed. `raw_text` is the last attempt's output.
    Failed {
        raw_text: String,
        reason: String,
        /// One reason per attempt, in order.
        attempt_reasons: Vec<String>,
    },
}

impl AnalysisOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, AnalysisOutcome::Ok { .. })
    }

    /// Raw model text, available on both variants.
    pub fn raw_text(&self) -> &str {
        match self {
            AnalysisOutcome::Ok { raw_text, .. } | AnalysisOutcome::Failed { raw_text, .. } => {
                raw_text
            }
        }
    }

    /// Model requests issued to reach this outcome.
    pub fn attempts(&self) -> u32 {
        match self {
            AnalysisOutcome::Ok { attempts, .. } => *attempts,
            AnalysisOutcome::Failed {
                attempt_reasons, ..
            } => attempt_reasons.len() as u32,
        }
    }
}
