use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid request: {message}")]
    InvalidInput { message: String },

    #[error("Payload too large: {message}")]
    PayloadTooLarge { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Sequence counter error: {0}")]
    Counter(#[from] CounterError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Analysis service error: {0}")]
    AnalysisService(#[from] AnalysisFailure),
}

/// Sequence counter errors
#[derive(Debug, Error)]
pub enum CounterError {
    /// Persisted state exists but cannot be interpreted. Never reset.
    #[error("Sequence state is corrupt: {message}")]
    Corruption { message: String },

    #[error("Sequence state unavailable: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Sequence update interrupted: {message}")]
    Interrupted { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Invalid filename: {filename}")]
    InvalidFilename { filename: String },

    #[error("No such file: {filename}")]
    NotFound { filename: String },

    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Audio conversion errors
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {diagnostics}")]
    Failed {
        program: String,
        status: i32,
        diagnostics: String,
    },

    #[error("{program} produced no output file: {diagnostics}")]
    MissingOutput {
        program: String,
        diagnostics: String,
    },

    #[error("Converted audio is not a readable WAV: {message}")]
    InvalidWav { message: String },

    #[error("Conversion workspace error: {0}")]
    Io(#[from] std::io::Error),
}

/// External model service errors
#[derive(Debug, Error)]
pub enum AnalysisServiceError {
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Authentication rejected ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Audio file unreadable at {}: {source}", path.display())]
    Audio {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Model service failure during an analysis, with any model output that
/// arrived before it.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct AnalysisFailure {
    #[source]
    pub source: AnalysisServiceError,
    /// Raw text of the last response received before the failure.
    pub raw_text: Option<String>,
    /// Parse failure reasons of the attempts that did get a response.
    pub attempt_reasons: Vec<String>,
}

impl From<AnalysisServiceError> for AnalysisFailure {
    fn from(source: AnalysisServiceError) -> Self {
        Self {
            source,
            raw_text: None,
            attempt_reasons: Vec::new(),
        }
    }
}

/// Model output that does not match the analysis schema.
///
/// The display strings double as the human-readable failure reasons
/// returned to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("no JSON object found")]
    NoJsonObject,

    #[error("missing field: {path}")]
    MissingField { path: String },

    #[error("invalid field: {path} (expected {expected})")]
    InvalidField { path: String, expected: String },
}

impl AppError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config { .. } => "config_error",
            AppError::InvalidInput { .. } => "invalid_request",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::NotFound { .. } | AppError::Storage(StorageError::NotFound { .. }) => {
                "not_found"
            }
            AppError::Counter(CounterError::Corruption { .. }) => "counter_corruption",
            AppError::Counter(_) => "counter_error",
            AppError::Storage(StorageError::InvalidFilename { .. }) => "invalid_filename",
            AppError::Storage(_) => "storage_error",
            AppError::Conversion(_) => "conversion_error",
            AppError::AnalysisService(_) => "analysis_service_error",
        }
    }

    /// HTTP status used when this error reaches the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage(StorageError::InvalidFilename { .. }) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } | AppError::Storage(StorageError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            AppError::Conversion(ConversionError::Failed { .. })
            | AppError::Conversion(ConversionError::MissingOutput { .. })
            | AppError::Conversion(ConversionError::InvalidWav { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::AnalysisService(failure) => match failure.source {
                AnalysisServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound {
            message: message.into(),
        }
    }

    /// Shorthand for a caller error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "Request rejected");
        }

        let mut body = json!({
            "status": "error",
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        if let AppError::AnalysisService(AnalysisFailure {
            raw_text: Some(raw_text),
            attempt_reasons,
            ..
        }) = &self
        {
            body["raw_text"] = json!(raw_text);
            body["attempt_reasons"] = json!(attempt_reasons);
        }

        (status, Json(body)).into_response()
    }
}

impl From<AnalysisServiceError> for AppError {
    fn from(e: AnalysisServiceError) -> Self {
        AppError::AnalysisService(e.into())
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for sequence counter operations
pub type CounterResult<T> = Result<T, CounterError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for audio conversion
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Result type alias for model service calls
pub type AnalysisServiceResult<T> = Result<T, AnalysisServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::not_found("no wav files available");
        assert_eq!(err.to_string(), "Not found: no wav files available");
    }

    #[test]
    fn test_parse_error_reasons() {
        assert_eq!(ParseError::NoJsonObject.to_string(), "no JSON object found");

        let err = ParseError::MissingField {
            path: "scores.fluency".to_string(),
        };
        assert_eq!(err.to_string(), "missing field: scores.fluency");

        let err = ParseError::InvalidField {
            path: "scores.tone".to_string(),
            expected: "string".to_string(),
        };
        assert_eq!(err.to_string(), "invalid field: scores.tone (expected string)");
    }

    #[test]
    fn test_conversion_error_display() {
        let err = ConversionError::Failed {
            program: "ffmpeg".to_string(),
            status: 1,
            diagnostics: "Invalid data found when processing input".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ffmpeg exited with status 1: Invalid data found when processing input"
        );
    }

    #[test]
    fn test_analysis_service_error_display() {
        let err = AnalysisServiceError::Api {
            status: 500,
            message: "internal".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 500 - internal");

        let err = AnalysisServiceError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_error_kinds_are_stable() {
        let err: AppError = CounterError::Corruption {
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "counter_corruption");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: AppError = StorageError::InvalidFilename {
            filename: "../x.wav".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "invalid_filename");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::PayloadTooLarge {
            message: "length limit exceeded".to_string(),
        };
        assert_eq!(err.kind(), "payload_too_large");
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = AppError::not_found("gone");
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: AppError = AnalysisServiceError::QuotaExceeded {
            message: "slow down".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "analysis_service_error");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_conversion_failures_are_client_errors() {
        let err: AppError = ConversionError::Failed {
            program: "ffmpeg".to_string(),
            status: 1,
            diagnostics: String::new(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let err: AppError = ConversionError::Spawn {
            program: "ffmpeg".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_analysis_failure_keeps_earlier_output() {
        let failure = AnalysisFailure {
            source: AnalysisServiceError::Timeout { timeout_ms: 100 },
            raw_text: Some("prose".to_string()),
            attempt_reasons: vec!["no JSON object found".to_string()],
        };
        assert_eq!(failure.to_string(), "Request timeout after 100ms");

        let err: AppError = failure.into();
        assert_eq!(err.kind(), "analysis_service_error");
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            err.to_string(),
            "Analysis service error: Request timeout after 100ms"
        );
    }

    #[test]
    fn test_counter_error_conversion_to_app_error() {
        let err = CounterError::Corruption {
            message: "x".to_string(),
        };
        let app_err: AppError = err.into();
        assert!(matches!(app_err, AppError::Counter(_)));
    }
}
