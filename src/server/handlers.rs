use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::SharedState;
use crate::analysis::AnalysisOutcome;
use crate::error::{AppError, AppResult};

/// Multipart field carrying the audio.
const FILE_FIELD: &str = "file";

/// Response for a successful upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub sequence_id: u64,
    pub wav_filename: String,
    pub wav_path: String,
    pub duration_seconds: f64,
    pub message: String,
}

/// Body of an analyze request. Both fields are optional and may be null.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub wav_filename: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub count: usize,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// POST /api/upload-audio
pub async fn upload_audio(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((original_name, bytes));
        break;
    }

    let (original_name, bytes) = upload.ok_or_else(|| {
        AppError::invalid_input(format!("missing multipart field '{}'", FILE_FIELD))
    })?;
    debug!(file = %original_name, bytes = bytes.len(), "Upload received");

    let record = state.pipeline.ingest(&bytes, &original_name).await?;

    Ok(Json(UploadResponse {
        status: "ok".to_string(),
        sequence_id: record.sequence_id,
        message: format!("Saved and converted to {}", record.wav_filename),
        wav_filename: record.wav_filename,
        wav_path: record.wav_path,
        duration_seconds: (record.duration_seconds * 1000.0).round() / 1000.0,
    }))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            message: e.body_text(),
        }
    } else {
        AppError::invalid_input(format!("malformed multipart body: {}", e.body_text()))
    }
}

/// POST /api/analyze_with_genai
///
/// Parse failures are a normal 200 response with `status: "error"`.
pub async fn analyze_with_genai(
    State(state): State<SharedState>,
    request: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = request.map_err(|e| AppError::invalid_input(e.body_text()))?;
    let keywords = request.keywords.unwrap_or_default();

    let report = state
        .pipeline
        .analyze(request.wav_filename.as_deref(), &keywords)
        .await?;

    let body = match report.outcome {
        AnalysisOutcome::Ok {
            result,
            raw_text,
            attempts,
        } => json!({
            "status": "ok",
            "wav_filename": report.wav_filename,
            "result": result,
            "raw_text": raw_text,
            "attempts": attempts,
        }),
        AnalysisOutcome::Failed {
            raw_text,
            reason,
            attempt_reasons,
        } => json!({
            "status": "error",
            "error": {
                "kind": "parse_error",
                "message": reason,
            },
            "wav_filename": report.wav_filename,
            "raw_text": raw_text,
            "attempt_reasons": attempt_reasons,
        }),
    };

    Ok(Json(body).into_response())
}

/// GET /api/list
pub async fn list_files(State(state): State<SharedState>) -> AppResult<Json<ListResponse>> {
    let files = state.pipeline.list().await?;
    Ok(Json(ListResponse {
        count: files.len(),
        files,
    }))
}

/// GET /health
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
