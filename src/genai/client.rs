use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{
    AudioHandle, FileResource, FileState, GenerateContentRequest, GenerateContentResponse,
    StartUploadFile, StartUploadRequest, UploadFileResponse,
};
use super::AnalysisService;
use crate::config::{GenAiConfig, RequestConfig};
use crate::error::{AnalysisServiceError, AnalysisServiceResult};

const WAV_MIME_TYPE: &str = "audio/wav";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_STATE_POLLS: u32 = 20;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Client for the Gemini REST API (file upload + generateContent)
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    request_config: RequestConfig,
    poll_interval: Duration,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &GenAiConfig, request_config: RequestConfig) -> AnalysisServiceResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout_ms) = request_config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder.build().map_err(AnalysisServiceError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            request_config,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the delay between file-state polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model identifier used for generate requests.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Upload a WAV file and wait until the service can use it.
    pub async fn upload_file(&self, path: &Path) -> AnalysisServiceResult<AudioHandle> {
        let start = Instant::now();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AnalysisServiceError::Audio {
                path: path.to_path_buf(),
                source,
            })?;

        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("recording.wav")
            .to_string();

        let upload_url = self.start_upload(&display_name, bytes.len()).await?;

        debug!(file = %display_name, bytes = bytes.len(), "Uploading audio");

        let response = self
            .client
            .post(&upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let uploaded: UploadFileResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AnalysisServiceError::InvalidResponse {
                message: format!("Failed to parse upload response: {}", e),
            })?;

        let file = self.wait_until_active(uploaded.file).await?;

        info!(
            file = %display_name,
            name = %file.name,
            latency_ms = start.elapsed().as_millis() as u64,
            "Audio uploaded"
        );

        Ok(file.into_handle(WAV_MIME_TYPE))
    }

    /// Start a resumable upload and return the session URL.
    async fn start_upload(&self, display_name: &str, len: usize) -> AnalysisServiceResult<String> {
        let url = format!("{}/upload/v1beta/files", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", len.to_string())
            .header("X-Goog-Upload-Header-Content-Type", WAV_MIME_TYPE)
            .json(&StartUploadRequest {
                file: StartUploadFile {
                    display_name: display_name.to_string(),
                },
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AnalysisServiceError::InvalidResponse {
                message: format!("Upload start response has no {} header", UPLOAD_URL_HEADER),
            })
    }

    /// Poll a freshly uploaded file until it leaves the PROCESSING state.
    async fn wait_until_active(&self, mut file: FileResource) -> AnalysisServiceResult<FileResource> {
        let mut polls = 0;

        loop {
            match file.state {
                None | Some(FileState::Active) | Some(FileState::StateUnspecified) => {
                    return Ok(file)
                }
                Some(FileState::Failed) => {
                    return Err(AnalysisServiceError::InvalidResponse {
                        message: format!("Service failed to process uploaded file {}", file.name),
                    })
                }
                Some(FileState::Processing) if polls >= MAX_STATE_POLLS => {
                    return Err(AnalysisServiceError::InvalidResponse {
                        message: format!(
                            "Uploaded file {} still processing after {} polls",
                            file.name, polls
                        ),
                    })
                }
                Some(FileState::Processing) => {
                    polls += 1;
                    debug!(name = %file.name, poll = polls, "Uploaded file still processing");
                    tokio::time::sleep(self.poll_interval).await;
                    file = self.get_file(&file.name).await?;
                }
            }
        }
    }

    async fn get_file(&self, name: &str) -> AnalysisServiceResult<FileResource> {
        let url = format!("{}/v1beta/{}", self.base_url, name);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AnalysisServiceError::InvalidResponse {
                message: format!("Failed to parse file resource: {}", e),
            })
    }

    /// Call generateContent with the given request
    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> AnalysisServiceResult<GenerateContentResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let start = Instant::now();

        let result = self.execute_generate(&url, request).await;
        let latency = start.elapsed();

        match &result {
            Ok(response) => info!(
                model = %self.model,
                latency_ms = latency.as_millis() as u64,
                total_tokens = response.usage_metadata.as_ref().map(|u| u.total_token_count),
                "Model call succeeded"
            ),
            Err(e) => error!(
                model = %self.model,
                error = %e,
                latency_ms = latency.as_millis() as u64,
                "Model call failed"
            ),
        }

        result
    }

    /// Execute a single request (internal)
    async fn execute_generate(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> AnalysisServiceResult<GenerateContentResponse> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AnalysisServiceError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AnalysisServiceError {
        match self.request_config.timeout_ms {
            Some(timeout_ms) if e.is_timeout() => AnalysisServiceError::Timeout { timeout_ms },
            _ => AnalysisServiceError::Http(e),
        }
    }
}

#[async_trait]
impl AnalysisService for GeminiClient {
    async fn upload_audio(&self, wav_path: &Path) -> AnalysisServiceResult<AudioHandle> {
        self.upload_file(wav_path).await
    }

    async fn generate(&self, audio: &AudioHandle, prompt: &str) -> AnalysisServiceResult<String> {
        let request = GenerateContentRequest::for_audio(prompt, audio)
            .with_json_output()
            .with_temperature(self.temperature);

        let response = self.generate_content(&request).await?;

        match response.text() {
            Some(text) => Ok(text),
            None => {
                let reason = response.block_reason().unwrap_or("no candidates returned");
                warn!(model = %self.model, reason, "Model returned no candidates");
                Err(AnalysisServiceError::InvalidResponse {
                    message: format!("Model returned no candidates: {}", reason),
                })
            }
        }
    }
}

/// Turn a non-success status into the matching error.
async fn check_status(response: Response) -> AnalysisServiceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(error_for_status(status, message))
}

fn error_for_status(status: StatusCode, message: String) -> AnalysisServiceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AnalysisServiceError::Authentication {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => AnalysisServiceError::QuotaExceeded { message },
        _ => AnalysisServiceError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
