use serde::{Deserialize, Serialize};

/// Reference to audio already uploaded to the model service.
///
/// Reused across the primary and the strict request for one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioHandle {
    /// Service-side resource name (e.g. `files/abc123`).
    pub name: String,
    /// URI to reference in generate requests.
    pub uri: String,
    pub mime_type: String,
}

/// Request body for `models/{model}:generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// A message in a generate request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

/// A content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    /// Plain text.
    Text { text: String },
    /// Reference to an uploaded file.
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

/// Uploaded file reference inside a part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// Generation parameters.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// `application/json` asks the service for JSON-only output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Response from `generateContent`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

/// A response candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

/// Content inside a candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

/// A candidate part; only text is relevant here.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

/// Why a prompt was blocked, if it was.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

/// Token usage metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

/// Metadata sent when starting an upload.
#[derive(Debug, Clone, Serialize)]
pub struct StartUploadRequest {
    pub file: StartUploadFile,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartUploadFile {
    pub display_name: String,
}

/// Envelope returned when an upload finalizes.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadFileResponse {
    pub file: FileResource,
}

/// A file resource held by the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub name: String,
    pub uri: String,
    pub mime_type: Option<String>,
    pub state: Option<FileState>,
}

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

impl GenerateContentRequest {
    /// Single user turn: prompt text followed by the uploaded audio.
    pub fn for_audio(prompt: impl Into<String>, audio: &AudioHandle) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: prompt.into(),
                    },
                    Part::FileData {
                        file_data: FileData {
                            mime_type: audio.mime_type.clone(),
                            file_uri: audio.uri.clone(),
                        },
                    },
                ],
            }],
            generation_config: None,
        }
    }

    /// Ask for JSON-only output.
    pub fn with_json_output(mut self) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .response_mime_type = Some("application/json".to_string());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        if let Some(t) = temperature {
            self.generation_config
                .get_or_insert_with(GenerationConfig::default)
                .temperature = Some(t);
        }
        self
    }
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, or `None` if there is no candidate.
    pub fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text = candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default();
        Some(text)
    }

    /// Block reason reported for the prompt, if any.
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

impl FileResource {
    /// Convert into the handle used by generate requests.
    pub fn into_handle(self, fallback_mime_type: &str) -> AudioHandle {
        AudioHandle {
            name: self.name,
            uri: self.uri,
            mime_type: self
                .mime_type
                .unwrap_or_else(|| fallback_mime_type.to_string()),
        }
    }
}
