use std::env;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub genai: GenAiConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub audio: AudioConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Generative model service configuration
#[derive(Debug, Clone)]
pub struct GenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f64>,
}

/// Upload directory layout
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    /// Keep the raw upload after a successful conversion.
    pub retain_raw_uploads: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Audio conversion configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub ffmpeg_path: String,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    /// Allowed CORS origins; empty means any origin.
    pub cors_allow_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration for the model service
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Transport deadline; `None` leaves the deadline to the caller.
    pub timeout_ms: Option<u64>,
}

pub const DEFAULT_GENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GENAI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Config {
                message: "GEMINI_API_KEY is required".to_string(),
            })?;

        let genai = GenAiConfig {
            api_key,
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GENAI_BASE_URL.to_string()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GENAI_MODEL.to_string()),
            temperature: env::var("GEMINI_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok()),
        };

        let storage = StorageConfig {
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            ),
            retain_raw_uploads: env::var("RETAIN_RAW_UPLOADS")
                .map(|s| parse_bool(&s))
                .unwrap_or(false),
        };

        let database = DatabaseConfig {
            path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| DatabaseConfig::default_path(&storage.upload_dir)),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let audio = AudioConfig {
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        };

        let server = ServerConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            cors_allow_origins: env::var("CORS_ALLOW_ORIGINS")
                .map(|s| parse_origins(&s))
                .unwrap_or_default(),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|ms| *ms > 0),
        };

        Ok(Config {
            genai,
            storage,
            database,
            audio,
            server,
            logging,
            request,
        })
    }

    /// Point uploads at a different directory, moving the default database with it.
    pub fn with_upload_dir(mut self, upload_dir: impl Into<PathBuf>) -> Self {
        let old_default = DatabaseConfig::default_path(&self.storage.upload_dir);
        self.storage.upload_dir = upload_dir.into();
        if self.database.path == old_default {
            self.database.path = DatabaseConfig::default_path(&self.storage.upload_dir);
        }
        self
    }
}

impl StorageConfig {
    /// Directory holding raw uploads as received.
    pub fn raw_dir(&self) -> PathBuf {
        self.upload_dir.join("raw")
    }

    /// Directory holding converted WAV files.
    pub fn wav_dir(&self) -> PathBuf {
        self.upload_dir.join("wav")
    }
}

impl DatabaseConfig {
    /// Default database location inside the upload directory.
    pub fn default_path(upload_dir: &Path) -> PathBuf {
        upload_dir.join(".state").join("speech.db")
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "*")
        .map(str::to_string)
        .collect()
}
