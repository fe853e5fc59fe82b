//! Config environment variable tests
//!
//! These tests verify that Config::from_env() reads and applies environment
//! variable overrides. Tests use #[serial] to prevent races on shared env vars.

use speech_scorer::config::{Config, LogFormat, DEFAULT_GENAI_MODEL, DEFAULT_MAX_UPLOAD_BYTES};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

const VARS: &[&str] = &[
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "GEMINI_MODEL",
    "GEMINI_BASE_URL",
    "GEMINI_TEMPERATURE",
    "REQUEST_TIMEOUT_MS",
    "UPLOAD_DIR",
    "RETAIN_RAW_UPLOADS",
    "DATABASE_PATH",
    "DATABASE_MAX_CONNECTIONS",
    "FFMPEG_PATH",
    "BIND_ADDR",
    "MAX_UPLOAD_BYTES",
    "CORS_ALLOW_ORIGINS",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults() {
    clear_env();
    env::set_var("GEMINI_API_KEY", "test-key");

    let config = Config::from_env().unwrap();
    assert_eq!(config.genai.api_key, "test-key");
    assert_eq!(config.genai.model, DEFAULT_GENAI_MODEL);
    assert_eq!(config.genai.temperature, None);
    assert_eq!(config.request.timeout_ms, None);
    assert_eq!(config.storage.upload_dir, PathBuf::from("./uploads"));
    assert!(!config.storage.retain_raw_uploads);
    assert_eq!(
        config.database.path,
        PathBuf::from("./uploads/.state/speech.db")
    );
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.audio.ffmpeg_path, "ffmpeg");
    assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
    assert_eq!(config.server.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    assert!(config.server.cors_allow_origins.is_empty());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);

    clear_env();
}

#[test]
#[serial]
fn test_missing_api_key_is_config_error() {
    clear_env();

    let err = Config::from_env().unwrap_err();
    assert_eq!(err.kind(), "config_error");
}

#[test]
#[serial]
fn test_google_api_key_fallback() {
    clear_env();
    env::set_var("GOOGLE_API_KEY", "fallback-key");

    let config = Config::from_env().unwrap();
    assert_eq!(config.genai.api_key, "fallback-key");

    clear_env();
}

#[test]
#[serial]
fn test_overrides() {
    clear_env();
    env::set_var("GEMINI_API_KEY", "test-key");
    env::set_var("GEMINI_MODEL", "gemini-2.5-pro");
    env::set_var("GEMINI_BASE_URL", "http://127.0.0.1:9999");
    env::set_var("GEMINI_TEMPERATURE", "0.2");
    env::set_var("REQUEST_TIMEOUT_MS", "15000");
    env::set_var("UPLOAD_DIR", "/srv/speech");
    env::set_var("RETAIN_RAW_UPLOADS", "true");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");
    env::set_var("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg");
    env::set_var("BIND_ADDR", "127.0.0.1:8080");
    env::set_var("MAX_UPLOAD_BYTES", "1048576");
    env::set_var("CORS_ALLOW_ORIGINS", "http://localhost:5173,https://app.example.com");
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.genai.model, "gemini-2.5-pro");
    assert_eq!(config.genai.base_url, "http://127.0.0.1:9999");
    assert_eq!(config.genai.temperature, Some(0.2));
    assert_eq!(config.request.timeout_ms, Some(15000));
    assert_eq!(config.storage.upload_dir, PathBuf::from("/srv/speech"));
    assert!(config.storage.retain_raw_uploads);
    assert_eq!(
        config.database.path,
        PathBuf::from("/srv/speech/.state/speech.db")
    );
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.audio.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
    assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
    assert_eq!(config.server.max_upload_bytes, 1_048_576);
    assert_eq!(
        config.server.cors_allow_origins,
        vec!["http://localhost:5173", "https://app.example.com"]
    );
    assert_eq!(config.logging.format, LogFormat::Json);

    clear_env();
}

#[test]
#[serial]
fn test_unparseable_numbers_fall_back_to_defaults() {
    clear_env();
    env::set_var("GEMINI_API_KEY", "test-key");
    env::set_var("DATABASE_MAX_CONNECTIONS", "many");
    env::set_var("MAX_UPLOAD_BYTES", "-1");
    env::set_var("REQUEST_TIMEOUT_MS", "0");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.server.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    assert_eq!(config.request.timeout_ms, None);

    clear_env();
}

#[test]
#[serial]
fn test_upload_dir_override_moves_default_database() {
    clear_env();
    env::set_var("GEMINI_API_KEY", "test-key");

    let config = Config::from_env().unwrap().with_upload_dir("/tmp/other");
    assert_eq!(config.storage.upload_dir, PathBuf::from("/tmp/other"));
    assert_eq!(
        config.database.path,
        PathBuf::from("/tmp/other/.state/speech.db")
    );

    env::set_var("DATABASE_PATH", "/var/lib/speech.db");
    let config = Config::from_env().unwrap().with_upload_dir("/tmp/other");
    assert_eq!(config.database.path, PathBuf::from("/var/lib/speech.db"));

    clear_env();
}
