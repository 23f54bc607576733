//! Application Configuration Module
//!
//! Loads the coach's settings from environment variables: API keys, models,
//! and the timings of the suggestion pipeline.

use interview_core::config::CoachingConfig;
use std::env;
use std::time::Duration;
use tracing::Level;

// --- Application Constants ---

/// The size of each audio chunk sent from the microphone input stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// How much interviewer audio the output buffer can hold ahead of playback.
pub const OUTPUT_BUFFER_SECS: usize = 30;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub elevenlabs_api_key: Option<String>,
    /// When set, realtime credentials come from this URL instead of being issued here.
    pub session_endpoint: Option<String>,
    pub chat_model: String,
    pub suggestion_model: String,
    pub log_level: Level,
    pub coaching: CoachingConfig,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `OPENAI_API_KEY`: Required.
    // *   `ELEVENLABS_API_KEY`: Required for the voice interviewer.
    // *   `SESSION_ENDPOINT`: (Optional) e.g. "http://localhost:3000/api/session".
    // *   `CHAT_MODEL`: (Optional) Defaults to "gpt-4o".
    // *   `SUGGESTION_MODEL`: (Optional) Defaults to "gpt-4o-mini".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    // *   `SETTLE_DELAY_MS`, `SUGGESTION_COOLDOWN_MS`, `SUGGESTION_DELAY_MS`,
    //     `CAPTURE_WINDOW_MS`, `MIN_TRANSCRIPT_CHARS`, `MIN_QUESTION_CHARS`: pipeline timings.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let openai_api_key = non_empty("OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let defaults = CoachingConfig::default();
        let millis = |name: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_number(&lookup, name)?.map_or(default, Duration::from_millis))
        };
        let chars = |name: &str, default: usize| -> Result<usize, ConfigError> {
            Ok(parse_number(&lookup, name)?.map_or(default, |n| n as usize))
        };
        let coaching = CoachingConfig::default()
            .with_settle_delay(millis("SETTLE_DELAY_MS", defaults.settle_delay)?)
            .with_cooldown(millis("SUGGESTION_COOLDOWN_MS", defaults.cooldown)?)
            .with_suggestion_delay(millis("SUGGESTION_DELAY_MS", defaults.suggestion_delay)?)
            .with_capture_window(millis("CAPTURE_WINDOW_MS", defaults.capture_window)?)
            .with_min_transcript_chars(chars("MIN_TRANSCRIPT_CHARS", defaults.min_transcript_chars)?)
            .with_min_question_chars(chars("MIN_QUESTION_CHARS", defaults.min_question_chars)?);

        Ok(Self {
            openai_api_key,
            elevenlabs_api_key: non_empty("ELEVENLABS_API_KEY"),
            session_endpoint: non_empty("SESSION_ENDPOINT"),
            chat_model: non_empty("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            suggestion_model: non_empty("SUGGESTION_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            log_level,
            coaching,
        })
    }
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
