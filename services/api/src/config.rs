use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub elevenlabs_api_key: Option<String>,
    pub realtime_model: String,
    pub chat_model: String,
    pub suggestion_model: String,
    pub transcription_model: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    /// *   `OPENAI_API_KEY`: Your secret key for the OpenAI API. Required.
    /// *   `ELEVENLABS_API_KEY`: (Optional) Enables the text-to-speech routes.
    /// *   `REALTIME_MODEL`: (Optional) Model for issued realtime sessions.
    /// *   `CHAT_MODEL`: (Optional) Model behind `/api/chat`. Defaults to "gpt-4o".
    /// *   `SUGGESTION_MODEL`: (Optional) Model behind `/api/generate-suggestion`. Defaults to "gpt-4o-mini".
    /// *   `TRANSCRIPTION_MODEL`: (Optional) Defaults to "whisper-1".
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let bind_address_str = var("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let elevenlabs_api_key = lookup("ELEVENLABS_API_KEY").filter(|key| !key.trim().is_empty());

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            elevenlabs_api_key,
            realtime_model: var("REALTIME_MODEL", "gpt-4o-realtime-preview-2025-06-03"),
            chat_model: var("CHAT_MODEL", "gpt-4o"),
            suggestion_model: var("SUGGESTION_MODEL", "gpt-4o-mini"),
            transcription_model: var("TRANSCRIPTION_MODEL", "whisper-1"),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.suggestion_model, "gpt-4o-mini");
        assert_eq!(config.transcription_model, "whisper-1");
        assert!(config.elevenlabs_api_key.is_none());
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn missing_openai_key_is_rejected() {
        let result = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")]));
        assert!(matches!(result, Err(ConfigError::MissingVar(name)) if name == "OPENAI_API_KEY"));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let result = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("BIND_ADDRESS", "not-an-address"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "BIND_ADDRESS"));

        let result = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("RUST_LOG", "chatty"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "RUST_LOG"));
    }
}
