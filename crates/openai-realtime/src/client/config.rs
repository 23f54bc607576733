use secrecy::SecretString;

use super::consts::{BASE_URL, DEFAULT_MODEL, OPENAI_API_KEY};

/// Connection settings for the realtime websocket.
///
/// The bearer token is either a long-lived API key or an ephemeral
/// `client_secret` issued for a single session.
pub struct Config {
    base_url: String,
    token: SecretString,
    model: String,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.token = SecretString::from(api_key.to_string());
        self
    }

    /// Authenticate with a short-lived session secret instead of the API key.
    pub fn with_ephemeral_token(self, token: &str) -> Self {
        self.with_api_key(token)
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            // An empty key fails at handshake time with a clear 401.
            token: std::env::var(OPENAI_API_KEY).unwrap_or_default().into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
