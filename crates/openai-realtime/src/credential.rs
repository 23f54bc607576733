use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};

use crate::client::consts::{DEFAULT_MODEL, OPENAI_API_KEY, REST_BASE_URL};
use crate::types::EphemeralSession;

/// Issues short-lived realtime session secrets with a long-lived API key.
#[derive(Clone)]
pub struct SessionTokenClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl SessionTokenClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: SecretString::from(api_key.to_string()),
            base_url: REST_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var(OPENAI_API_KEY).context("OPENAI_API_KEY must be set")?;
        Ok(Self::new(&key))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Raw provider response, passed through unchanged by the HTTP proxy.
    pub async fn create_raw(&self) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}/realtime/sessions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({ "model": self.model }))
            .send()
            .await
            .context("failed to reach realtime session endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("session endpoint returned {}: {}", status, body);
        }

        response
            .json::<serde_json::Value>()
            .await
            .context("failed to parse realtime session response")
    }

    pub async fn create(&self) -> Result<EphemeralSession> {
        let raw = self.create_raw().await?;
        serde_json::from_value(raw).context("unexpected realtime session response shape")
    }
}
