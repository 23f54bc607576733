//! Speech-to-text through the OpenAI transcription endpoint.

use crate::capture::Transcriber;
use crate::chat::OPENAI_BASE_URL;
use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Clone)]
pub struct WhisperClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    language: Option<String>,
}

impl WhisperClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: SecretString::from(api_key.to_string()),
            base_url: OPENAI_BASE_URL.to_string(),
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            language: Some("en".to_string()),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = language.map(str::to_string);
        self
    }

    /// Uploads an audio file as multipart form data and returns its text.
    pub async fn transcribe_file(
        &self,
        audio: Vec<u8>,
        filename: &str,
        mime: &str,
    ) -> Result<String> {
        if audio.is_empty() {
            anyhow::bail!("no audio to transcribe");
        }
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(mime)
            .context("invalid audio mime type")?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("transcription returned {}: {}", status, text);
        }
        let parsed = response
            .json::<TranscriptionResponse>()
            .await
            .context("unexpected transcription response")?;
        tracing::debug!(chars = parsed.text.len(), "audio transcribed");
        Ok(parsed.text)
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        self.transcribe_file(wav, "audio.wav", "audio/wav").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_audio_is_rejected_locally() {
        let client = WhisperClient::new("key").with_base_url("http://127.0.0.1:9");
        let err = client.transcribe(Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("no audio"));
    }

    #[test]
    fn response_text_is_extracted() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text":"Tell me about yourself."}"#).unwrap();
        assert_eq!(parsed.text, "Tell me about yourself.");
    }

    #[tokio::test]
    #[ignore = "calls the live transcription API"]
    async fn transcribes_a_silent_clip() {
        dotenvy::dotenv().ok();
        let key = std::env::var("OPENAI_API_KEY").unwrap();
        let wav = crate::capture::encode_wav(&vec![0.0; 16_000], 16_000).unwrap();
        let text = WhisperClient::new(&key).transcribe(wav).await.unwrap();
        println!("{text:?}");
    }
}
