use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use interview_core::chat::{ChatClient, ChatCompletion};
use interview_core::connector::CredentialProvider;
use interview_core::session_store::SessionStore;
use interview_core::transcribe::WhisperClient;
use interview_core::tts::{ElevenLabsClient, SpeechFormat, VoiceInfo};
use openai_realtime::SessionTokenClient;
use std::sync::Arc;

/// Speech-to-text with a per-request language hint.
#[async_trait]
pub trait AudioTranscription: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, language: Option<&str>) -> Result<String>;
}

#[async_trait]
impl AudioTranscription for WhisperClient {
    async fn transcribe(&self, audio: Vec<u8>, language: Option<&str>) -> Result<String> {
        // Browsers record webm/opus.
        self.clone()
            .with_language(language)
            .transcribe_file(audio, "audio.webm", "audio/webm")
            .await
    }
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn voices(&self) -> Result<Vec<VoiceInfo>>;

    async fn speak(&self, text: &str, voice_id: &str, model_id: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl SpeechService for ElevenLabsClient {
    async fn voices(&self) -> Result<Vec<VoiceInfo>> {
        self.list_voices().await
    }

    async fn speak(&self, text: &str, voice_id: &str, model_id: &str) -> Result<Vec<u8>> {
        self.clone()
            .with_model(model_id)
            .synthesize_with(text, voice_id, SpeechFormat::Mp3)
            .await
    }
}

/// Shared by every handler. Collaborators sit behind traits so the router
/// can be exercised in-process.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialProvider>,
    pub chat: Arc<dyn ChatCompletion>,
    pub transcription: Arc<dyn AudioTranscription>,
    /// `None` when no ElevenLabs key is configured.
    pub speech: Option<Arc<dyn SpeechService>>,
    pub sessions: SessionStore,
    pub suggestion_model: String,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let key = &config.openai_api_key;
        let speech = config
            .elevenlabs_api_key
            .as_deref()
            .map(|key| Arc::new(ElevenLabsClient::new(key)) as Arc<dyn SpeechService>);
        Self {
            credentials: Arc::new(SessionTokenClient::new(key).with_model(&config.realtime_model)),
            chat: Arc::new(ChatClient::new(key, &config.chat_model)),
            transcription: Arc::new(
                WhisperClient::new(key).with_model(&config.transcription_model),
            ),
            speech,
            sessions: SessionStore::new(),
            suggestion_model: config.suggestion_model.clone(),
        }
    }
}
