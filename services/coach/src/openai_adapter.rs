use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use interview_core::connector::{CredentialProvider, Dialer, EndpointCredentials};
use openai_realtime::SessionTokenClient;
use openai_realtime::types::audio::{InputAudioTranscription, Voice};
use openai_realtime::types::{Session, SessionConfigurator};
use std::sync::Arc;

/// Server-event fan-out capacity of the realtime client.
const REALTIME_EVENT_CAPACITY: usize = 1024;

pub const DEFAULT_INSTRUCTIONS: &str = "You are a professional job interviewer. \
     Greet the candidate, then ask one interview question at a time. \
     Listen to each answer, ask a short follow-up when it is vague, \
     and keep your own turns brief.";

/// Dials the realtime websocket with an ephemeral token.
pub struct OpenAIDialer;

#[async_trait]
impl Dialer for OpenAIDialer {
    type Client = openai_realtime::Client;

    async fn dial(&self, token: &str) -> Result<Self::Client> {
        let config = openai_realtime::Config::builder()
            .with_ephemeral_token(token)
            .build();
        openai_realtime::connect_with_config(REALTIME_EVENT_CAPACITY, config)
            .await
            .context("Failed to connect to OpenAI Realtime API")
    }
}

/// Credentials from `SESSION_ENDPOINT` when configured, otherwise issued
/// directly with the API key.
pub fn credentials(config: &Config) -> Arc<dyn CredentialProvider> {
    match &config.session_endpoint {
        Some(url) => {
            tracing::info!("Fetching realtime credentials from {}", url);
            Arc::new(EndpointCredentials::new(url))
        }
        None => Arc::new(SessionTokenClient::new(&config.openai_api_key)),
    }
}

/// Session settings sent after connecting: who the interviewer is, how it
/// sounds, and transcription of the candidate's speech.
pub fn interview_session(instructions: &str, voice: Voice) -> Session {
    SessionConfigurator::new()
        .with_modalities_enable_audio()
        .with_instructions(instructions)
        .with_voice(voice)
        .with_input_audio_transcription(InputAudioTranscription::new())
        .build()
}
