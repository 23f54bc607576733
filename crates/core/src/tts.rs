//! Text-to-speech through ElevenLabs.

use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";
const ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";

/// Encoding of synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechFormat {
    /// Raw 16-bit little-endian mono at 24kHz, ready for local playback.
    #[default]
    Pcm24k,
    Mp3,
}

impl SpeechFormat {
    pub fn output_format(self) -> &'static str {
        match self {
            SpeechFormat::Pcm24k => "pcm_24000",
            SpeechFormat::Mp3 => "mp3_44100_128",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            SpeechFormat::Pcm24k => "audio/pcm",
            SpeechFormat::Mp3 => "audio/mpeg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoiceList {
    voices: Vec<VoiceInfo>,
}

fn is_audio_content_type(content_type: &str) -> bool {
    content_type.starts_with("audio/") || content_type.starts_with("application/octet-stream")
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    voice_id: String,
    model_id: String,
    format: SpeechFormat,
    settings: VoiceSettings,
}

impl ElevenLabsClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: SecretString::from(api_key.to_string()),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            format: SpeechFormat::default(),
            settings: VoiceSettings::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let key = std::env::var(ELEVENLABS_API_KEY)
            .with_context(|| format!("{} is not set", ELEVENLABS_API_KEY))?;
        Ok(Self::new(&key))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_voice(mut self, voice_id: &str) -> Self {
        self.voice_id = voice_id.to_string();
        self
    }

    pub fn with_model(mut self, model_id: &str) -> Self {
        self.model_id = model_id.to_string();
        self
    }

    pub fn with_format(mut self, format: SpeechFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> SpeechFormat {
        self.format
    }

    fn synthesis_url(&self, voice_id: &str, format: SpeechFormat) -> String {
        format!(
            "{}/text-to-speech/{}?output_format={}",
            self.base_url,
            voice_id,
            format.output_format()
        )
    }

    /// Synthesizes with an explicit voice and format instead of the client defaults.
    pub async fn synthesize_with(
        &self,
        text: &str,
        voice_id: &str,
        format: SpeechFormat,
    ) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            anyhow::bail!("nothing to synthesize");
        }
        let body = SynthesisBody {
            text,
            model_id: &self.model_id,
            voice_settings: &self.settings,
        };
        let response = self
            .http
            .post(self.synthesis_url(voice_id, format))
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", format.content_type())
            .json(&body)
            .send()
            .await
            .context("text-to-speech request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("text-to-speech returned {}: {}", status, text);
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_audio_content_type(&content_type) {
            anyhow::bail!("text-to-speech returned non-audio content '{}'", content_type);
        }
        let audio = response.bytes().await.context("reading synthesized audio")?;
        tracing::debug!(bytes = audio.len(), voice_id, "speech synthesized");
        Ok(audio.to_vec())
    }

    pub async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let response = self
            .http
            .get(format!("{}/voices", self.base_url))
            .header("xi-api-key", self.api_key.expose_secret())
            .send()
            .await
            .context("voice list request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("voice list returned {}", status);
        }
        let list = response.json::<VoiceList>().await.context("unexpected voice list")?;
        Ok(list.voices)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.synthesize_with(text, &self.voice_id, self.format).await
    }
}
