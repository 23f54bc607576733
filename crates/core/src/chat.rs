//! Chat-completion client, plain and streamed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const STREAM_MARKER_DONE: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the model for a JSON object.
    pub json_object: bool,
    /// Overrides the client's default model.
    pub model: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, ..Self::default() }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_json_object(mut self) -> Self {
        self.json_object = true;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Token(String),
    Done,
    Failed(String),
}

/// Tokens of one streamed completion. Only a `Done` item finalises it.
pub struct TokenStream {
    rx: mpsc::Receiver<StreamItem>,
}

impl TokenStream {
    pub fn channel(capacity: usize) -> (mpsc::Sender<StreamItem>, TokenStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, TokenStream { rx })
    }

    pub async fn next(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Accumulates tokens until the end marker.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(item) = self.next().await {
            match item {
                StreamItem::Token(token) => text.push_str(&token),
                StreamItem::Done => return Ok(text),
                StreamItem::Failed(e) => anyhow::bail!("completion stream failed: {}", e),
            }
        }
        anyhow::bail!("completion stream closed before the end marker")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Data(String),
    Done,
}

/// Splits a server-sent-events byte stream into `data:` frames.
///
/// Works on bytes so a multi-byte character split across chunks is decoded whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == STREAM_MARKER_DONE {
                frames.push(SseFrame::Done);
            } else if !data.is_empty() {
                frames.push(SseFrame::Data(data.to_string()));
            }
        }
        frames
    }
}

#[derive(Debug, Deserialize)]
struct LlmResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LlmChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Token text of one streamed chat-completion chunk, if any.
pub fn delta_content(data: &str) -> Option<String> {
    let chunk: LlmChunk = serde_json::from_str(data).ok()?;
    chunk.choices.into_iter().next()?.delta.content.filter(|c| !c.is_empty())
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    async fn complete_stream(&self, request: ChatRequest) -> Result<TokenStream>;
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: SecretString::from(api_key.to_string()),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": request.messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = temperature.into();
        }
        if request.json_object {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        if stream {
            body["stream"] = true.into();
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .context("chat completion request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completion returned {}: {}", status, text);
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatCompletion for ChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let response = self.post(&self.body(&request, false)).await?;
        let parsed = response
            .json::<LlmResponse>()
            .await
            .context("unexpected chat completion response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))
    }

    async fn complete_stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let response = self.post(&self.body(&request, true)).await?;
        let mut bytes = response.bytes_stream();
        let (tx, stream) = TokenStream::channel(64);

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(StreamItem::Failed(e.to_string())).await;
                        return;
                    }
                };
                for frame in decoder.push(&chunk) {
                    let item = match frame {
                        SseFrame::Done => StreamItem::Done,
                        SseFrame::Data(data) => match delta_content(&data) {
                            Some(token) => StreamItem::Token(token),
                            None => continue,
                        },
                    };
                    let done = item == StreamItem::Done;
                    if tx.send(item).await.is_err() || done {
                        return;
                    }
                }
            }
            // Falling out of the loop means the body ended without `[DONE]`.
            let _ = tx
                .send(StreamItem::Failed("stream ended before [DONE]".to_string()))
                .await;
        });

        Ok(stream)
    }
}
