use crate::error::{ApiError, ELEVENLABS_KEY_MISSING};
use crate::state::AppState;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use bytes::Bytes;
use futures_util::Stream;
use interview_core::chat::{ChatMessage, ChatRequest, StreamItem, TokenStream};
use interview_core::session_store::{InterviewRecord, SessionConfig};
use interview_core::transcript::Role;
use interview_core::tts::{DEFAULT_MODEL_ID, DEFAULT_VOICE_ID};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::convert::Infallible;

const CHAT_MAX_TOKENS: u32 = 1000;
const CHAT_TEMPERATURE: f32 = 0.7;
const SUGGESTION_MAX_TOKENS: u32 = 400;
const SUGGESTION_FALLBACK: &str = "I would provide a thoughtful response based on my experience.";
const STREAM_DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub audio: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub messages: Option<Value>,
    #[serde(default)]
    pub stream: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionBody {
    pub context: Option<String>,
    pub candidate_info: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeechBody {
    pub text: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    #[serde(default)]
    pub candidate_info: String,
    #[serde(default)]
    pub config: SessionConfig,
}

#[derive(Debug, Deserialize)]
pub struct AddMessageBody {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<InterviewRecord>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/session
/// Issues an ephemeral realtime credential; the provider JSON is passed through.
pub async fn issue_session(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let session = state
        .credentials
        .fetch()
        .await
        .map_err(ApiError::upstream("Internal Server Error"))?;
    tracing::info!("realtime session issued");
    Ok(Json(session))
}

/// POST /api/transcribe
pub async fn transcribe(
    State(state): State<AppState>,
    Json(req): Json<TranscribeRequest>,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let audio = req
        .audio
        .filter(|audio| !audio.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing audio data"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(audio.as_bytes())
        .map_err(|e| ApiError::BadRequest {
            error: "Invalid audio data",
            details: Some(e.to_string()),
        })?;

    let text = state
        .transcription
        .transcribe(bytes, req.language.as_deref())
        .await
        .map_err(ApiError::upstream("Failed to transcribe audio"))?;
    Ok(Json(TranscribeResponse {
        text,
        language: req.language,
    }))
}

/// POST /api/chat
/// Plain JSON reply, or `data: {"text": ..}` frames ending with `data: [DONE]`.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Response, ApiError> {
    let messages = body
        .messages
        .and_then(|messages| serde_json::from_value::<Vec<ChatMessage>>(messages).ok())
        .ok_or_else(|| ApiError::bad_request("Messages array is required"))?;
    let request = ChatRequest::new(messages)
        .with_max_tokens(body.max_tokens.unwrap_or(CHAT_MAX_TOKENS))
        .with_temperature(body.temperature.unwrap_or(CHAT_TEMPERATURE));

    if !body.stream {
        let content = state
            .chat
            .complete(request)
            .await
            .map_err(ApiError::upstream("Internal server error"))?;
        return Ok(Json(json!({ "message": ChatMessage::assistant(content) })).into_response());
    }

    let tokens = state
        .chat
        .complete_stream(request)
        .await
        .map_err(ApiError::upstream("Internal server error"))?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream_frames(tokens)),
    )
        .into_response())
}

fn token_frame(text: &str) -> Bytes {
    Bytes::from(format!("data: {}\n\n", json!({ "text": text })))
}

/// A stream that fails upstream ends without the `[DONE]` frame, so the
/// browser never mistakes a truncated reply for a complete one.
fn stream_frames(tokens: TokenStream) -> impl Stream<Item = Result<Bytes, Infallible>> {
    futures_util::stream::unfold(Some(tokens), |state| async move {
        let mut tokens = state?;
        match tokens.next().await? {
            StreamItem::Token(text) => Some((Ok(token_frame(&text)), Some(tokens))),
            StreamItem::Done => Some((Ok(Bytes::from_static(STREAM_DONE_FRAME)), None)),
            StreamItem::Failed(e) => {
                tracing::warn!("chat stream failed mid-response: {}", e);
                None
            }
        }
    })
}

/// POST /api/generate-suggestion
pub async fn generate_suggestion(
    State(state): State<AppState>,
    Json(body): Json<SuggestionBody>,
) -> Result<Json<Value>, ApiError> {
    let context = body
        .context
        .filter(|context| !context.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Context is required"))?;
    let candidate = body
        .candidate_info
        .filter(|info| !info.trim().is_empty())
        .unwrap_or_else(|| "professional candidate".to_string());

    let request = ChatRequest::new(vec![
        ChatMessage::system(format!(
            "You are an AI assistant helping a {}. Based on the conversation context, \
             provide 2-3 helpful response suggestions that the candidate could use. \
             Keep responses concise and professional.",
            candidate
        )),
        ChatMessage::user(format!(
            "Context: {}\n\nGenerate 2-3 helpful response suggestions:",
            context
        )),
    ])
    .with_model(&state.suggestion_model)
    .with_max_tokens(SUGGESTION_MAX_TOKENS)
    .with_temperature(CHAT_TEMPERATURE);

    let content = state
        .chat
        .complete(request)
        .await
        .map_err(ApiError::upstream("Failed to generate suggestion"))?;
    let content = if content.trim().is_empty() {
        SUGGESTION_FALLBACK.to_string()
    } else {
        content
    };
    Ok(Json(json!({ "suggestions": split_suggestions(&content) })))
}

/// One suggestion per non-empty line, without leading "1. " numbering.
pub fn split_suggestions(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let unnumbered = line.trim_start_matches(|c: char| c.is_ascii_digit());
            match unnumbered.strip_prefix('.') {
                Some(rest) if unnumbered.len() < line.len() => rest.trim().to_string(),
                _ => line.to_string(),
            }
        })
        .collect()
}

/// POST /api/responses
/// `{ model, input }` runs a JSON-object completion (guardrail checks);
/// anything else must carry `text` and is echoed back.
pub async fn responses(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if let (Some(model), Some(input)) = (body["model"].as_str(), body.get("input")) {
        let messages = serde_json::from_value::<Vec<ChatMessage>>(input.clone())
            .map_err(|e| ApiError::BadRequest {
                error: "Invalid 'input' messages",
                details: Some(e.to_string()),
            })?;
        let request = ChatRequest::new(messages).with_model(model).with_json_object();
        let content = state
            .chat
            .complete(request)
            .await
            .map_err(ApiError::upstream("Internal server error"))?;
        let parsed: Value = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("model returned non-JSON content: {}", e))
            .map_err(ApiError::upstream("Internal server error"))?;
        return Ok(Json(json!({ "output_parsed": parsed })));
    }

    let text = body["text"]
        .as_str()
        .ok_or_else(|| ApiError::bad_request("Missing or invalid 'text' field"))?;
    let mut echoed = json!({ "text": text });
    for field in ["audio", "metadata"] {
        if let Some(value) = body.get(field).filter(|v| !v.is_null()) {
            echoed[field] = value.clone();
        }
    }
    Ok(Json(echoed))
}

/// GET /api/elevenlabs
pub async fn list_voices(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let speech = state
        .speech
        .as_ref()
        .ok_or(ApiError::Misconfigured(ELEVENLABS_KEY_MISSING))?;
    let voices = speech.voices().await.map_err(ApiError::upstream(
        "Internal server error while fetching voices from ElevenLabs API",
    ))?;
    Ok(Json(json!({ "voices": voices })))
}

/// POST /api/elevenlabs
pub async fn synthesize(
    State(state): State<AppState>,
    Json(body): Json<SpeechBody>,
) -> Result<Response, ApiError> {
    let text = body
        .text
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Text is required"))?;
    let speech = state
        .speech
        .as_ref()
        .ok_or(ApiError::Misconfigured(ELEVENLABS_KEY_MISSING))?;

    let voice_id = body.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID);
    let model_id = body.model_id.as_deref().unwrap_or(DEFAULT_MODEL_ID);
    let audio = speech
        .speak(&text, voice_id, model_id)
        .await
        .map_err(ApiError::upstream("Failed to generate speech from ElevenLabs API"))?;
    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        audio,
    )
        .into_response())
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> impl IntoResponse {
    let record = state.sessions.create(&body.candidate_info, body.config).await;
    (StatusCode::CREATED, Json(record))
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    Json(SessionList {
        sessions: state.sessions.list().await,
    })
}

/// GET /api/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InterviewRecord>, ApiError> {
    state
        .sessions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", id)))
}

/// POST /api/sessions/{id}/messages
pub async fn add_session_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AddMessageBody>,
) -> Result<Json<InterviewRecord>, ApiError> {
    let record = state
        .sessions
        .add_message(&id, body.role, &body.content)
        .await?;
    Ok(Json(record))
}

/// POST /api/sessions/{id}/complete
pub async fn complete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InterviewRecord>, ApiError> {
    Ok(Json(state.sessions.complete(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use crate::state::{AudioTranscription, SpeechService};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::Router;
    use axum::http::Request;
    use interview_core::chat::ChatCompletion;
    use interview_core::connector::CredentialProvider;
    use interview_core::session_store::SessionStore;
    use interview_core::tts::VoiceInfo;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    struct FakeCredentials(Option<Value>);

    #[async_trait]
    impl CredentialProvider for FakeCredentials {
        async fn fetch(&self) -> Result<Value> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("provider unreachable"))
        }
    }

    #[derive(Default)]
    struct FakeChat {
        reply: String,
        tokens: Vec<StreamItem>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatCompletion for FakeChat {
        async fn complete(&self, request: ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }

        async fn complete_stream(&self, request: ChatRequest) -> Result<TokenStream> {
            self.requests.lock().unwrap().push(request);
            let (tx, stream) = TokenStream::channel(self.tokens.len().max(1));
            for item in &self.tokens {
                tx.try_send(item.clone())?;
            }
            Ok(stream)
        }
    }

    struct FakeTranscription;

    #[async_trait]
    impl AudioTranscription for FakeTranscription {
        async fn transcribe(&self, audio: Vec<u8>, language: Option<&str>) -> Result<String> {
            Ok(format!("{} bytes in {}", audio.len(), language.unwrap_or("auto")))
        }
    }

    struct FakeSpeech;

    #[async_trait]
    impl SpeechService for FakeSpeech {
        async fn voices(&self) -> Result<Vec<VoiceInfo>> {
            Ok(vec![VoiceInfo {
                voice_id: "v1".to_string(),
                name: "Rachel".to_string(),
                category: None,
            }])
        }

        async fn speak(&self, text: &str, voice_id: &str, _model_id: &str) -> Result<Vec<u8>> {
            Ok(format!("{}:{}", voice_id, text).into_bytes())
        }
    }

    fn state(chat: Arc<FakeChat>) -> AppState {
        AppState {
            credentials: Arc::new(FakeCredentials(Some(json!({
                "id": "sess_1",
                "client_secret": { "value": "ek_123", "expires_at": 1 }
            })))),
            chat,
            transcription: Arc::new(FakeTranscription),
            speech: Some(Arc::new(FakeSpeech)),
            sessions: SessionStore::new(),
            suggestion_model: "gpt-4o-mini".to_string(),
        }
    }

    fn app() -> Router {
        create_router(state(Arc::new(FakeChat::default())))
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    fn json_of(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn session_route_passes_provider_json_through() {
        let (status, body) = call(app(), "GET", "/api/session", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["client_secret"]["value"], "ek_123");
    }

    #[tokio::test]
    async fn session_route_hides_provider_failures() {
        let mut state = state(Arc::new(FakeChat::default()));
        state.credentials = Arc::new(FakeCredentials(None));

        let (status, body) = call(create_router(state), "GET", "/api/session", None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(&body), json!({ "error": "Internal Server Error" }));
    }

    #[tokio::test]
    async fn transcribe_validates_audio() {
        let (status, body) = call(app(), "POST", "/api/transcribe", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["error"], "Missing audio data");

        let (status, body) =
            call(app(), "POST", "/api/transcribe", Some(json!({ "audio": "%%%" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_of(&body)["details"].is_string());
    }

    #[tokio::test]
    async fn transcribe_returns_text_and_language() {
        let audio = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3, 4]);

        let (status, body) = call(
            app(),
            "POST",
            "/api/transcribe",
            Some(json!({ "audio": audio, "language": "de" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({ "text": "4 bytes in de", "language": "de" }));
    }

    #[tokio::test]
    async fn chat_requires_a_messages_array() {
        let (status, body) =
            call(app(), "POST", "/api/chat", Some(json!({ "messages": "hello" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["error"], "Messages array is required");
    }

    #[tokio::test]
    async fn chat_without_stream_wraps_the_reply() {
        // --- Arrange ---
        let chat = Arc::new(FakeChat {
            reply: "Tell me more.".to_string(),
            ..FakeChat::default()
        });
        let app = create_router(state(chat.clone()));

        // --- Act ---
        let (status, body) = call(
            app,
            "POST",
            "/api/chat",
            Some(json!({ "messages": [{ "role": "user", "content": "Hi" }] })),
        )
        .await;

        // --- Assert ---
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_of(&body),
            json!({ "message": { "role": "assistant", "content": "Tell me more." } })
        );
        let requests = chat.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn chat_stream_frames_tokens_and_ends_with_done() {
        let chat = Arc::new(FakeChat {
            tokens: vec![
                StreamItem::Token("Hel".to_string()),
                StreamItem::Token("lo".to_string()),
                StreamItem::Done,
            ],
            ..FakeChat::default()
        });

        let (status, body) = call(
            create_router(state(chat)),
            "POST",
            "/api/chat",
            Some(json!({ "messages": [{ "role": "user", "content": "Hi" }], "stream": true })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            String::from_utf8(body.to_vec()).unwrap(),
            "data: {\"text\":\"Hel\"}\n\ndata: {\"text\":\"lo\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn failed_chat_stream_never_sends_done() {
        let chat = Arc::new(FakeChat {
            tokens: vec![
                StreamItem::Token("Hel".to_string()),
                StreamItem::Failed("connection reset".to_string()),
            ],
            ..FakeChat::default()
        });

        let (_, body) = call(
            create_router(state(chat)),
            "POST",
            "/api/chat",
            Some(json!({ "messages": [], "stream": true })),
        )
        .await;

        assert_eq!(
            String::from_utf8(body.to_vec()).unwrap(),
            "data: {\"text\":\"Hel\"}\n\n"
        );
    }

    #[test]
    fn suggestions_are_split_and_unnumbered() {
        let content = "1. Lead with impact.\n\n2.   Quantify results\n2024 was a big year";
        assert_eq!(
            split_suggestions(content),
            vec!["Lead with impact.", "Quantify results", "2024 was a big year"]
        );
    }

    #[tokio::test]
    async fn generate_suggestion_uses_the_suggestion_model() {
        let chat = Arc::new(FakeChat {
            reply: "1. First\n2. Second".to_string(),
            ..FakeChat::default()
        });

        let (status, body) = call(
            create_router(state(chat.clone())),
            "POST",
            "/api/generate-suggestion",
            Some(json!({ "context": "Why Rust?", "candidateInfo": "systems engineer" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({ "suggestions": ["First", "Second"] }));
        let requests = chat.requests.lock().unwrap();
        assert_eq!(requests[0].model.as_deref(), Some("gpt-4o-mini"));
        assert!(requests[0].messages[0].content.contains("systems engineer"));
    }

    #[tokio::test]
    async fn responses_parses_guardrail_json() {
        let chat = Arc::new(FakeChat {
            reply: r#"{"moderationCategory":"NONE"}"#.to_string(),
            ..FakeChat::default()
        });

        let (status, body) = call(
            create_router(state(chat.clone())),
            "POST",
            "/api/responses",
            Some(json!({
                "model": "gpt-4o-mini",
                "input": [{ "role": "user", "content": "classify this" }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["output_parsed"]["moderationCategory"], "NONE");
        assert!(chat.requests.lock().unwrap()[0].json_object);
    }

    #[tokio::test]
    async fn responses_echoes_text_or_rejects() {
        let (status, body) = call(
            app(),
            "POST",
            "/api/responses",
            Some(json!({ "text": "hi", "metadata": { "k": 1 } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({ "text": "hi", "metadata": { "k": 1 } }));

        let (status, _) = call(app(), "POST", "/api/responses", Some(json!({ "text": 5 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn speech_routes_need_a_key() {
        let mut state = state(Arc::new(FakeChat::default()));
        state.speech = None;
        let app = create_router(state);

        let (status, body) = call(app.clone(), "GET", "/api/elevenlabs", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_of(&body)["error"], ELEVENLABS_KEY_MISSING);

        // Text is validated before the key.
        let (status, _) = call(app, "POST", "/api/elevenlabs", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn synthesize_returns_mpeg_audio() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/elevenlabs")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "text": "Hello" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], format!("{}:Hello", DEFAULT_VOICE_ID).as_bytes());
    }

    #[tokio::test]
    async fn voices_are_listed() {
        let (status, body) = call(app(), "GET", "/api/elevenlabs", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["voices"][0]["name"], "Rachel");
    }

    #[tokio::test]
    async fn session_bookkeeping_round() {
        let app = app();

        let (status, body) = call(
            app.clone(),
            "POST",
            "/api/sessions",
            Some(json!({ "candidateInfo": "Backend engineer", "config": { "interviewMode": "technical" } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = json_of(&body)["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            app.clone(),
            "POST",
            &format!("/api/sessions/{}/messages", id),
            Some(json!({ "role": "assistant", "content": "Welcome!" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            call(app.clone(), "POST", &format!("/api/sessions/{}/complete", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["messages"][0]["content"], "Welcome!");
        assert!(json_of(&body)["completedAt"].is_i64());

        let (status, _) =
            call(app.clone(), "POST", &format!("/api/sessions/{}/complete", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(app, "GET", "/api/sessions", None).await;
        assert_eq!(json_of(&body)["sessions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_sessions_are_404() {
        let (status, _) = call(app(), "GET", "/api/sessions/session_0_nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            app(),
            "POST",
            "/api/sessions/nope/messages",
            Some(json!({ "role": "user", "content": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = call(app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["status"], "ok");
    }
}
