//! Lifecycle of one realtime session: credential, websocket, dispatch of
//! server events into the event log and the transcript.

use crate::event_log::{Direction, EventLog, EventLogReader};
use crate::transcript::{Role, Transcript, TranscriptReader};
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use openai_realtime::types::audio::{Base64EncodedAudioBytes, ServerVadTurnDetection, TurnDetection};
use openai_realtime::types::events::client::{ConversationItemCreateEvent, ResponseCreateEvent, SessionUpdateEvent};
use openai_realtime::types::{
    ClientEvent, EphemeralSession, Item, MessageItem, MessageRole, ServerEvent, Session,
    SessionConfigurator,
};
use openai_realtime::{OAIClient, ServerRx, SessionTokenClient};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const TRANSCRIBING_PLACEHOLDER: &str = "[Transcribing...]";
const INAUDIBLE_PLACEHOLDER: &str = "[inaudible]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("session is {0:?}, connect only from Disconnected")]
    Busy(SessionStatus),
    #[error("failed to fetch a session credential: {0:#}")]
    Credential(anyhow::Error),
    #[error("no ephemeral key provided by the server")]
    MissingCredential,
    #[error("realtime handshake failed: {0:#}")]
    Handshake(anyhow::Error),
    #[error("realtime transport failed: {0:#}")]
    Transport(anyhow::Error),
}

/// Source of the short-lived realtime credential. Returns the provider's JSON as is.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch(&self) -> Result<Value>;
}

#[async_trait]
impl CredentialProvider for SessionTokenClient {
    async fn fetch(&self) -> Result<Value> {
        self.create_raw().await
    }
}

/// Fetches credentials from an HTTP endpoint, such as the API service's `/api/session`.
pub struct EndpointCredentials {
    http: reqwest::Client,
    url: String,
}

impl EndpointCredentials {
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl CredentialProvider for EndpointCredentials {
    async fn fetch(&self) -> Result<Value> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("session endpoint returned {}", status);
        }
        response.json().await.context("session endpoint returned invalid JSON")
    }
}

/// Opens the realtime transport with an ephemeral token.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Client: OAIClient + 'static;

    async fn dial(&self, token: &str) -> Result<Self::Client>;
}

/// Turn detection the interview session runs with.
pub fn interview_turn_detection() -> TurnDetection {
    TurnDetection::ServerVad(
        ServerVadTurnDetection::default()
            .with_threshold(0.9)
            .with_prefix_padding_ms(300)
            .with_silence_duration_ms(500)
            .with_create_response(true)
            .with_interrupt_response(true),
    )
}

/// Session update that mutes or unmutes audio output upstream.
pub fn output_modalities(muted: bool) -> Session {
    let configurator = SessionConfigurator::new();
    if muted {
        configurator.with_modalities_disable_audio().build()
    } else {
        configurator.with_modalities_enable_audio().build()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct RealtimeConnector<D: Dialer> {
    credentials: Arc<dyn CredentialProvider>,
    dialer: D,
    log: Arc<Mutex<EventLog>>,
    transcript: Arc<Mutex<Transcript>>,
    events: EventLogReader,
    transcript_reader: TranscriptReader,
    status: Arc<watch::Sender<SessionStatus>>,
    client: Option<D::Client>,
    dispatch: Option<JoinHandle<()>>,
    base_session: Option<Session>,
    output_muted: bool,
}

impl<D: Dialer> RealtimeConnector<D> {
    pub fn new(credentials: Arc<dyn CredentialProvider>, dialer: D) -> Self {
        let log = EventLog::new();
        let transcript = Transcript::new();
        let (status, _) = watch::channel(SessionStatus::Disconnected);
        Self {
            credentials,
            dialer,
            events: log.reader(),
            transcript_reader: transcript.reader(),
            log: Arc::new(Mutex::new(log)),
            transcript: Arc::new(Mutex::new(transcript)),
            status: Arc::new(status),
            client: None,
            dispatch: None,
            base_session: None,
            output_muted: false,
        }
    }

    /// Session settings sent right after every connect.
    pub fn with_session(mut self, session: Session) -> Self {
        self.base_session = Some(session);
        self
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn events(&self) -> EventLogReader {
        self.events.clone()
    }

    pub fn transcript(&self) -> TranscriptReader {
        self.transcript_reader.clone()
    }

    /// A second subscription to raw server events, e.g. for audio playback.
    pub async fn server_events(&mut self) -> Result<ServerRx> {
        match self.client.as_mut() {
            Some(client) => client.server_events().await,
            None => anyhow::bail!("not connected"),
        }
    }

    pub fn is_output_muted(&self) -> bool {
        self.output_muted
    }

    pub fn add_breadcrumb(&self, text: &str, meta: Option<Value>) {
        lock(&self.transcript).add_breadcrumb(text, meta);
    }

    fn record(&self, direction: Direction, name: &str, payload: Value) {
        lock(&self.log).append(direction, name, payload);
    }

    fn revert(&mut self) {
        self.status.send_replace(SessionStatus::Disconnected);
    }

    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        let current = self.status();
        if current != SessionStatus::Disconnected {
            return Err(ConnectError::Busy(current));
        }
        self.status.send_replace(SessionStatus::Connecting);

        self.record(Direction::Client, "fetch_session_token_request", json!({}));
        let raw = match self.credentials.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("credential fetch failed: {:#}", e);
                self.revert();
                return Err(ConnectError::Credential(e));
            }
        };
        self.record(Direction::Server, "fetch_session_token_response", raw.clone());

        let session = serde_json::from_value::<EphemeralSession>(raw).unwrap_or_default();
        let token = session.client_secret_value().map(str::to_string);
        let Some(token) = token else {
            self.record(
                Direction::Client,
                "error.no_ephemeral_key",
                json!({ "error": "No ephemeral key provided by the server" }),
            );
            tracing::error!("no ephemeral key provided by the server");
            self.revert();
            return Err(ConnectError::MissingCredential);
        };

        tracing::debug!(
            session_id = session.id().unwrap_or("-"),
            model = session.model().unwrap_or("-"),
            expires_at = ?session.expires_at(),
            "ephemeral credential issued"
        );

        let mut client = match self.dialer.dial(&token).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("realtime handshake failed: {:#}", e);
                self.revert();
                return Err(ConnectError::Handshake(e));
            }
        };
        let rx = match client.server_events().await {
            Ok(rx) => rx,
            Err(e) => {
                let _ = client.disconnect().await;
                self.revert();
                return Err(ConnectError::Transport(e));
            }
        };

        self.dispatch = Some(tokio::spawn(dispatch(
            rx,
            self.log.clone(),
            self.transcript.clone(),
            self.status.clone(),
        )));
        self.client = Some(client);
        self.status.send_replace(SessionStatus::Connected);
        tracing::info!("realtime session connected");

        if let Some(session) = self.base_session.clone() {
            self.send(ClientEvent::SessionUpdate(SessionUpdateEvent::new(session)))
                .await
                .map_err(ConnectError::Transport)?;
        }
        if self.output_muted {
            self.send(ClientEvent::SessionUpdate(SessionUpdateEvent::new(output_modalities(true))))
                .await
                .map_err(ConnectError::Transport)?;
        }
        Ok(())
    }

    /// Logs and sends one client event.
    pub async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let Some(client) = self.client.as_mut() else {
            anyhow::bail!("cannot send {}: not connected", event.name());
        };
        let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
        lock(&self.log).append(Direction::Client, event.name(), payload);
        client.send_client_event(event).await
    }

    /// Streams microphone audio upstream. Only the chunk size is logged so
    /// the event log does not hold the recording.
    pub async fn append_audio(&mut self, audio: Base64EncodedAudioBytes) -> Result<()> {
        let Some(client) = self.client.as_mut() else {
            anyhow::bail!("cannot stream audio: not connected");
        };
        lock(&self.log).append(
            Direction::Client,
            "input_audio_buffer.append",
            json!({ "audio_bytes": audio.len() }),
        );
        client.append_input_audio_buffer(audio).await
    }

    pub async fn update_session(
        &mut self,
        turn_detection: TurnDetection,
        trigger_greeting: bool,
    ) -> Result<()> {
        let session = SessionConfigurator::new()
            .with_turn_detection(turn_detection)
            .build();
        self.send(ClientEvent::SessionUpdate(SessionUpdateEvent::new(session)))
            .await?;
        if trigger_greeting {
            self.send_simulated_user_message("hi").await?;
        }
        Ok(())
    }

    /// Injects a user turn that was typed rather than spoken.
    pub async fn send_simulated_user_message(&mut self, text: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        {
            let mut transcript = lock(&self.transcript);
            transcript.add_message(&id, Role::User, text, true);
            transcript.complete(&id, None);
        }
        let item = MessageItem::builder()
            .with_id(&id)
            .with_role(MessageRole::User)
            .with_input_text(text)
            .build();
        self.send(ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(
            Item::Message(item),
        )))
        .await?;
        self.send(ClientEvent::ResponseCreate(ResponseCreateEvent::new()))
            .await
    }

    /// Upstream half of the playback toggle. Remembered across reconnects.
    pub async fn set_output_muted(&mut self, muted: bool) -> Result<()> {
        self.output_muted = muted;
        if self.client.is_none() {
            return Ok(());
        }
        self.send(ClientEvent::SessionUpdate(SessionUpdateEvent::new(output_modalities(muted))))
            .await
    }

    pub async fn disconnect(&mut self) {
        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
        }
        if let Some(mut client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                tracing::warn!("realtime disconnect failed: {:#}", e);
            }
            tracing::info!("realtime session disconnected");
        }
        self.revert();
    }
}

impl<D: Dialer> Drop for RealtimeConnector<D> {
    fn drop(&mut self) {
        if let Some(dispatch) = self.dispatch.take() {
            dispatch.abort();
        }
    }
}

async fn dispatch(
    mut rx: ServerRx,
    log: Arc<Mutex<EventLog>>,
    transcript: Arc<Mutex<Transcript>>,
    status: Arc<watch::Sender<SessionStatus>>,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event dispatch fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
        lock(&log).append(Direction::Server, event.name(), payload);
        apply_server_event(&event, &mut lock(&transcript));
        if let ServerEvent::Close { reason } = &event {
            tracing::info!(?reason, "realtime connection closed");
            break;
        }
    }
    status.send_replace(SessionStatus::Disconnected);
}

/// Projects message-related server events into the transcript.
pub fn apply_server_event(event: &ServerEvent, transcript: &mut Transcript) {
    match event {
        ServerEvent::ConversationItemCreated(e) => {
            let item = e.item();
            if item.item_type() != "message" {
                return;
            }
            let role = match item.role() {
                Some(MessageRole::User) => Role::User,
                Some(MessageRole::Assistant) => Role::Assistant,
                _ => return,
            };
            let mut text = item.text();
            if role == Role::User && text.is_empty() {
                text = TRANSCRIBING_PLACEHOLDER.to_string();
            }
            transcript.add_message(item.id(), role, &text, false);
        }
        ServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => {
            let text = e.transcript().trim();
            let text = if text.is_empty() { INAUDIBLE_PLACEHOLDER } else { text };
            transcript.complete(e.item_id(), Some(text));
        }
        ServerEvent::ResponseTextDelta(e) | ServerEvent::ResponseAudioTranscriptDelta(e) => {
            transcript.append_delta(&e.part().item_id, e.delta())
        }
        ServerEvent::ResponseTextDone(e) => transcript.complete(&e.part().item_id, Some(e.text())),
        ServerEvent::ResponseAudioTranscriptDone(e) => {
            transcript.complete(&e.part().item_id, Some(e.transcript()))
        }
        ServerEvent::ResponseOutputItemDone(e) => transcript.complete(e.item().id(), None),
        ServerEvent::Error(e) => {
            tracing::warn!("realtime error: {}", e.error());
            transcript.add_breadcrumb(
                &format!("Error: {}", e.error().message()),
                serde_json::to_value(e.error()).ok(),
            );
        }
        _ => {}
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeDialer, valid_credentials};
    use super::*;
    use crate::transcript::MessageStatus;
    use std::time::Duration;

    fn credentials(response: Value) -> Arc<dyn CredentialProvider> {
        let mut provider = MockCredentialProvider::new();
        provider
            .expect_fetch()
            .returning(move || Ok(response.clone()));
        Arc::new(provider)
    }

    fn server_event(value: Value) -> ServerEvent {
        serde_json::from_value(value).unwrap()
    }

    fn names(reader: &EventLogReader) -> Vec<String> {
        reader.snapshot().iter().map(|e| e.name.clone()).collect()
    }

    async fn wait_for_len(reader: &mut EventLogReader, len: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while reader.len() < len {
                reader.changed().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn missing_client_secret_is_fatal_and_logged() {
        // --- Arrange ---
        let mut connector =
            RealtimeConnector::new(credentials(json!({ "id": "sess_1" })), FakeDialer::new());

        // --- Act ---
        let result = connector.connect().await;

        // --- Assert ---
        assert!(matches!(result, Err(ConnectError::MissingCredential)));
        assert_eq!(connector.status(), SessionStatus::Disconnected);
        assert_eq!(
            names(&connector.events()),
            vec![
                "fetch_session_token_request",
                "fetch_session_token_response",
                "error.no_ephemeral_key"
            ]
        );
    }

    #[tokio::test]
    async fn handshake_failure_reverts_to_disconnected() {
        let mut dialer = FakeDialer::new();
        dialer.fail = true;
        let mut connector = RealtimeConnector::new(valid_credentials(), dialer);

        let result = connector.connect().await;

        assert!(matches!(result, Err(ConnectError::Handshake(_))));
        assert_eq!(connector.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn connect_is_only_allowed_when_disconnected() {
        let mut connector = RealtimeConnector::new(valid_credentials(), FakeDialer::new());
        connector.connect().await.unwrap();

        let second = connector.connect().await;

        assert!(matches!(second, Err(ConnectError::Busy(SessionStatus::Connected))));
    }

    #[tokio::test]
    async fn server_events_reach_log_and_transcript() {
        // --- Arrange ---
        let dialer = FakeDialer::new();
        let server = dialer.client.server.clone();
        let mut connector = RealtimeConnector::new(valid_credentials(), dialer);
        connector.connect().await.unwrap();
        let mut events = connector.events();
        let before = events.len();

        // --- Act ---
        for value in [
            json!({ "type": "conversation.item.created", "event_id": "e1",
                    "item": { "id": "item_1", "type": "message", "role": "assistant", "content": [] } }),
            json!({ "type": "response.audio_transcript.delta", "event_id": "e2",
                    "response_id": "r1", "item_id": "item_1", "delta": "Tell me about " }),
            json!({ "type": "response.audio_transcript.delta", "event_id": "e3",
                    "response_id": "r1", "item_id": "item_1", "delta": "yourself." }),
            json!({ "type": "response.audio_transcript.done", "event_id": "e4",
                    "response_id": "r1", "item_id": "item_1", "transcript": "Tell me about yourself." }),
            json!({ "type": "response.done", "event_id": "e5", "response": { "id": "r1" } }),
        ] {
            server.send(server_event(value)).unwrap();
        }
        wait_for_len(&mut events, before + 5).await;

        // --- Assert ---
        let last = events.snapshot().pop().unwrap();
        assert!(last.is_response_done());
        assert_eq!(last.response_id(), Some("r1"));
        let message = connector.transcript().latest_completed(Role::Assistant).unwrap();
        assert_eq!(message.id, "item_1");
        assert_eq!(message.content, "Tell me about yourself.");
    }

    #[tokio::test]
    async fn streamed_audio_is_logged_without_samples() {
        let dialer = FakeDialer::new();
        let sent = dialer.client.sent.clone();
        let mut connector = RealtimeConnector::new(valid_credentials(), dialer);
        connector.connect().await.unwrap();

        connector.append_audio("AAAAAA==".to_string()).await.unwrap();

        let logged = connector.events().snapshot().pop().unwrap();
        assert_eq!(logged.name, "input_audio_buffer.append");
        assert_eq!(logged.payload, json!({ "audio_bytes": 8 }));
        let wire = serde_json::to_value(sent.lock().unwrap().last().unwrap()).unwrap();
        assert_eq!(wire["audio"], "AAAAAA==");
    }

    #[tokio::test]
    async fn close_event_reverts_status() {
        let dialer = FakeDialer::new();
        let server = dialer.client.server.clone();
        let mut connector = RealtimeConnector::new(valid_credentials(), dialer);
        connector.connect().await.unwrap();
        let mut status = connector.watch_status();

        server
            .send(ServerEvent::Close { reason: Some("bye".into()) })
            .unwrap();

        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == SessionStatus::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn mute_is_remembered_and_applied_after_connect() {
        let dialer = FakeDialer::new();
        let sent = dialer.client.sent.clone();
        let mut connector = RealtimeConnector::new(valid_credentials(), dialer);

        connector.set_output_muted(true).await.unwrap();
        connector.connect().await.unwrap();
        connector.set_output_muted(false).await.unwrap();

        let sent = sent.lock().unwrap().clone();
        let modalities: Vec<_> = sent
            .iter()
            .map(|event| serde_json::to_value(event).unwrap()["session"]["modalities"].clone())
            .collect();
        assert_eq!(modalities, vec![json!(["text"]), json!(["text", "audio"])]);
        assert_eq!(
            names(&connector.events())
                .iter()
                .filter(|n| *n == "session.update")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn greeting_follows_the_turn_detection_update() {
        let dialer = FakeDialer::new();
        let sent = dialer.client.sent.clone();
        let mut connector = RealtimeConnector::new(valid_credentials(), dialer);
        connector.connect().await.unwrap();

        connector
            .update_session(interview_turn_detection(), true)
            .await
            .unwrap();

        let sent: Vec<Value> = sent
            .lock()
            .unwrap()
            .iter()
            .map(|e| serde_json::to_value(e).unwrap())
            .collect();
        assert_eq!(sent.len(), 3);
        let threshold = sent[0]["session"]["turn_detection"]["threshold"].as_f64().unwrap();
        assert!((threshold - 0.9).abs() < 1e-6);
        assert_eq!(sent[0]["session"]["turn_detection"]["silence_duration_ms"], 500);
        assert_eq!(sent[0]["session"]["turn_detection"]["create_response"], true);
        assert!(sent[0]["session"].get("modalities").is_none());
        assert_eq!(sent[1]["type"], "conversation.item.create");
        assert_eq!(sent[1]["item"]["content"][0]["text"], "hi");
        assert_eq!(sent[2]["type"], "response.create");

        let messages = connector.transcript().messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_simulated);
        assert_eq!(sent[1]["item"]["id"], json!(messages[0].id));
    }

    #[tokio::test]
    async fn send_requires_a_connection() {
        let mut connector = RealtimeConnector::new(valid_credentials(), FakeDialer::new());
        assert!(connector.send_simulated_user_message("hello").await.is_err());
        connector.disconnect().await;
        assert_eq!(connector.status(), SessionStatus::Disconnected);
    }

    #[test]
    fn user_audio_is_transcribed_in_place() {
        let mut transcript = Transcript::new();
        apply_server_event(
            &server_event(json!({ "type": "conversation.item.created", "event_id": "e1",
                "item": { "id": "u1", "type": "message", "role": "user", "content": [] } })),
            &mut transcript,
        );
        assert_eq!(transcript.reader().messages()[0].content, TRANSCRIBING_PLACEHOLDER);

        apply_server_event(
            &server_event(json!({ "type": "conversation.item.input_audio_transcription.completed",
                "event_id": "e2", "item_id": "u1", "transcript": "  " })),
            &mut transcript,
        );
        let message = &transcript.reader().messages()[0];
        assert_eq!(message.content, INAUDIBLE_PLACEHOLDER);
        assert_eq!(message.status, MessageStatus::Done);
    }

    #[test]
    fn realtime_errors_become_breadcrumbs() {
        let mut transcript = Transcript::new();
        apply_server_event(
            &server_event(json!({ "type": "error", "event_id": "e1",
                "error": { "type": "invalid_request_error", "code": null, "message": "bad item",
                           "param": null, "event_id": null } })),
            &mut transcript,
        );
        assert_eq!(transcript.reader().breadcrumbs()[0].text, "Error: bad item");
    }
}
