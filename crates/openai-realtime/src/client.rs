use crate::client::stats::Stats;
use crate::types;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use openai_realtime_types::audio::Base64EncodedAudioBytes;
use openai_realtime_types::session::Session;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub(crate) mod config;
pub(crate) mod consts;
pub(crate) mod stats;
mod utils;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

/// The seam between the realtime websocket and the code driving it.
///
/// Everything outbound goes through `send_client_event`; the convenience
/// methods build the event and forward to it.
#[async_trait]
pub trait OAIClient: Send {
    async fn send_client_event(&mut self, event: types::ClientEvent) -> Result<()>;

    async fn server_events(&mut self) -> Result<ServerRx>;

    async fn disconnect(&mut self) -> Result<()>;

    async fn update_session(&mut self, config: Session) -> Result<()> {
        let event = types::ClientEvent::SessionUpdate(
            types::events::client::SessionUpdateEvent::new(config),
        );
        self.send_client_event(event).await
    }

    async fn append_input_audio_buffer(&mut self, audio: Base64EncodedAudioBytes) -> Result<()> {
        let event = types::ClientEvent::InputAudioBufferAppend(
            types::events::client::InputAudioBufferAppendEvent::new(audio),
        );
        self.send_client_event(event).await
    }

    async fn create_conversation_item(&mut self, item: types::Item) -> Result<()> {
        let event = types::ClientEvent::ConversationItemCreate(
            types::events::client::ConversationItemCreateEvent::new(item),
        );
        self.send_client_event(event).await
    }

    async fn create_response(&mut self) -> Result<()> {
        let event =
            types::ClientEvent::ResponseCreate(types::events::client::ResponseCreateEvent::new());
        self.send_client_event(event).await
    }
}

pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    stats: Arc<Mutex<Stats>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            stats: Arc::new(Mutex::new(Stats::new())),
            tasks: Vec::new(),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("realtime websocket handshake failed")?;
        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<types::ClientEvent>(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());

        // Writer: drains the client channel until every sender is gone, then closes the socket.
        let writer = tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
            if let Err(e) = write.close().await {
                tracing::debug!("websocket close failed: {}", e);
            }
        });

        let stats = self.stats.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => {
                        let event = match serde_json::from_str::<types::ServerEvent>(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
                                continue;
                            }
                        };
                        tracing::debug!("received message: {}", event.name());

                        if let types::ServerEvent::ResponseDone(ref done) = event {
                            if let Some(usage) = done.response().usage() {
                                match stats.lock() {
                                    Ok(mut guard) => guard.update_usage(
                                        usage.total_tokens(),
                                        usage.input_tokens(),
                                        usage.output_tokens(),
                                    ),
                                    Err(_) => tracing::error!("failed to update stats"),
                                }
                            }
                        }

                        // No subscribers is not an error; events are simply not observed.
                        let _ = s_tx.send(event);
                    }
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let _ = s_tx.send(types::ServerEvent::Close {
                            reason: reason.map(|v| v.reason.to_string()),
                        });
                        return;
                    }
                    _ => {}
                }
            }
            let _ = s_tx.send(types::ServerEvent::Close { reason: None });
        });

        self.tasks = vec![writer, reader];
        Ok(())
    }

    /// Usage stats accumulated so far.
    pub fn stats(&self) -> Result<Stats> {
        self.stats
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| anyhow::anyhow!("failed to get stats"))
    }
}

#[async_trait]
impl OAIClient for Client {
    async fn send_client_event(&mut self, event: types::ClientEvent) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(event).await.context("realtime writer has stopped")?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    async fn server_events(&mut self) -> Result<ServerRx> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Ok(stats) = self.stats() {
            tracing::info!(
                responses = stats.responses(),
                total_tokens = stats.total_tokens(),
                input_tokens = stats.input_tokens(),
                output_tokens = stats.output_tokens(),
                "realtime session usage"
            );
        }
        // Dropping the sender lets the writer flush and send a close frame.
        self.c_tx = None;
        self.s_tx = None;
        let mut tasks = std::mem::take(&mut self.tasks).into_iter();
        if let Some(writer) = tasks.next() {
            if let Err(e) = writer.await {
                tracing::warn!("realtime writer ended abnormally: {}", e);
            }
        }
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub async fn connect_with_config(capacity: usize, config: config::Config) -> Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

