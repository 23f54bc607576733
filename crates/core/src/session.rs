//! A realtime practice interview: connector, suggestion trigger and local
//! playback, started and stopped together.

use crate::Command;
use crate::coach::Suggester;
use crate::config::CoachingConfig;
use crate::connector::{
    ConnectError, Dialer, RealtimeConnector, SessionStatus, interview_turn_detection,
};
use crate::interviewer::AudioSink;
use crate::trigger::{SuggestionTrigger, TriggerHandle, TriggerReport};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub struct InterviewSession<D: Dialer> {
    connector: RealtimeConnector<D>,
    sink: Arc<dyn AudioSink>,
    suggester: Arc<dyn Suggester>,
    config: CoachingConfig,
    commands: mpsc::Sender<Command>,
    trigger: Option<(TriggerHandle, JoinHandle<TriggerReport>)>,
    close_watcher: Option<JoinHandle<()>>,
}

impl<D: Dialer> InterviewSession<D> {
    pub fn new(
        connector: RealtimeConnector<D>,
        sink: Arc<dyn AudioSink>,
        suggester: Arc<dyn Suggester>,
        config: CoachingConfig,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            connector,
            sink,
            suggester,
            config,
            commands,
            trigger: None,
            close_watcher: None,
        }
    }

    pub fn connector(&mut self) -> &mut RealtimeConnector<D> {
        &mut self.connector
    }

    /// Handle for feeding transcribed interviewer audio into the running trigger.
    pub fn trigger(&self) -> Option<TriggerHandle> {
        self.trigger.as_ref().map(|(handle, _)| handle.clone())
    }

    /// Connects, configures turn detection and starts watching for questions.
    pub async fn start(&mut self, greeting: bool) -> Result<(), ConnectError> {
        self.connector.connect().await?;
        if let Err(e) = self
            .connector
            .update_session(interview_turn_detection(), greeting)
            .await
        {
            self.connector.disconnect().await;
            return Err(ConnectError::Transport(e));
        }

        let (trigger, handle) = SuggestionTrigger::new(
            self.config.clone(),
            self.connector.events(),
            self.connector.transcript(),
            self.suggester.clone(),
            self.commands.clone(),
        );
        self.close_watcher = Some(tokio::spawn(stop_on_disconnect(
            self.connector.watch_status(),
            handle.clone(),
        )));
        self.trigger = Some((handle, trigger.spawn()));
        Ok(())
    }

    /// Mutes local output first, then tells the realtime session to stop
    /// producing audio. Nothing here waits on the suggestion pipeline.
    pub async fn set_audio_playback(&mut self, enabled: bool) -> Result<()> {
        self.sink.set_muted(!enabled);
        tracing::info!(enabled, "audio playback toggled");
        self.connector.set_output_muted(!enabled).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.connector.send_simulated_user_message(text).await
    }

    /// Stops the trigger (dropping pending timers and in-flight requests)
    /// and closes the connection.
    pub async fn stop(&mut self) -> Option<TriggerReport> {
        if let Some(watcher) = self.close_watcher.take() {
            watcher.abort();
        }
        let report = match self.trigger.take() {
            Some((handle, task)) => {
                handle.shutdown().await;
                match task.await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        tracing::error!("suggestion trigger ended abnormally: {}", e);
                        None
                    }
                }
            }
            None => None,
        };
        self.connector.disconnect().await;
        report
    }
}

/// Shuts the trigger down when the realtime session drops on its own, so no
/// suggestion is produced for a conversation that has ended.
async fn stop_on_disconnect(mut status: watch::Receiver<SessionStatus>, trigger: TriggerHandle) {
    if status
        .wait_for(|status| *status == SessionStatus::Disconnected)
        .await
        .is_ok()
    {
        tracing::info!("realtime session closed, stopping suggestions");
    }
    trigger.shutdown().await;
}
