//! Captures interviewer audio while the interviewer is speaking and hands
//! the transcription to the suggestion trigger.

use crate::capture::CaptureAdapter;
use crate::config::CoachingConfig;
use crate::speaking::{SpeakingCoordinator, SpeakingSignal};
use crate::trigger::TriggerHandle;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use crate::trigger::sleep_until_deadline;
use tokio::time::Instant;

pub struct CandidateListener {
    capture: CaptureAdapter,
    speaking: SpeakingCoordinator,
    signals: broadcast::Receiver<SpeakingSignal>,
    trigger: TriggerHandle,
    window: Duration,
}

impl CandidateListener {
    pub fn new(
        capture: CaptureAdapter,
        speaking: SpeakingCoordinator,
        trigger: TriggerHandle,
        config: &CoachingConfig,
    ) -> Self {
        let signals = speaking.subscribe();
        Self {
            capture,
            speaking,
            signals,
            trigger,
            window: config.capture_window,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut window_end: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => break,
                signal = self.signals.recv() => match signal {
                    Ok(SpeakingSignal::Started { turn }) => {
                        if self.capture.is_capturing() {
                            continue;
                        }
                        match self.capture.start_capture() {
                            Ok(capture_id) => {
                                tracing::debug!(turn, capture_id, "listening to interviewer");
                                window_end = Some(Instant::now() + self.window);
                            }
                            Err(e) => tracing::warn!(turn, "could not start capture: {:#}", e),
                        }
                    }
                    Ok(SpeakingSignal::Finished { turn, reason }) => {
                        tracing::debug!(turn, ?reason, "interviewer done, stopping capture");
                        window_end = None;
                        let stopped = self.finish_capture(&mut shutdown).await;
                        self.speaking.acknowledge();
                        if stopped {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "listener fell behind speaking signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = sleep_until_deadline(window_end), if window_end.is_some() => {
                    window_end = None;
                    if self.finish_capture(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.capture.cancel().await;
        tracing::debug!("listener stopped");
    }

    /// Stops and transcribes the active capture. Returns `true` if shutdown
    /// interrupted it.
    async fn finish_capture(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            biased;
            _ = stop_requested(shutdown) => true,
            result = self.capture.stop_capture() => {
                match result {
                    Ok(Some(text)) => {
                        tracing::info!(capture_id = text.capture_id, text = %text.text, "interviewer transcribed");
                        if !self.trigger.submit_transcription(text).await {
                            tracing::debug!("suggestion trigger already stopped");
                        }
                    }
                    Ok(None) => tracing::debug!("nothing usable captured"),
                    Err(e) => tracing::warn!("capture transcription failed: {:#}", e),
                }
                false
            }
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        AudioStream, CaptureSource, MockAudioSource, MockTranscriber, TranscribedText, Transcriber,
    };
    use async_trait::async_trait;
    use crate::speaking::{FinishReason, SpeakingState};
    use crate::trigger::TriggerInput;
    use std::sync::Arc;
    use tokio::sync::{mpsc, oneshot};

    struct Setup {
        speaking: SpeakingCoordinator,
        submissions: mpsc::Receiver<TriggerInput>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
        frames: mpsc::Sender<Vec<f32>>,
        released: oneshot::Receiver<()>,
    }

    fn setup(transcriber: impl Transcriber + 'static) -> Setup {
        let (frames, rx) = mpsc::channel(16);
        frames.try_send(vec![0.25; 320]).unwrap();
        let (release, released) = oneshot::channel();
        let stream = AudioStream::new(16_000, rx).with_release(release);
        let mut audio = MockAudioSource::new();
        audio
            .expect_open()
            .withf(|source| *source == CaptureSource::SystemAudio)
            .times(1)
            .return_once(move |_| Ok(stream));

        let config = CoachingConfig::default();
        let capture = CaptureAdapter::new(Arc::new(audio), Arc::new(transcriber), &config)
            .with_source(CaptureSource::SystemAudio);
        let speaking = SpeakingCoordinator::new();
        let (tx, submissions) = mpsc::channel(4);
        let (shutdown, stop) = watch::channel(false);
        let listener = CandidateListener::new(
            capture,
            speaking.clone(),
            TriggerHandle::from_sender(tx),
            &config,
        );
        Setup {
            speaking,
            submissions,
            shutdown,
            task: listener.spawn(stop),
            frames,
            released,
        }
    }

    fn transcribed(input: Option<TriggerInput>) -> TranscribedText {
        match input {
            Some(TriggerInput::Transcribed(text)) => text,
            _ => panic!("expected a transcription"),
        }
    }

    #[tokio::test]
    async fn finish_signal_submits_the_transcription() {
        // --- Arrange ---
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Ok("Why do you want this job?".to_string()));
        let mut s = setup(transcriber);

        // --- Act ---
        let turn = s.speaking.begin();
        tokio::task::yield_now().await;
        turn.finish(FinishReason::PlaybackEnded);
        let text = transcribed(s.submissions.recv().await);

        // --- Assert ---
        assert_eq!(text.text, "Why do you want this job?");
        let _ = s.shutdown.send(true);
        s.task.await.unwrap();
        assert_eq!(s.speaking.state(), SpeakingState::Idle);
        drop(s.frames);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_window_bounds_listening_without_a_finish() {
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Ok("Tell me about your team.".to_string()));
        let mut s = setup(transcriber);

        let _turn = s.speaking.begin();
        let text = transcribed(s.submissions.recv().await);

        assert_eq!(text.capture_id, 1);
        assert!(s.released.await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_releases_an_active_capture() {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().never();
        let mut s = setup(transcriber);

        let _turn = s.speaking.begin();
        tokio::task::yield_now().await;
        s.shutdown.send(true).unwrap();
        s.task.await.unwrap();

        assert!(s.released.await.is_ok());
        assert!(s.submissions.try_recv().is_err());
    }

    /// Never answers, so the listener is still waiting on it at shutdown.
    struct StalledTranscriber;

    #[async_trait]
    impl Transcriber for StalledTranscriber {
        async fn transcribe(&self, _wav: Vec<u8>) -> anyhow::Result<String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_pending_transcription() {
        let mut s = setup(StalledTranscriber);

        let turn = s.speaking.begin();
        tokio::task::yield_now().await;
        turn.finish(FinishReason::PlaybackEnded);
        tokio::task::yield_now().await;
        s.shutdown.send(true).unwrap();
        s.task.await.unwrap();

        assert!(s.submissions.try_recv().is_err());
        drop(s.frames);
    }
}
