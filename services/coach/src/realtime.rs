//! Realtime mode: the interviewer is a realtime voice model, the candidate
//! talks through the microphone and gets coaching tips on screen.

use crate::capture::CpalAudioSource;
use crate::config::{Config, INPUT_CHUNK_SIZE};
use crate::openai_adapter::{OpenAIDialer, credentials, interview_session};
use crate::playback::CpalPlayback;
use crate::terminal::{self, Presenter, TerminalCommand};
use anyhow::{Context, Result};
use interview_core::Command;
use interview_core::capture::{AudioSource, CaptureSource};
use interview_core::chat::ChatClient;
use interview_core::coach::CoachClient;
use interview_core::connector::{RealtimeConnector, SessionStatus};
use interview_core::session::InterviewSession;
use interview_native_utils::audio::{self, REALTIME_API_PCM16_SAMPLE_RATE};
use openai_realtime::ServerRx;
use openai_realtime::types::audio::{Base64EncodedAudioBytes, Voice};
use openai_realtime::types::events::ServerEvent;
use rubato::{FastFixedIn, Resampler};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

/// Chunk size of the resampler feeding interviewer audio to the output device.
const SPEAKER_CHUNK_SIZE: usize = 100;

pub struct RealtimeOptions {
    pub instructions: String,
    pub voice: Voice,
    pub playback: bool,
    pub microphone: Option<String>,
}

/// Buffers microphone frames and converts them into 24 kHz PCM16 chunks
/// for the realtime input buffer.
pub struct MicFeed {
    buffer: VecDeque<f32>,
    resampler: FastFixedIn<f32>,
}

impl MicFeed {
    pub fn new(device_rate: f64) -> Result<Self> {
        Ok(Self {
            buffer: VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2),
            resampler: audio::create_resampler(
                device_rate,
                REALTIME_API_PCM16_SAMPLE_RATE,
                INPUT_CHUNK_SIZE,
            )?,
        })
    }

    /// Returns encoded audio once at least one full chunk is buffered.
    pub fn push(&mut self, frame: &[f32]) -> Result<Option<Base64EncodedAudioBytes>> {
        self.buffer.extend(frame);
        let mut resampled = Vec::new();
        while self.buffer.len() >= INPUT_CHUNK_SIZE {
            let chunk: Vec<f32> = self.buffer.drain(..INPUT_CHUNK_SIZE).collect();
            let out = self.resampler.process(&[chunk.as_slice()], None)?;
            if let Some(channel) = out.first() {
                resampled.extend_from_slice(channel);
            }
        }
        if resampled.is_empty() {
            return Ok(None);
        }
        Ok(Some(audio::encode_f32(&resampled)))
    }

    /// Drops partial input, e.g. while the interviewer is audible.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Decodes interviewer audio deltas and queues them on the output device.
async fn play_interviewer(mut server_events: ServerRx, playback: CpalPlayback) -> Result<()> {
    let mut resampler = audio::create_resampler(
        REALTIME_API_PCM16_SAMPLE_RATE,
        playback.sample_rate(),
        SPEAKER_CHUNK_SIZE,
    )?;

    loop {
        let event = match server_events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "audio playback fell behind server events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            ServerEvent::ResponseAudioDelta(data) => {
                let samples = audio::decode_f32(data.delta());
                let chunk_size = resampler.input_frames_next();
                for chunk in audio::split_for_chunks(&samples, chunk_size) {
                    match resampler.process(&[chunk.as_slice()], None) {
                        Ok(out) => {
                            if let Some(channel) = out.first() {
                                let pushed = playback.enqueue(channel);
                                if pushed < channel.len() {
                                    tracing::warn!("output buffer full, dropped {} samples", channel.len() - pushed);
                                }
                            }
                        }
                        Err(e) => tracing::warn!("Failed to resample interviewer audio: {}", e),
                    }
                }
            }
            ServerEvent::Close { reason } => {
                tracing::info!("Connection closed: {:?}", reason);
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

pub async fn run(
    config: &Config,
    playback: CpalPlayback,
    background: &str,
    options: RealtimeOptions,
) -> Result<()> {
    let (command_tx, mut command_rx) = mpsc::channel::<Command>(32);

    let connector = RealtimeConnector::new(credentials(config), OpenAIDialer)
        .with_session(interview_session(&options.instructions, options.voice));
    let chat = Arc::new(ChatClient::new(&config.openai_api_key, &config.suggestion_model));
    let suggester = Arc::new(CoachClient::new(chat, background));
    let mut session = InterviewSession::new(
        connector,
        Arc::new(playback.clone()),
        suggester,
        config.coaching.clone(),
        command_tx,
    );

    session
        .start(true)
        .await
        .context("Failed to start the realtime interview")?;
    if !options.playback {
        session.set_audio_playback(false).await?;
    }

    let server_events = session
        .connector()
        .server_events()
        .await
        .context("Failed to get server events channel")?;
    let speaker = tokio::spawn(play_interviewer(server_events, playback.clone()));

    let mut mic = CpalAudioSource::new(options.microphone, None)
        .open(CaptureSource::Microphone)
        .context("Failed to open the microphone")?;
    let mut feed = MicFeed::new(mic.sample_rate as f64)?;
    let mut mic_open = true;

    let mut status = session.connector().watch_status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut presenter = Presenter::stdout();
    println!("{}", terminal::HELP);

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down...");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() || *status.borrow() == SessionStatus::Disconnected {
                    tracing::warn!("Realtime connection closed");
                    break;
                }
            }
            Some(command) = command_rx.recv() => presenter.show(command),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match TerminalCommand::parse(&line) {
                    Some(TerminalCommand::Quit) => break,
                    Some(TerminalCommand::Mute) => {
                        if let Err(e) = session.set_audio_playback(false).await {
                            tracing::error!("Failed to mute the interviewer: {:#}", e);
                        }
                    }
                    Some(TerminalCommand::Unmute) => {
                        if let Err(e) = session.set_audio_playback(true).await {
                            tracing::error!("Failed to unmute the interviewer: {:#}", e);
                        }
                    }
                    Some(TerminalCommand::Say(text)) => {
                        if let Err(e) = session.send_text(&text).await {
                            tracing::error!("Failed to send message: {:#}", e);
                        }
                    }
                    None => {}
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("stdin closed: {}", e);
                    stdin_open = false;
                }
            },
            frame = mic.frames.recv(), if mic_open => match frame {
                Some(frame) => {
                    // The interviewer's own voice must not reach the input buffer.
                    if playback.is_playing() {
                        feed.clear();
                        continue;
                    }
                    match feed.push(&frame) {
                        Ok(Some(audio)) => {
                            if let Err(e) = session.connector().append_audio(audio).await {
                                tracing::error!("Failed to send audio buffer: {:#}", e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Failed to resample microphone audio: {}", e),
                    }
                }
                None => {
                    tracing::warn!("Microphone stream ended");
                    mic_open = false;
                }
            },
        }
    }

    tracing::info!("Shutting down...");
    drop(mic);
    speaker.abort();
    if let Some(report) = session.stop().await {
        terminal::log_report(&report);
    }
    presenter.summary();
    Ok(())
}
