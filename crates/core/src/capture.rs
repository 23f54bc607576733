//! Records a bounded window of interviewer audio and turns it into text.

use crate::config::CoachingConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureSource {
    #[default]
    Microphone,
    /// Loopback of whatever the machine is playing.
    SystemAudio,
}

impl FromStr for CaptureSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "microphone" | "mic" => Ok(CaptureSource::Microphone),
            "system" | "system-audio" => Ok(CaptureSource::SystemAudio),
            other => anyhow::bail!("unknown capture source '{}'", other),
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Microphone => write!(f, "microphone"),
            CaptureSource::SystemAudio => write!(f, "system"),
        }
    }
}

/// Mono f32 frames from an open device.
///
/// Dropping the stream releases the device.
pub struct AudioStream {
    pub sample_rate: u32,
    pub frames: mpsc::Receiver<Vec<f32>>,
    release: Option<oneshot::Sender<()>>,
}

impl AudioStream {
    pub fn new(sample_rate: u32, frames: mpsc::Receiver<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            frames,
            release: None,
        }
    }

    /// Signals `release` when the stream is dropped.
    pub fn with_release(mut self, release: oneshot::Sender<()>) -> Self {
        self.release = Some(release);
        self
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }
}

#[cfg_attr(test, automock)]
pub trait AudioSource: Send + Sync {
    fn open(&self, source: CaptureSource) -> Result<AudioStream>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes a complete WAV file.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscribedText {
    pub capture_id: u64,
    pub text: String,
}

/// Whether a transcription carries enough text to be worth acting on.
pub fn accept_transcription(text: &str, min_chars: usize) -> bool {
    text.trim().chars().count() > min_chars
}

/// 16-bit mono PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("wav header")?;
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

struct Recording {
    samples: Vec<f32>,
    sample_rate: u32,
}

struct ActiveCapture {
    id: u64,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Recording>,
}

pub struct CaptureAdapter {
    audio: Arc<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    source: CaptureSource,
    window: Duration,
    min_chars: usize,
    next_id: u64,
    active: Option<ActiveCapture>,
}

impl CaptureAdapter {
    pub fn new(
        audio: Arc<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        config: &CoachingConfig,
    ) -> Self {
        Self {
            audio,
            transcriber,
            source: CaptureSource::default(),
            window: config.capture_window,
            min_chars: config.min_transcript_chars,
            next_id: 0,
            active: None,
        }
    }

    pub fn with_source(mut self, source: CaptureSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// Opens the device and starts buffering. A capture already running is
    /// kept and its id returned.
    pub fn start_capture(&mut self) -> Result<u64> {
        if let Some(active) = &self.active {
            tracing::debug!(capture_id = active.id, "capture already running");
            return Ok(active.id);
        }
        let stream = self
            .audio
            .open(self.source)
            .with_context(|| format!("failed to open {} audio", self.source))?;
        self.next_id += 1;
        let id = self.next_id;
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(record(stream, self.window, stopped));
        tracing::info!(capture_id = id, source = %self.source, "capture started");
        self.active = Some(ActiveCapture { id, stop, task });
        Ok(id)
    }

    /// Stops the running capture and transcribes it.
    ///
    /// `Ok(None)` when nothing was running, nothing was heard, or the text is
    /// too short to act on.
    pub async fn stop_capture(&mut self) -> Result<Option<TranscribedText>> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };
        let _ = active.stop.send(());
        let recording = active.task.await.context("capture task failed")?;
        tracing::info!(
            capture_id = active.id,
            samples = recording.samples.len(),
            "capture stopped"
        );
        if recording.samples.is_empty() {
            return Ok(None);
        }

        let wav = encode_wav(&recording.samples, recording.sample_rate)?;
        let text = self
            .transcriber
            .transcribe(wav)
            .await
            .with_context(|| format!("transcription of capture {} failed", active.id))?;
        if !accept_transcription(&text, self.min_chars) {
            tracing::info!(capture_id = active.id, text, "transcription too short, ignored");
            return Ok(None);
        }
        Ok(Some(TranscribedText {
            capture_id: active.id,
            text: text.trim().to_string(),
        }))
    }

    /// Drops the running capture without transcribing it.
    pub async fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            let _ = active.task.await;
            tracing::debug!(capture_id = active.id, "capture cancelled");
        }
    }
}

async fn record(
    mut stream: AudioStream,
    window: Duration,
    mut stop: oneshot::Receiver<()>,
) -> Recording {
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    let mut samples = Vec::new();
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = &mut deadline => {
                tracing::debug!("capture window elapsed");
                break;
            }
            frame = stream.frames.recv() => match frame {
                Some(frame) => samples.extend_from_slice(&frame),
                None => break,
            },
        }
    }
    // Frames already delivered before the stop still belong to the capture.
    while let Ok(frame) = stream.frames.try_recv() {
        samples.extend_from_slice(&frame);
    }
    Recording {
        samples,
        sample_rate: stream.sample_rate,
    }
}
