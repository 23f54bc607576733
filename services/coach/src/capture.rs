//! Live audio input for the capture adapter and the realtime microphone feed.

use crate::config::INPUT_CHUNK_SIZE;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use interview_core::capture::{AudioSource, AudioStream, CaptureSource};
use interview_native_utils::{audio, device};
use tokio::sync::{mpsc, oneshot};

/// Frames buffered between the device callback and the consumer.
const FRAME_QUEUE: usize = 256;

/// Opens cpal input devices. System audio needs a loopback device
/// (e.g. a monitor source or a virtual cable) named explicitly.
#[derive(Debug, Clone, Default)]
pub struct CpalAudioSource {
    microphone: Option<String>,
    system: Option<String>,
}

impl CpalAudioSource {
    pub fn new(microphone: Option<String>, system: Option<String>) -> Self {
        Self { microphone, system }
    }

    fn device_for(&self, source: CaptureSource) -> Result<Option<String>> {
        match source {
            CaptureSource::Microphone => Ok(self.microphone.clone()),
            CaptureSource::SystemAudio => self.system.clone().map(Some).context(
                "system audio capture needs a loopback device; pass --system-device",
            ),
        }
    }
}

impl AudioSource for CpalAudioSource {
    fn open(&self, source: CaptureSource) -> Result<AudioStream> {
        let device_name = self.device_for(source)?;
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<u32>>(1);

        // cpal streams are not Send: the stream lives on its own thread until released.
        std::thread::Builder::new()
            .name(format!("capture-{}", source))
            .spawn(move || {
                let stream = match build_input(device_name.as_deref(), frames_tx) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = release_rx.blocking_recv();
                drop(stream);
                tracing::debug!(%source, "capture device released");
            })
            .context("Failed to spawn capture thread")?;

        let sample_rate = ready_rx
            .recv()
            .context("capture thread exited before opening the device")??;
        tracing::info!(%source, sample_rate, "capture opened");
        Ok(AudioStream::new(sample_rate, frames_rx).with_release(release_tx))
    }
}

fn build_input(
    device_name: Option<&str>,
    frames: mpsc::Sender<Vec<f32>>,
) -> Result<(cpal::Stream, u32)> {
    let input = device::get_or_default_input(device_name)
        .context("Failed to get audio input device")?;
    tracing::info!("Using input device: {:?}", input.name()?);

    let default_config = input
        .default_input_config()
        .context("Failed to get default input config")?;
    let input_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let channels = input_config.channels as usize;
    tracing::debug!("Input stream config: {:?}", &input_config);

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        if let Err(e) = frames.try_send(audio::downmix(data, channels)) {
            tracing::trace!("dropping input frame: {}", e);
        }
    };
    let stream = input.build_input_stream(
        &input_config,
        input_data_fn,
        move |err| tracing::error!("An error occurred on input stream: {}", err),
        None,
    )?;
    stream.play()?;

    Ok((stream, input_config.sample_rate.0))
}
