//! Interviewer audio output through the default (or a named) output device.

use crate::config::{OUTPUT_BUFFER_SECS, OUTPUT_CHUNK_SIZE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use interview_core::interviewer::AudioSink;
use interview_native_utils::audio::{self, REALTIME_API_PCM16_SAMPLE_RATE};
use interview_native_utils::device;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapProd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Handle to the output ring buffer. The cpal stream itself is not `Send`,
/// so it is returned separately and must be kept alive by the caller.
#[derive(Clone)]
pub struct CpalPlayback {
    producer: Arc<Mutex<HeapProd<f32>>>,
    /// Samples pushed but not yet consumed by the device.
    queued: Arc<AtomicUsize>,
    muted: Arc<AtomicBool>,
    sample_rate: f64,
}

impl CpalPlayback {
    pub fn open(device_name: Option<&str>) -> Result<(Self, cpal::Stream)> {
        let output = device::get_or_default_output(device_name)
            .context("Failed to get audio output device")?;
        tracing::info!("Using output device: {:?}", output.name()?);

        let default_config = output
            .default_output_config()
            .context("Failed to get default output config")?;
        let output_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
        };
        tracing::info!("Output stream config: {:?}", &output_config);
        let channels = output_config.channels as usize;
        let sample_rate = output_config.sample_rate.0 as f64;

        let buffer = audio::shared_buffer(output_config.sample_rate.0 as usize * OUTPUT_BUFFER_SECS);
        let (producer, mut consumer) = buffer.split();
        let playback = Self {
            producer: Arc::new(Mutex::new(producer)),
            queued: Arc::new(AtomicUsize::new(0)),
            muted: Arc::new(AtomicBool::new(false)),
            sample_rate,
        };

        let queued = playback.queued.clone();
        let muted = playback.muted.clone();
        let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let popped = render(&mut consumer, data, channels, muted.load(Ordering::Relaxed));
            if popped > 0 {
                queued.fetch_sub(popped, Ordering::AcqRel);
            }
        };
        let stream = output.build_output_stream(
            &output_config,
            output_data_fn,
            move |err| tracing::error!("An error occurred on output stream: {}", err),
            None,
        )?;
        stream.play()?;

        Ok((playback, stream))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Whether interviewer audio is still waiting to be heard.
    pub fn is_playing(&self) -> bool {
        self.queued.load(Ordering::Acquire) > 0
    }

    /// Queues samples at the device rate. Returns how many fit.
    pub fn enqueue(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        // Count first so the device callback never subtracts more than was added.
        self.queued.fetch_add(samples.len(), Ordering::AcqRel);
        let pushed = self
            .producer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_slice(samples);
        let rejected = samples.len() - pushed;
        if rejected > 0 {
            self.queued.fetch_sub(rejected, Ordering::AcqRel);
        }
        pushed
    }
}

/// Fills one device buffer from the ring buffer, duplicating each mono
/// sample across channels. Muted output still drains so playback ends on time.
fn render(
    consumer: &mut impl Consumer<Item = f32>,
    data: &mut [f32],
    channels: usize,
    muted: bool,
) -> usize {
    let mut popped = 0;
    for frame in data.chunks_mut(channels.max(1)) {
        let sample = match consumer.try_pop() {
            Some(sample) => {
                popped += 1;
                sample
            }
            None => 0.0,
        };
        frame.fill(if muted { 0.0 } else { sample });
    }
    popped
}

#[async_trait]
impl AudioSink for CpalPlayback {
    /// Plays 24 kHz PCM16 speech and resolves once the device has consumed it.
    async fn play(&self, pcm16: Vec<u8>) -> Result<()> {
        let samples = audio::pcm16_bytes_to_f32(&pcm16);
        let samples = audio::resample_all(
            &samples,
            REALTIME_API_PCM16_SAMPLE_RATE,
            self.sample_rate,
            OUTPUT_CHUNK_SIZE,
        )
        .context("Failed to resample speech for playback")?;

        let mut rest = samples.as_slice();
        while !rest.is_empty() {
            let pushed = self.enqueue(rest);
            rest = &rest[pushed..];
            if !rest.is_empty() {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        }
        while self.is_playing() {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        Ok(())
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }
}
