use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate of realtime PCM16 audio and of `pcm_24000` speech synthesis output.
pub const REALTIME_API_PCM16_SAMPLE_RATE: f64 = 24000.0;

/// Creates a mono resampler between two sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits samples into fixed-size chunks, zero-padding the last one.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Resamples a complete mono buffer in one go.
pub fn resample_all(
    samples: &[f32],
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<Vec<f32>> {
    if (in_sampling_rate - out_sampling_rate).abs() < f64::EPSILON {
        return Ok(samples.to_vec());
    }
    let mut resampler = create_resampler(in_sampling_rate, out_sampling_rate, chunk_size)?;
    let mut out = Vec::with_capacity(
        (samples.len() as f64 * out_sampling_rate / in_sampling_rate) as usize + chunk_size,
    );
    for chunk in split_for_chunks(samples, chunk_size) {
        let resampled = resampler.process(&[chunk], None)?;
        if let Some(channel) = resampled.into_iter().next() {
            out.extend(channel);
        }
    }
    Ok(out)
}

/// Averages interleaved frames down to one channel.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Decodes base64 PCM16 (little endian) into normalised f32 samples.
pub fn decode_f32(base64_fragment: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16) => pcm16_bytes_to_f32(&pcm16),
        Err(e) => {
            tracing::error!("failed to decode base64 audio fragment: {}", e);
            Vec::new()
        }
    }
}

/// Interprets raw little-endian PCM16 bytes as normalised f32 samples.
pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / 32768.0).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Encodes f32 samples as base64 PCM16 (little endian), the realtime input format.
pub fn encode_f32(pcm32: &[f32]) -> String {
    let bytes: Vec<u8> = pcm32
        .iter()
        .flat_map(|&sample| to_i16(sample).to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
