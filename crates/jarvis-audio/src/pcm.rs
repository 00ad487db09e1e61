use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Sample rate the session expects for microphone input.
pub const CAPTURE_SAMPLE_RATE: f64 = 16000.0;
/// Sample rate of audio produced by the remote voice models.
pub const PLAYBACK_SAMPLE_RATE: f64 = 24000.0;

/// Mime tag attached to each outbound PCM blob.
pub fn pcm_mime(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// A decoded chunk of playable audio at a fixed rate and channel count.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Duration in seconds, derived from frame count and rate.
    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        frames as f64 / self.sample_rate as f64
    }
}

/// Maps each float sample in [-1, 1] to a 16-bit signed little-endian
/// integer, clamped to the representable range.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Base64 transport form of [`encode`].
pub fn encode_base64(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(encode(samples))
}

/// Exact integer-level inverse of [`encode`]. An odd-length input drops
/// the trailing partial sample; this truncation is the accepted behavior
/// for malformed payloads, not an error.
pub fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Decodes a base64 PCM16 fragment into normalized float samples.
pub fn decode_base64(fragment: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(fragment) {
        Ok(bytes) => decode(&bytes)
            .into_iter()
            .map(|v| (v as f32 / 32768.0).clamp(-1.0, 1.0))
            .collect(),
        Err(e) => {
            tracing::error!("failed to decode base64 audio fragment: {}", e);
            Vec::new()
        }
    }
}

/// Reinterprets decoded integers as normalized floats and packages them
/// as a fixed-duration buffer at the given rate and channel count.
pub fn to_playable_buffer(bytes: &[u8], sample_rate: u32, channels: u16) -> AudioBuffer {
    let samples = decode(bytes)
        .into_iter()
        .map(|v| (v as f32 / 32768.0).clamp(-1.0, 1.0))
        .collect();
    AudioBuffer::new(samples, sample_rate, channels)
}

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

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_one_quantization_unit() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.123, -0.987];
        let bytes = encode(&samples);
        let decoded = decode(&bytes);
        assert_eq!(decoded.len(), samples.len());
        for (orig, got) in samples.iter().zip(decoded.iter()) {
            let expected = (orig * i16::MAX as f32) as i32;
            assert!(
                (expected - *got as i32).abs() <= 1,
                "sample {} decoded to {}",
                orig,
                got
            );
        }
    }

    #[test]
    fn encode_clamps_out_of_range_samples() {
        let bytes = encode(&[2.0, -3.5]);
        let decoded = decode(&bytes);
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn odd_length_input_truncates_final_sample() {
        let bytes = vec![0x01, 0x02, 0x03];
        let decoded = decode(&bytes);
        assert_eq!(decoded, vec![i16::from_le_bytes([0x01, 0x02])]);
    }

    #[test]
    fn base64_round_trip() {
        let samples = vec![0.25, -0.75, 0.0];
        let encoded = encode_base64(&samples);
        let decoded = decode_base64(&encoded);
        assert_eq!(decoded.len(), samples.len());
        for (orig, got) in samples.iter().zip(decoded.iter()) {
            assert!((orig - got).abs() < 2.0 / 32768.0);
        }
    }

    #[test]
    fn playable_buffer_duration() {
        let samples = vec![0.0f32; 24000];
        let bytes = encode(&samples);
        let buffer = to_playable_buffer(&bytes, 24000, 1);
        assert_eq!(buffer.samples().len(), 24000);
        assert!((buffer.duration_secs() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_base64_yields_empty() {
        assert!(decode_base64("not//valid!!base64===").is_empty());
    }
}
