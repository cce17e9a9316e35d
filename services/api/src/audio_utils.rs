//! PCM16 codec helpers and sample-rate conversion for the voice providers.
//!
//! Clients stream 24 kHz PCM16; OpenAI's realtime API speaks the same rate,
//! while Gemini Live expects 16 kHz input, so the Gemini path resamples in
//! both directions.

use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree};

pub const OPENAI_REALTIME_SAMPLE_RATE: f64 = 24000.0;
pub const GEMINI_LIVE_SAMPLE_RATE: f64 = 16000.0;
pub const CLIENT_SAMPLE_RATE: f64 = 24000.0;

/// Creates a mono resampler converting between the given sample rates.
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

/// Decodes base64 PCM16 into normalized f32 samples in [-1.0, 1.0].
/// Undecodable input yields an empty buffer rather than an error, so a bad
/// audio frame never tears down the session.
pub fn decode_f32_from_base64_i16(base64_fragment: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16_bytes) => pcm16_bytes
            .chunks_exact(2)
            .map(|chunk| {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                (v as f32 / 32768.0).clamp(-1.0, 1.0)
            })
            .collect(),
        Err(_) => {
            tracing::error!("Failed to decode base64 fragment to f32");
            Vec::new()
        }
    }
}

/// Encodes f32 samples as base64 PCM16, clamping out-of-range values.
pub fn encode_f32_to_base64_i16(pcm32: &[f32]) -> String {
    let pcm16: Vec<u8> = pcm32
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// Converts i16 samples to normalized f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Encodes raw i16 samples as base64 little-endian bytes.
pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16_bytes: Vec<u8> = pcm16
        .iter()
        .flat_map(|&sample| sample.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16_bytes)
}

/// Decodes base64 little-endian bytes back into i16 samples.
pub fn decode_i16(base64_fragment: &str) -> Vec<i16> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16_bytes) => pcm16_bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect(),
        Err(_) => {
            tracing::error!("Failed to decode base64 fragment to i16");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn resampler_supports_all_provider_rate_pairs() {
        assert!(create_resampler(CLIENT_SAMPLE_RATE, GEMINI_LIVE_SAMPLE_RATE, 512).is_ok());
        assert!(create_resampler(GEMINI_LIVE_SAMPLE_RATE, CLIENT_SAMPLE_RATE, 512).is_ok());
        assert!(create_resampler(CLIENT_SAMPLE_RATE, OPENAI_REALTIME_SAMPLE_RATE, 512).is_ok());
    }

    #[test]
    fn f32_base64_round_trip_preserves_samples() {
        let original = vec![0.1f32, -0.7, 0.0, 0.99];
        let decoded = decode_f32_from_base64_i16(&encode_f32_to_base64_i16(&original));
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(decoded.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 0.001);
        }
    }

    #[test]
    fn i16_base64_round_trip_is_exact() {
        let original = vec![1000i16, -2000, 0, i16::MAX, i16::MIN];
        assert_eq!(decode_i16(&encode_i16(&original)), original);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let extremes = vec![2.0f32, -2.0, f32::INFINITY, f32::NEG_INFINITY];
        let decoded = decode_f32_from_base64_i16(&encode_f32_to_base64_i16(&extremes));
        for value in decoded {
            assert!((-1.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn bad_input_yields_empty_buffers() {
        assert!(decode_f32_from_base64_i16("not base64!").is_empty());
        assert!(decode_i16("").is_empty());

        // A trailing odd byte cannot form an i16 and is dropped.
        let encoded = base64::engine::general_purpose::STANDARD.encode([0x00u8]);
        assert!(decode_i16(&encoded).is_empty());
    }

    #[test]
    fn i16_to_f32_normalizes_full_scale() {
        let converted = convert_i16_to_f32(&[i16::MAX, i16::MIN, 0, 16384]);
        assert_abs_diff_eq!(converted[0], i16::MAX as f32 / 32768.0, epsilon = 0.0001);
        assert_abs_diff_eq!(converted[1], -1.0, epsilon = 0.0001);
        assert_abs_diff_eq!(converted[2], 0.0, epsilon = 0.0001);
        assert_abs_diff_eq!(converted[3], 0.5, epsilon = 0.0001);
    }
}
