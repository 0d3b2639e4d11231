//! Offline sample rate conversion of a complete mono waveform.
//!
//! Uses rubato's FFT resampler, a pure Rust band-limited implementation.
//! The resampler's output delay is removed so the result lines up with the
//! input, and the length is `round(len * to / from)`.

use rubato::{FftFixedInOut, Resampler as RubatoResampler};

use crate::error::{Result, TtsError};

/// Frames per processing block handed to rubato.
const CHUNK_SIZE: usize = 1024;

/// Output length for `len` input samples converted from `from` Hz to `to` Hz.
pub fn resampled_len(len: usize, from: u32, to: u32) -> usize {
    (len as f64 * to as f64 / from as f64).round() as usize
}

/// Resample `input` from `from` Hz to `to` Hz.
pub fn resample(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == 0 || to == 0 {
        return Err(TtsError::InvalidRequest(format!(
            "cannot resample from {from}Hz to {to}Hz"
        )));
    }
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = FftFixedInOut::<f32>::new(from as usize, to as usize, CHUNK_SIZE, 1)
        .map_err(|e| TtsError::Encoding(format!("resampler setup failed: {e}")))?;
    let delay = resampler.output_delay();
    let expected = resampled_len(input.len(), from, to);

    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut block = Vec::with_capacity(resampler.input_frames_max());
    let mut pos = 0usize;
    // keep feeding (zero padding past the end) until the delayed tail is out
    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        block.clear();
        let available = input.len().saturating_sub(pos).min(needed);
        block.extend_from_slice(&input[pos..pos + available]);
        block.resize(needed, 0.0);
        pos += available;

        let processed = resampler
            .process(&[&block], None)
            .map_err(|e| TtsError::Encoding(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&processed[0]);
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_downsample_length() {
        let input = sine(440.0, 24000, 24000);
        let out = resample(&input, 24000, 16000).unwrap();
        assert_eq!(out.len(), 16000);
    }

    #[test]
    fn test_round_trip_preserves_duration() {
        for len in [1usize, 100, 2400, 24001, 30_017] {
            let input = sine(300.0, 24000, len);
            let down = resample(&input, 24000, 16000).unwrap();
            let back = resample(&down, 16000, 24000).unwrap();
            let diff = back.len() as i64 - input.len() as i64;
            assert!(diff.abs() <= 1, "len={len} came back as {}", back.len());
        }
    }

    #[test]
    fn test_low_tone_survives_downsampling() {
        let input = sine(200.0, 24000, 24000);
        let out = resample(&input, 24000, 8000).unwrap();
        // energy away from the edges matches a 0.5 amplitude sine
        let body = &out[1000..7000];
        let rms = (body.iter().map(|s| s * s).sum::<f32>() / body.len() as f32).sqrt();
        let ideal = 0.5 / 2f32.sqrt();
        assert!((rms - ideal).abs() < 0.02, "rms {rms}");
    }

    #[test]
    fn test_same_rate_and_empty_are_passthrough() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&input, 16000, 16000).unwrap(), input);
        assert!(resample(&[], 24000, 16000).unwrap().is_empty());
        assert!(resample(&input, 0, 16000).is_err());
    }
}
