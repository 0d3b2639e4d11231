//! Pitch-preserving speed change.
//!
//! The transform is WSOLA (waveform-similarity overlap-add): Hann-windowed
//! frames are taken from the input at `speed` times the output hop, each
//! nudged within a small tolerance to the offset that best continues the
//! previous frame, and overlap-added at the output hop. Pitch is preserved
//! because frames are copied, not re-sampled.
//!
//! Whether the transform exists is a build property (`tempo` feature). It is
//! checked once per process through [`SpeedCapability::detect`].

use std::sync::OnceLock;

use tracing::warn;

use crate::error::{Result, TtsError};

/// Frame length in seconds.
const FRAME_SECS: f64 = 0.030;
/// Smallest frame length in samples, for very low sample rates.
const MIN_FRAME: usize = 64;
/// Slowest speed accepted; output is at most four times the input length.
pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Whether this process can change playback speed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeedCapability {
    Available,
    Unavailable { reason: String },
}

static CAPABILITY: OnceLock<SpeedCapability> = OnceLock::new();

impl SpeedCapability {
    /// Process-wide capability, checked and logged on first use.
    pub fn detect() -> &'static SpeedCapability {
        CAPABILITY.get_or_init(|| {
            let capability = Self::from_build();
            if let SpeedCapability::Unavailable { reason } = &capability {
                warn!("Speed change unavailable ({reason}); audio is produced at speed 1.0");
            }
            capability
        })
    }

    fn from_build() -> SpeedCapability {
        if cfg!(feature = "tempo") {
            SpeedCapability::Available
        } else {
            SpeedCapability::Unavailable {
                reason: "built without the `tempo` feature".to_string(),
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SpeedCapability::Available)
    }
}

fn hann(len: usize) -> Vec<f32> {
    // periodic Hann: overlap-adds to a constant at 50% overlap
    (0..len)
        .map(|i| {
            let x = std::f64::consts::PI * i as f64 / len as f64;
            (x.sin() * x.sin()) as f32
        })
        .collect()
}

fn sample_at(input: &[f32], idx: isize) -> f32 {
    if idx < 0 {
        0.0
    } else {
        input.get(idx as usize).copied().unwrap_or(0.0)
    }
}

/// Offset in `[lo, hi]` whose frame correlates best with `reference`.
fn best_offset(input: &[f32], reference: &[f32], lo: isize, hi: isize) -> isize {
    let mut best = lo;
    let mut best_score = f32::NEG_INFINITY;
    for cand in lo..=hi {
        let score: f32 = reference
            .iter()
            .enumerate()
            .map(|(k, r)| r * sample_at(input, cand + k as isize))
            .sum();
        if score > best_score {
            best_score = score;
            best = cand;
        }
    }
    best
}

/// Speeds outside `[MIN_SPEED, MAX_SPEED]` (and NaN) are `InvalidRequest`.
pub fn check_speed(speed: f32) -> Result<()> {
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(())
    } else {
        Err(TtsError::InvalidRequest(format!(
            "speed must be in [{MIN_SPEED}, {MAX_SPEED}], got {speed}"
        )))
    }
}

/// Change playback speed by `speed` (2.0 = twice as fast) without changing
/// pitch. The output has `round(len / speed)` samples.
pub fn change_speed(input: &[f32], speed: f32, sample_rate: u32) -> Result<Vec<f32>> {
    check_speed(speed)?;
    if speed == 1.0 || input.is_empty() {
        return Ok(input.to_vec());
    }

    let out_len = (input.len() as f64 / speed as f64).round() as usize;
    let frame = ((sample_rate as f64 * FRAME_SECS) as usize).max(MIN_FRAME);
    let hop_out = frame / 2;
    let hop_in = hop_out as f64 * speed as f64;
    let tolerance = (hop_out / 2) as isize;
    let window = hann(frame);

    let mut output = vec![0.0f32; out_len + frame];
    let mut norm = vec![0.0f32; out_len + frame];
    // input position of the previously placed frame
    let mut prev: isize = 0;

    let mut k = 0usize;
    loop {
        let out_pos = k * hop_out;
        if out_pos >= out_len {
            break;
        }
        let nominal = (k as f64 * hop_in).round() as isize;
        let offset = if k == 0 {
            0
        } else {
            // the natural continuation of the previous frame is the target
            let continuation: Vec<f32> = (0..hop_out)
                .map(|j| sample_at(input, prev + (hop_out + j) as isize))
                .collect();
            let lo = (nominal - tolerance).max(0);
            let hi = (nominal + tolerance).max(lo);
            best_offset(input, &continuation, lo, hi)
        };

        for (j, w) in window.iter().enumerate() {
            output[out_pos + j] += w * sample_at(input, offset + j as isize);
            norm[out_pos + j] += w;
        }
        prev = offset;
        k += 1;
    }

    output.truncate(out_len);
    for (s, n) in output.iter_mut().zip(&norm) {
        if *n > 1e-3 {
            *s /= n;
        }
    }
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

    fn crossings_per_sample(samples: &[f32]) -> f32 {
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        crossings as f32 / samples.len() as f32
    }

    #[test]
    fn test_unit_speed_is_identity() {
        let input = sine(220.0, 16000, 1600);
        assert_eq!(change_speed(&input, 1.0, 16000).unwrap(), input);
    }

    #[test]
    fn test_length_scales_with_speed() {
        let input = sine(220.0, 16000, 16000);
        assert_eq!(change_speed(&input, 2.0, 16000).unwrap().len(), 8000);
        assert_eq!(change_speed(&input, 0.5, 16000).unwrap().len(), 32000);
        assert_eq!(change_speed(&input, 1.2, 16000).unwrap().len(), 13333);
    }

    #[test]
    fn test_pitch_is_preserved() {
        let input = sine(220.0, 16000, 32000);
        let base = crossings_per_sample(&input);
        for speed in [0.75f32, 1.5, 2.0] {
            let out = change_speed(&input, speed, 16000).unwrap();
            let body = &out[800..out.len() - 800];
            let rate = crossings_per_sample(body);
            assert!(
                (rate - base).abs() / base < 0.1,
                "speed {speed}: crossing rate {rate} vs {base}"
            );
        }
    }

    #[test]
    fn test_invalid_speed_rejected() {
        assert!(change_speed(&[0.0; 10], 0.0, 16000).is_err());
        assert!(change_speed(&[0.0; 10], f32::NAN, 16000).is_err());
    }

    #[test]
    fn test_tiny_speed_rejected_before_allocating() {
        let input = vec![0.1; 24000];
        assert!(matches!(
            change_speed(&input, 1e-6, 24000),
            Err(TtsError::InvalidRequest(_))
        ));
        assert!(change_speed(&input, 4.5, 24000).is_err());
        assert_eq!(change_speed(&input, MIN_SPEED, 24000).unwrap().len(), 96000);
        assert_eq!(change_speed(&input, MAX_SPEED, 24000).unwrap().len(), 6000);
    }

    #[test]
    fn test_short_input() {
        let out = change_speed(&[0.1, 0.2, 0.3], 1.5, 24000).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[cfg(feature = "tempo")]
    #[test]
    fn test_capability_available_with_feature() {
        assert!(SpeedCapability::detect().is_available());
    }
}
