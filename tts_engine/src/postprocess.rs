//! Post-processing of a synthesized waveform: sample rate, volume, speed,
//! encoding and optional persistence, always in that order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TtsError};
use crate::resample::resample;
use crate::tempo::{change_speed, check_speed, SpeedCapability};
use crate::wav::{encode_wav_base64, write_pcm_file, write_wav_file};

/// A mono waveform at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// 0 keeps the native rate. Rates above native are ignored.
    pub target_sample_rate: u32,
    pub volume: f32,
    pub speed: f32,
    pub output_path: Option<PathBuf>,
    /// Produce speed-1.0 audio instead of failing when speed change is
    /// unavailable.
    pub allow_speed_fallback: bool,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 0,
            volume: 1.0,
            speed: 1.0,
            output_path: None,
            allow_speed_fallback: false,
        }
    }
}

impl PostProcessConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(TtsError::InvalidRequest(format!(
                "volume must be a finite number >= 0, got {}",
                self.volume
            )));
        }
        check_speed(self.speed)
    }
}

/// WAV container bytes (16-bit PCM) in base64, with their sample rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedAudio {
    pub sample_rate: u32,
    pub wav_base64: String,
}

#[derive(Debug)]
pub struct PostProcessOutput {
    pub audio: EncodedAudio,
    /// Processed samples at `audio.sample_rate`.
    pub samples: Vec<f32>,
    /// Speed actually applied; 1.0 after a permitted fallback.
    pub speed_applied: f32,
    /// Where the audio was saved, if requested and successful.
    pub saved_to: Option<PathBuf>,
    /// Set when saving was requested and failed. The encoded audio is valid.
    pub persistence_error: Option<TtsError>,
}

impl PostProcessOutput {
    pub fn duration_secs(&self) -> f64 {
        if self.audio.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.audio.sample_rate as f64
    }
}

/// Applies [`PostProcessConfig`] to waveforms.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    speed_capability: SpeedCapability,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcessor {
    /// Uses the process-wide speed capability.
    pub fn new() -> Self {
        Self {
            speed_capability: SpeedCapability::detect().clone(),
        }
    }

    pub fn with_speed_capability(speed_capability: SpeedCapability) -> Self {
        Self { speed_capability }
    }

    pub fn speed_capability(&self) -> &SpeedCapability {
        &self.speed_capability
    }

    pub fn process(&self, waveform: &Waveform, config: &PostProcessConfig) -> Result<PostProcessOutput> {
        config.validate()?;
        let native_rate = waveform.sample_rate;

        // transform sample rate
        let (target_rate, samples) =
            if config.target_sample_rate == 0 || config.target_sample_rate >= native_rate {
                info!("The sample rate of synthesized audio is the same as model, which is {native_rate}Hz");
                (native_rate, waveform.samples.clone())
            } else {
                let target = config.target_sample_rate;
                let out = resample(&waveform.samples, native_rate, target)?;
                info!("Converted synthesized audio from {native_rate}Hz to {target}Hz");
                (target, out)
            };

        // transform volume
        let mut samples = samples;
        if config.volume != 1.0 {
            samples.iter_mut().for_each(|s| *s *= config.volume);
        }
        info!("Transform the volume of the audio successfully.");

        // transform speed
        let (samples, speed_applied) = self.apply_speed(samples, target_rate, config)?;

        let wav_base64 = encode_wav_base64(&samples, target_rate)?;
        info!("Audio to string successfully.");

        let (saved_to, persistence_error) = match &config.output_path {
            Some(path) => match save_audio(path, &samples, target_rate) {
                Ok(()) => {
                    info!("Save audio to {} successfully.", path.display());
                    (Some(path.clone()), None)
                }
                Err(e) => {
                    warn!("{e}");
                    (None, Some(e))
                }
            },
            None => (None, None),
        };

        Ok(PostProcessOutput {
            audio: EncodedAudio {
                sample_rate: target_rate,
                wav_base64,
            },
            samples,
            speed_applied,
            saved_to,
            persistence_error,
        })
    }

    fn apply_speed(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        config: &PostProcessConfig,
    ) -> Result<(Vec<f32>, f32)> {
        if config.speed == 1.0 {
            return Ok((samples, 1.0));
        }
        match &self.speed_capability {
            SpeedCapability::Available => {
                let out = change_speed(&samples, config.speed, sample_rate)?;
                info!("Transform the speed of the audio successfully.");
                Ok((out, config.speed))
            }
            SpeedCapability::Unavailable { reason } if config.allow_speed_fallback => {
                warn!(
                    "Speed {} requested but speed change is unavailable ({reason}); keeping speed 1.0",
                    config.speed
                );
                Ok((samples, 1.0))
            }
            SpeedCapability::Unavailable { .. } => {
                Err(TtsError::SpeedChangeUnsupported { speed: config.speed })
            }
        }
    }
}

/// Save in the container implied by the extension: `.wav` or `.pcm`.
pub fn save_audio(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => write_wav_file(path, samples, sample_rate),
        Some(ext) if ext.eq_ignore_ascii_case("pcm") => write_pcm_file(path, samples),
        _ => Err(TtsError::Persistence {
            path: path.to_path_buf(),
            message: "unsupported file extension, expected .wav or .pcm".to_string(),
        }),
    }
}
