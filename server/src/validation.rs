use std::path::{Path, PathBuf};

use serde::Deserialize;
use tts_engine::{decode_text, SynthesisRequest};

use crate::error::ApiError;

/// Maximum text length for TTS requests
const MAX_TEXT_LENGTH: usize = 5000;
const MIN_SPEED: f32 = 0.5;
const MAX_SPEED: f32 = 2.0;
const MAX_VOLUME: f32 = 3.0;
/// Accepted target sample rates; 0 keeps the model's rate.
const SAMPLE_RATES: [u32; 3] = [0, 8000, 16000];

/// Body of `POST /tts`, and the first message of a streaming session.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsRequest {
    pub text: Option<String>,
    /// Alternative to `text`: base64-encoded UTF-8.
    pub text_base64: Option<String>,
    #[serde(default)]
    pub spk_id: i64,
    #[serde(default = "unit")]
    pub speed: f32,
    #[serde(default = "unit")]
    pub volume: f32,
    #[serde(default)]
    pub sample_rate: u32,
    pub save_path: Option<String>,
    #[serde(default)]
    pub allow_speed_fallback: bool,
}

fn unit() -> f32 {
    1.0
}

impl TtsRequest {
    /// Decode and validate into an engine request.
    pub fn into_synthesis_request(self) -> Result<SynthesisRequest, ApiError> {
        let text = decode_text(self.text.as_deref(), self.text_base64.as_deref())?;
        validate_text(&text)?;
        validate_params(self.speed, self.volume, self.sample_rate)?;
        let save_path = self.save_path.as_deref().map(validate_save_path).transpose()?;
        Ok(SynthesisRequest {
            text,
            speaker_id: self.spk_id,
            speed: self.speed,
            volume: self.volume,
            sample_rate: self.sample_rate,
            save_path,
            allow_speed_fallback: self.allow_speed_fallback,
        })
    }
}

pub fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_params(speed: f32, volume: f32, sample_rate: u32) -> Result<(), ApiError> {
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(ApiError::InvalidInput(format!(
            "speed must be in [{MIN_SPEED}, {MAX_SPEED}], got {speed}"
        )));
    }
    if !(0.0..=MAX_VOLUME).contains(&volume) {
        return Err(ApiError::InvalidInput(format!(
            "volume must be in [0, {MAX_VOLUME}], got {volume}"
        )));
    }
    if !SAMPLE_RATES.contains(&sample_rate) {
        return Err(ApiError::InvalidInput(format!(
            "sample_rate must be one of {SAMPLE_RATES:?}, got {sample_rate}"
        )));
    }
    Ok(())
}

pub fn validate_save_path(path: &str) -> Result<PathBuf, ApiError> {
    let path = Path::new(path);
    match path.extension().and_then(|e| e.to_str()) {
        Some("wav") | Some("pcm") => Ok(path.to_path_buf()),
        _ => Err(ApiError::InvalidInput(format!(
            "save_path must end with .wav or .pcm: {}",
            path.display()
        ))),
    }
}
