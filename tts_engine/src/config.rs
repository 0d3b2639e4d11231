//! Engine configuration, loaded from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};
use crate::model::{AcousticKind, Language};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inference device. Only `cpu` is available.
    pub device: String,
    /// Acoustic model name, `<arch>_<dataset>`.
    pub am: String,
    pub am_model: Option<PathBuf>,
    pub voc_model: Option<PathBuf>,
    pub phones_dict: Option<PathBuf>,
    pub tones_dict: Option<PathBuf>,
    pub speaker_dict: Option<PathBuf>,
    pub lang: Language,
    pub am_block: usize,
    pub am_pad: usize,
    pub voc_block: usize,
    pub voc_pad: usize,
    /// Native sample rate of the vocoder output.
    pub sample_rate: u32,
    /// Samples per spectral frame (the vocoder hop size).
    pub upsample_ratio: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            am: "fastspeech2_csmsc".to_string(),
            am_model: None,
            voc_model: None,
            phones_dict: None,
            tones_dict: None,
            speaker_dict: None,
            lang: Language::Zh,
            am_block: 42,
            am_pad: 12,
            voc_block: 14,
            voc_pad: 14,
            sample_rate: 24000,
            upsample_ratio: 300,
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file.
    pub fn from_file<P: AsRef<Path>>(p: P) -> Result<Self> {
        let path = p.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            TtsError::Configuration(format!("Failed to load {}: {e}", path.display()))
        })?;
        let config: EngineConfig = serde_json::from_str(&text).map_err(|e| {
            TtsError::Configuration(format!("{} is not a valid engine config: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn acoustic_kind(&self) -> Result<AcousticKind> {
        self.am.parse()
    }

    pub fn validate(&self) -> Result<()> {
        let kind = self.acoustic_kind()?;
        if self.am_block == 0 || self.voc_block == 0 {
            return Err(TtsError::Configuration(
                "am_block and voc_block must be greater than 0".to_string(),
            ));
        }
        if self.sample_rate == 0 || self.upsample_ratio == 0 {
            return Err(TtsError::Configuration(
                "sample_rate and upsample_ratio must be greater than 0".to_string(),
            ));
        }
        if kind.needs_tones() && self.phones_dict.is_some() && self.tones_dict.is_none() {
            return Err(TtsError::Configuration(format!(
                "acoustic model {kind} needs tones_dict"
            )));
        }
        for path in [
            &self.am_model,
            &self.voc_model,
            &self.phones_dict,
            &self.tones_dict,
            &self.speaker_dict,
        ]
        .into_iter()
        .flatten()
        {
            if !path.exists() {
                return Err(TtsError::Configuration(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// A path the built-in backends cannot work without.
#[cfg(feature = "onnx")]
pub(crate) fn required_path<'a>(field: &'static str, value: &'a Option<PathBuf>) -> Result<&'a Path> {
    value
        .as_deref()
        .ok_or_else(|| TtsError::Configuration(format!("missing '{field}' in engine config")))
}
