//! Interfaces to the external collaborators: text frontend, acoustic model
//! and vocoder.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};

/// Spectral frames for one sentence, shape `(frames, bins)`.
pub type SpectralFrames = Array2<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zh" => Ok(Language::Zh),
            "en" => Ok(Language::En),
            other => Err(TtsError::Configuration(format!(
                "unsupported language '{other}', expected one of: zh, en"
            ))),
        }
    }
}

/// Acoustic model identity, written `<arch>_<dataset>` (e.g. `fastspeech2_csmsc`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcousticKind {
    pub arch: String,
    pub dataset: String,
}

impl AcousticKind {
    /// Tone-aware architectures take a tone id per phone.
    pub fn needs_tones(&self) -> bool {
        self.arch == "speedyspeech"
    }

    /// Multi-speaker datasets take a speaker id.
    pub fn is_multi_speaker(&self) -> bool {
        matches!(self.dataset.as_str(), "aishell3" | "vctk")
    }
}

impl FromStr for AcousticKind {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once('_') {
            Some((arch, dataset)) if !arch.is_empty() && !dataset.is_empty() => Ok(Self {
                arch: arch.to_string(),
                dataset: dataset.to_string(),
            }),
            _ => Err(TtsError::Configuration(format!(
                "acoustic model name '{s}' must look like <arch>_<dataset>"
            ))),
        }
    }
}

impl fmt::Display for AcousticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.arch, self.dataset)
    }
}

/// Token ids for one sentence as produced by the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneticSentence {
    pub phone_ids: Vec<i64>,
    /// Present only when tones were requested.
    pub tone_ids: Option<Vec<i64>>,
}

/// Everything the acoustic model receives for one sentence.
#[derive(Debug, Clone, Copy)]
pub struct AcousticInput<'a> {
    pub phone_ids: &'a [i64],
    pub tone_ids: Option<&'a [i64]>,
    pub speaker_id: Option<i64>,
}

/// Text to phonetic token sequences, one per sentence.
pub trait TextFrontend: Send {
    fn supports(&self, lang: Language) -> bool;

    fn to_phonetic(&self, text: &str, lang: Language, with_tones: bool)
        -> Result<Vec<PhoneticSentence>>;
}

/// Phonetic tokens to spectral frames.
pub trait AcousticModel: Send {
    fn infer(&mut self, input: &AcousticInput<'_>) -> Result<SpectralFrames>;
}

/// Spectral frames to waveform samples.
pub trait Vocoder: Send {
    /// Samples produced per input frame.
    fn upsample_ratio(&self) -> usize;

    /// Must return `frames.nrows() * upsample_ratio()` samples.
    fn infer(&mut self, frames: ArrayView2<'_, f32>) -> Result<Vec<f32>>;
}
