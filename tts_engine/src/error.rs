use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the synthesis engine.
#[derive(Debug, Error)]
pub enum TtsError {
    /// Unsupported language, missing model files, unusable device or invalid
    /// chunking parameters. Fatal to engine initialization.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A non-default speed was requested but this build cannot change speed.
    #[error("Speed change to {speed} is not supported on this platform; request speed 1.0")]
    SpeedChangeUnsupported { speed: f32 },

    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Writing the optional output file failed. Reported next to the encoded
    /// result, never as the request's error.
    #[error("Failed to save audio to {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    /// Acoustic model or vocoder failure. Aborts the current request.
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, TtsError>;

impl From<hound::Error> for TtsError {
    fn from(e: hound::Error) -> Self {
        TtsError::Encoding(format!("wav write err: {e}"))
    }
}
