//! Chunked streaming text-to-speech.
//!
//! An acoustic model turns phonetic input into spectral frames, which are
//! split into overlapping windows and vocoded one window at a time. Each
//! window's context samples are trimmed away so the stitched audio matches a
//! non-chunked synthesis, and every trimmed chunk is handed to the caller as
//! soon as it exists. The full waveform can then be resampled, scaled,
//! sped up or slowed down, encoded and saved.

pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod postprocess;
pub mod resample;
pub mod stream;
pub mod tempo;
pub mod trim;
pub mod wav;

pub use chunk::{Chunk, ChunkPlan, ChunkPosition};
pub use config::EngineConfig;
pub use engine::{decode_text, SynthesisRequest, SynthesisStream, TtsEngine};
pub use error::{Result, TtsError};
pub use frontend::PhoneTableFrontend;
pub use model::{
    AcousticInput, AcousticKind, AcousticModel, Language, PhoneticSentence, SpectralFrames,
    TextFrontend, Vocoder,
};
pub use postprocess::{EncodedAudio, PostProcessConfig, PostProcessOutput, PostProcessor, Waveform};
pub use stream::{ChunkStream, StreamTimings, TrimmedChunk};
pub use tempo::SpeedCapability;
