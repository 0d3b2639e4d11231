//! Common utilities for integration tests

#![allow(dead_code)]

use axum::Router;
use ndarray::{Array2, ArrayView2};
use tts_engine::{
    AcousticInput, AcousticModel, EngineConfig, Language, PhoneticSentence, PostProcessor,
    SpectralFrames, TextFrontend, TtsEngine, TtsError, Vocoder,
};
use tts_server::config::ServerConfig;
use tts_server::{router, AppState};

pub const RATIO: usize = 12;
pub const FRAMES_PER_PHONE: usize = 4;
pub const SAMPLE_RATE: u32 = 24000;

/// One phone per character; `|` separates sentences. `!` is rejected.
pub struct CharFrontend;

impl TextFrontend for CharFrontend {
    fn supports(&self, lang: Language) -> bool {
        lang == Language::Zh
    }

    fn to_phonetic(&self, text: &str, _lang: Language, _with_tones: bool) -> tts_engine::Result<Vec<PhoneticSentence>> {
        if text.contains('!') {
            return Err(TtsError::InvalidRequest("unknown phone symbol '!'".to_string()));
        }
        Ok(text
            .split('|')
            .filter(|s| !s.trim().is_empty())
            .map(|s| PhoneticSentence {
                phone_ids: s.chars().map(|c| c as i64).collect(),
                tone_ids: None,
            })
            .collect())
    }
}

pub struct SineAcoustic;

impl AcousticModel for SineAcoustic {
    fn infer(&mut self, input: &AcousticInput<'_>) -> tts_engine::Result<SpectralFrames> {
        let frames = input.phone_ids.len() * FRAMES_PER_PHONE;
        Ok(Array2::from_shape_fn((frames, 2), |(r, _)| r as f32))
    }
}

/// A quiet 440 Hz tone, phase-continuous across frames.
pub struct SineVocoder;

impl Vocoder for SineVocoder {
    fn upsample_ratio(&self) -> usize {
        RATIO
    }

    fn infer(&mut self, frames: ArrayView2<'_, f32>) -> tts_engine::Result<Vec<f32>> {
        Ok(frames
            .rows()
            .into_iter()
            .flat_map(|row| {
                let base = row[0] as usize * RATIO;
                (0..RATIO).map(move |k| {
                    let t = (base + k) as f32 / SAMPLE_RATE as f32;
                    0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                })
            })
            .collect())
    }
}

pub fn test_engine() -> TtsEngine {
    let config = EngineConfig {
        voc_block: 8,
        voc_pad: 4,
        sample_rate: SAMPLE_RATE,
        upsample_ratio: RATIO,
        ..EngineConfig::default()
    };
    TtsEngine::new(
        config,
        Box::new(CharFrontend),
        Box::new(SineAcoustic),
        Box::new(SineVocoder),
    )
    .expect("test engine")
}

pub fn test_state_with(engine: TtsEngine) -> AppState {
    AppState::new(engine, ServerConfig::default())
}

pub fn test_state() -> AppState {
    test_state_with(test_engine())
}

/// Create a test app instance
pub fn create_test_app() -> Router {
    router(test_state())
}

pub fn create_test_app_with_post(post: PostProcessor) -> Router {
    router(test_state_with(test_engine().with_post_processor(post)))
}

/// Native-rate samples the fake models produce for `phones` phones.
pub fn expected_samples(phones: usize) -> usize {
    phones * FRAMES_PER_PHONE * RATIO
}
