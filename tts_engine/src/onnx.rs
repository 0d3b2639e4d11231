//! ONNX Runtime backends for exported acoustic models and vocoders.
//!
//! Input names follow the PaddleSpeech static-graph exports: `text`
//! (+ `spk_id`) for FastSpeech2, `phones` + `tones` for SpeedySpeech and
//! `logmel` for the vocoders.

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::error::{Result, TtsError};
use crate::model::{AcousticInput, AcousticKind, AcousticModel, SpectralFrames, Vocoder};

fn load_session(path: &Path, device: &str) -> Result<Session> {
    if device != "cpu" {
        return Err(TtsError::Configuration(format!(
            "device '{device}' is unavailable, only 'cpu' is supported"
        )));
    }
    let session = Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| {
            TtsError::Configuration(format!("Failed to load model {}: {e}", path.display()))
        })?;
    info!("Loaded ONNX model {} on {device}", path.display());
    Ok(session)
}

fn infer_err(e: ort::Error) -> TtsError {
    TtsError::Inference(e.to_string())
}

pub struct OnnxAcousticModel {
    session: Session,
    kind: AcousticKind,
}

impl OnnxAcousticModel {
    pub fn load(path: &Path, kind: AcousticKind, device: &str) -> Result<Self> {
        Ok(Self {
            session: load_session(path, device)?,
            kind,
        })
    }
}

impl AcousticModel for OnnxAcousticModel {
    fn infer(&mut self, input: &AcousticInput<'_>) -> Result<SpectralFrames> {
        let len = input.phone_ids.len();
        let phones = Tensor::from_array(([len], input.phone_ids.to_vec())).map_err(infer_err)?;

        let outputs = if self.kind.needs_tones() {
            let tone_ids = input.tone_ids.ok_or_else(|| {
                TtsError::Inference(format!("{} needs tone ids", self.kind))
            })?;
            let tones = Tensor::from_array(([tone_ids.len()], tone_ids.to_vec())).map_err(infer_err)?;
            self.session
                .run(inputs!["phones" => phones, "tones" => tones])
                .map_err(infer_err)?
        } else if let Some(speaker_id) = input.speaker_id {
            let spk = Tensor::from_array(([1usize], vec![speaker_id])).map_err(infer_err)?;
            self.session
                .run(inputs!["text" => phones, "spk_id" => spk])
                .map_err(infer_err)?
        } else {
            self.session
                .run(inputs!["text" => phones])
                .map_err(infer_err)?
        };

        let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(infer_err)?;
        let dims = shape.to_vec();
        // [frames, bins], optionally with a leading batch axis of 1
        let (frames, bins) = match dims.as_slice() {
            [f, b] | [1, f, b] => (*f as usize, *b as usize),
            other => {
                return Err(TtsError::Inference(format!(
                    "unexpected acoustic model output shape {other:?}"
                )))
            }
        };
        Array2::from_shape_vec((frames, bins), data.to_vec())
            .map_err(|e| TtsError::Inference(format!("acoustic output: {e}")))
    }
}

pub struct OnnxVocoder {
    session: Session,
    upsample_ratio: usize,
}

impl OnnxVocoder {
    pub fn load(path: &Path, upsample_ratio: usize, device: &str) -> Result<Self> {
        Ok(Self {
            session: load_session(path, device)?,
            upsample_ratio,
        })
    }
}

impl Vocoder for OnnxVocoder {
    fn upsample_ratio(&self) -> usize {
        self.upsample_ratio
    }

    fn infer(&mut self, frames: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        let (rows, cols) = frames.dim();
        let data: Vec<f32> = frames.iter().copied().collect();
        let mel = Tensor::from_array(([rows, cols], data)).map_err(infer_err)?;
        let outputs = self
            .session
            .run(inputs!["logmel" => mel])
            .map_err(infer_err)?;
        let (_, wav) = outputs[0].try_extract_tensor::<f32>().map_err(infer_err)?;
        Ok(wav.to_vec())
    }
}
