//! The synthesis engine: one initialized model context, reused across
//! requests, serving one request at a time.

use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{Result, TtsError};
use crate::model::{AcousticKind, AcousticModel, TextFrontend, Vocoder};
use crate::postprocess::{PostProcessConfig, PostProcessOutput, PostProcessor, Waveform};
use crate::stream::{ChunkStream, StreamOptions, StreamTimings, TrimmedChunk};
use crate::wav::encode_pcm_base64;

/// Parameters of one synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisRequest {
    pub text: String,
    pub speaker_id: i64,
    pub speed: f32,
    pub volume: f32,
    /// 0 keeps the model's native rate.
    pub sample_rate: u32,
    pub save_path: Option<PathBuf>,
    pub allow_speed_fallback: bool,
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            speaker_id: 0,
            speed: 1.0,
            volume: 1.0,
            sample_rate: 0,
            save_path: None,
            allow_speed_fallback: false,
        }
    }
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn post_process_config(&self) -> PostProcessConfig {
        PostProcessConfig {
            target_sample_rate: self.sample_rate,
            volume: self.volume,
            speed: self.speed,
            output_path: self.save_path.clone(),
            allow_speed_fallback: self.allow_speed_fallback,
        }
    }
}

/// Request text given either directly or as base64-encoded UTF-8.
pub fn decode_text(text: Option<&str>, text_base64: Option<&str>) -> Result<String> {
    if let Some(encoded) = text_base64 {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| TtsError::InvalidRequest(format!("text is not valid base64: {e}")))?;
        return String::from_utf8(bytes)
            .map_err(|e| TtsError::InvalidRequest(format!("text is not valid UTF-8: {e}")));
    }
    text.map(str::to_string)
        .ok_or_else(|| TtsError::InvalidRequest("no text given".to_string()))
}

/// Owns the frontend and models. `run` borrows the engine mutably for the
/// lifetime of the returned stream, so one synthesis is in flight at a time.
pub struct TtsEngine {
    config: EngineConfig,
    kind: AcousticKind,
    speaker_count: Option<usize>,
    frontend: Box<dyn TextFrontend>,
    acoustic: Box<dyn AcousticModel>,
    vocoder: Box<dyn Vocoder>,
    post: PostProcessor,
}

impl std::fmt::Debug for TtsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsEngine")
            .field("config", &self.config)
            .field("frontend", &"<TextFrontend>")
            .field("acoustic", &"<AcousticModel>")
            .field("vocoder", &"<Vocoder>")
            .finish()
    }
}

impl TtsEngine {
    /// Build an engine from already constructed collaborators.
    pub fn new(
        config: EngineConfig,
        frontend: Box<dyn TextFrontend>,
        acoustic: Box<dyn AcousticModel>,
        vocoder: Box<dyn Vocoder>,
    ) -> Result<Self> {
        config.validate()?;
        let kind = config.acoustic_kind()?;
        if !frontend.supports(config.lang) {
            return Err(TtsError::Configuration(format!(
                "language '{}' is not supported by the text frontend",
                config.lang
            )));
        }
        if vocoder.upsample_ratio() != config.upsample_ratio {
            return Err(TtsError::Configuration(format!(
                "vocoder upsample ratio {} does not match configured {}",
                vocoder.upsample_ratio(),
                config.upsample_ratio
            )));
        }
        info!(
            "Initialize TTS engine: am={}, lang={}, device={}, am_block={}, am_pad={}, voc_block={}, voc_pad={}",
            kind, config.lang, config.device, config.am_block, config.am_pad, config.voc_block, config.voc_pad
        );
        Ok(Self {
            config,
            kind,
            speaker_count: None,
            frontend,
            acoustic,
            vocoder,
            post: PostProcessor::new(),
        })
    }

    /// Load the table frontend and the ONNX models named in `config`.
    #[cfg(feature = "onnx")]
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        use crate::config::required_path;
        use crate::frontend::{load_id_table, PhoneTableFrontend};
        use crate::onnx::{OnnxAcousticModel, OnnxVocoder};

        config.validate()?;
        let kind = config.acoustic_kind()?;
        let frontend = PhoneTableFrontend::from_files(
            config.lang,
            required_path("phones_dict", &config.phones_dict)?,
            config.tones_dict.as_deref(),
        )?;
        let acoustic = OnnxAcousticModel::load(
            required_path("am_model", &config.am_model)?,
            kind,
            &config.device,
        )?;
        let vocoder = OnnxVocoder::load(
            required_path("voc_model", &config.voc_model)?,
            config.upsample_ratio,
            &config.device,
        )?;
        let speaker_count = match &config.speaker_dict {
            Some(path) => Some(load_id_table(path)?.len()),
            None => None,
        };
        let engine = Self::new(config, Box::new(frontend), Box::new(acoustic), Box::new(vocoder))?;
        Ok(engine.with_speaker_count(speaker_count))
    }

    #[cfg(not(feature = "onnx"))]
    pub fn from_config(_config: EngineConfig) -> Result<Self> {
        Err(TtsError::Configuration(
            "built without the `onnx` feature; construct the engine with TtsEngine::new".to_string(),
        ))
    }

    /// Limit accepted speaker ids to `0..count` for multi-speaker models.
    pub fn with_speaker_count(mut self, count: Option<usize>) -> Self {
        self.speaker_count = count;
        self
    }

    pub fn with_post_processor(mut self, post: PostProcessor) -> Self {
        self.post = post;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn post_processor(&self) -> &PostProcessor {
        &self.post
    }

    fn check_request(&self, request: &SynthesisRequest) -> Result<()> {
        if request.text.trim().is_empty() {
            return Err(TtsError::InvalidRequest("Text cannot be empty".to_string()));
        }
        request.post_process_config().validate()?;
        // streamed chunks would otherwise go out at the wrong speed
        if request.speed != 1.0
            && !request.allow_speed_fallback
            && !self.post.speed_capability().is_available()
        {
            return Err(TtsError::SpeedChangeUnsupported { speed: request.speed });
        }
        if self.kind.is_multi_speaker() {
            let out_of_range = match self.speaker_count {
                Some(count) => request.speaker_id < 0 || request.speaker_id as usize >= count,
                None => request.speaker_id < 0,
            };
            if out_of_range {
                return Err(TtsError::InvalidRequest(format!(
                    "speaker id {} is out of range",
                    request.speaker_id
                )));
            }
        }
        Ok(())
    }

    /// Start streaming synthesis. Chunks are produced lazily as the stream
    /// is pulled; dropping it cancels the rest.
    pub fn run(&mut self, request: SynthesisRequest) -> Result<SynthesisStream<'_>> {
        self.check_request(&request)?;
        let options = StreamOptions {
            lang: self.config.lang,
            kind: self.kind.clone(),
            speaker_id: request.speaker_id,
            voc_block: self.config.voc_block,
            voc_pad: self.config.voc_pad,
        };
        let chunks = ChunkStream::new(
            self.frontend.as_ref(),
            self.acoustic.as_mut(),
            self.vocoder.as_mut(),
            &request.text,
            &options,
        )?;
        Ok(SynthesisStream {
            chunks,
            post: &self.post,
            sample_rate: self.config.sample_rate,
            request,
            waveform: Vec::new(),
            exhausted: false,
            failed: false,
        })
    }

    /// Synthesize the whole text and post-process it.
    pub fn synthesize(&mut self, request: SynthesisRequest) -> Result<PostProcessOutput> {
        let mut stream = self.run(request)?;
        stream.try_for_each_chunk(|_| Ok(()))?;
        stream.finish()
    }
}

/// Streaming synthesis of one request.
///
/// Yields each trimmed chunk as base64 16-bit PCM at the native rate. The
/// raw samples are accumulated so that, once the stream is exhausted,
/// [`SynthesisStream::finish`] can post-process the full waveform.
pub struct SynthesisStream<'a> {
    chunks: ChunkStream<'a>,
    post: &'a PostProcessor,
    sample_rate: u32,
    request: SynthesisRequest,
    waveform: Vec<f32>,
    exhausted: bool,
    failed: bool,
}

impl<'a> SynthesisStream<'a> {
    /// Next trimmed chunk with its raw samples.
    pub fn next_chunk(&mut self) -> Option<Result<TrimmedChunk>> {
        match self.chunks.next() {
            Some(Ok(chunk)) => {
                self.waveform.extend_from_slice(&chunk.samples);
                Some(Ok(chunk))
            }
            Some(Err(e)) => {
                self.failed = true;
                Some(Err(e))
            }
            None => {
                if !self.exhausted && !self.failed {
                    self.exhausted = true;
                    info!("The durations of audio is: {:.3} s", self.duration_secs());
                }
                None
            }
        }
    }

    fn try_for_each_chunk<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&TrimmedChunk) -> Result<()>,
    {
        while let Some(chunk) = self.next_chunk() {
            f(&chunk?)?;
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// True once every chunk was produced without error.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Duration of the audio produced so far; the total once exhausted.
    pub fn duration_secs(&self) -> f64 {
        self.waveform.len() as f64 / self.sample_rate as f64
    }

    pub fn timings(&self) -> &StreamTimings {
        self.chunks.timings()
    }

    /// Post-process everything streamed so far with the request's speed,
    /// volume, sample rate and save path. Call after exhausting the stream.
    pub fn finish(self) -> Result<PostProcessOutput> {
        if !self.exhausted {
            return Err(TtsError::InvalidRequest(
                "stream must be exhausted before finishing".to_string(),
            ));
        }
        let waveform = Waveform::new(self.waveform, self.sample_rate);
        self.post.process(&waveform, &self.request.post_process_config())
    }

    /// The native-rate waveform accumulated so far, without post-processing.
    pub fn into_waveform(self) -> Waveform {
        Waveform::new(self.waveform, self.sample_rate)
    }
}

impl Iterator for SynthesisStream<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        self.next_chunk()
            .map(|chunk| chunk.map(|c| encode_pcm_base64(&c.samples)))
    }
}
