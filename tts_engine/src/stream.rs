//! Streaming synthesis helpers.
//!
//! [`ChunkStream`] drives the acoustic model sentence by sentence and the
//! vocoder chunk by chunk, yielding each trimmed chunk as soon as it is ready.
//! Nothing runs ahead of the caller: the acoustic model for a sentence is
//! invoked only when its first chunk is pulled, and chunk `i + 1` is vocoded
//! only after chunk `i` has been returned. Dropping the stream cancels the
//! remaining work.

use std::iter::FusedIterator;
use std::time::{Duration, Instant};

use ndarray::s;
use tracing::{debug, info};

use crate::chunk::{ChunkIter, ChunkPlan};
use crate::error::{Result, TtsError};
use crate::model::{
    AcousticInput, AcousticKind, AcousticModel, Language, PhoneticSentence, SpectralFrames,
    TextFrontend, Vocoder,
};
use crate::trim::trim_chunk;

/// Vocoder output for one chunk with its context trimmed away.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedChunk {
    /// Sentence this chunk belongs to.
    pub sentence: usize,
    /// Chunk index within the sentence.
    pub chunk: usize,
    /// Number of chunks in the sentence.
    pub chunk_count: usize,
    pub samples: Vec<f32>,
}

/// Wall-clock time spent in each stage so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamTimings {
    pub frontend: Duration,
    pub acoustic: Duration,
    pub vocoder: Duration,
    /// From stream creation to the first yielded chunk.
    pub first_chunk: Option<Duration>,
    pub chunks: usize,
    pub samples: usize,
}

/// Parameters of one streaming synthesis.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub lang: Language,
    pub kind: AcousticKind,
    pub speaker_id: i64,
    pub voc_block: usize,
    pub voc_pad: usize,
}

struct SentenceState {
    index: usize,
    frames: SpectralFrames,
    chunks: ChunkIter,
}

/// Pull-based generator of [`TrimmedChunk`]s for one piece of text.
pub struct ChunkStream<'a> {
    acoustic: &'a mut dyn AcousticModel,
    vocoder: &'a mut dyn Vocoder,
    sentences: Vec<PhoneticSentence>,
    speaker_id: Option<i64>,
    voc_block: usize,
    voc_pad: usize,
    upsample_ratio: usize,
    next_sentence: usize,
    current: Option<SentenceState>,
    finished: bool,
    started: Instant,
    timings: StreamTimings,
}

impl<'a> ChunkStream<'a> {
    /// Run the frontend and prepare the stream. No model is invoked yet.
    ///
    /// Fails with [`TtsError::Configuration`] when the frontend does not
    /// support `options.lang` or the chunking parameters are unusable.
    pub fn new(
        frontend: &dyn TextFrontend,
        acoustic: &'a mut dyn AcousticModel,
        vocoder: &'a mut dyn Vocoder,
        text: &str,
        options: &StreamOptions,
    ) -> Result<Self> {
        let started = Instant::now();

        if !frontend.supports(options.lang) {
            return Err(TtsError::Configuration(format!(
                "language '{}' is not supported by the text frontend",
                options.lang
            )));
        }
        // validates block > 0 before any model work
        ChunkPlan::new(0, options.voc_block, options.voc_pad)?;
        let upsample_ratio = vocoder.upsample_ratio();
        if upsample_ratio == 0 {
            return Err(TtsError::Configuration(
                "vocoder upsample ratio must be greater than 0".to_string(),
            ));
        }

        let with_tones = options.kind.needs_tones();
        let sentences = frontend.to_phonetic(text, options.lang, with_tones)?;
        if with_tones && sentences.iter().any(|s| s.tone_ids.is_none()) {
            return Err(TtsError::Configuration(format!(
                "acoustic model {} needs tone ids but the frontend produced none",
                options.kind
            )));
        }
        let frontend_time = started.elapsed();
        debug!(
            "Frontend produced {} sentence(s) in {:.3}s",
            sentences.len(),
            frontend_time.as_secs_f64()
        );

        Ok(Self {
            acoustic,
            vocoder,
            sentences,
            speaker_id: options.kind.is_multi_speaker().then_some(options.speaker_id),
            voc_block: options.voc_block,
            voc_pad: options.voc_pad,
            upsample_ratio,
            next_sentence: 0,
            current: None,
            finished: false,
            started,
            timings: StreamTimings {
                frontend: frontend_time,
                ..StreamTimings::default()
            },
        })
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn upsample_ratio(&self) -> usize {
        self.upsample_ratio
    }

    pub fn timings(&self) -> &StreamTimings {
        &self.timings
    }

    fn fail(&mut self, err: TtsError) -> Option<Result<TrimmedChunk>> {
        self.finished = true;
        self.current = None;
        Some(Err(err))
    }

    /// Run the acoustic model for the next sentence. `false` once all
    /// sentences are consumed.
    fn advance_sentence(&mut self) -> Result<bool> {
        let Some(sentence) = self.sentences.get(self.next_sentence) else {
            return Ok(false);
        };
        let index = self.next_sentence;
        self.next_sentence += 1;

        let input = AcousticInput {
            phone_ids: &sentence.phone_ids,
            tone_ids: sentence.tone_ids.as_deref(),
            speaker_id: self.speaker_id,
        };
        let am_start = Instant::now();
        let frames = self.acoustic.infer(&input)?;
        let am_time = am_start.elapsed();
        self.timings.acoustic += am_time;

        let plan = ChunkPlan::new(frames.nrows(), self.voc_block, self.voc_pad)?;
        debug!(
            "Sentence {}: {} frames -> {} chunk(s), acoustic model took {:.3}s",
            index,
            frames.nrows(),
            plan.chunk_count(),
            am_time.as_secs_f64()
        );
        self.current = Some(SentenceState {
            index,
            frames,
            chunks: plan.iter(),
        });
        Ok(true)
    }

    fn log_summary(&self) {
        let t = &self.timings;
        info!(
            "Streamed {} chunk(s), {} samples: frontend {:.3}s, acoustic {:.3}s, vocoder {:.3}s, first chunk {}",
            t.chunks,
            t.samples,
            t.frontend.as_secs_f64(),
            t.acoustic.as_secs_f64(),
            t.vocoder.as_secs_f64(),
            t.first_chunk
                .map(|d| format!("{:.3}s", d.as_secs_f64()))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
}

impl Iterator for ChunkStream<'_> {
    type Item = Result<TrimmedChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(state) = self.current.as_mut() {
                if let Some(chunk) = state.chunks.next() {
                    let voc_start = Instant::now();
                    let window = state.frames.slice(s![chunk.extended.clone(), ..]);
                    let trimmed = self
                        .vocoder
                        .infer(window)
                        .and_then(|raw| trim_chunk(raw, &chunk, self.upsample_ratio));
                    let samples = match trimmed {
                        Ok(samples) => samples,
                        Err(e) => return self.fail(e),
                    };
                    let voc_time = voc_start.elapsed();

                    self.timings.vocoder += voc_time;
                    self.timings.chunks += 1;
                    self.timings.samples += samples.len();
                    if self.timings.first_chunk.is_none() {
                        let latency = self.started.elapsed();
                        self.timings.first_chunk = Some(latency);
                        debug!("First chunk ready after {:.3}s", latency.as_secs_f64());
                    }
                    debug!(
                        "Sentence {} chunk {}/{}: {} samples in {:.3}s",
                        state.index,
                        chunk.index + 1,
                        chunk.count,
                        samples.len(),
                        voc_time.as_secs_f64()
                    );

                    return Some(Ok(TrimmedChunk {
                        sentence: state.index,
                        chunk: chunk.index,
                        chunk_count: chunk.count,
                        samples,
                    }));
                }
                self.current = None;
            }

            match self.advance_sentence() {
                Ok(true) => continue,
                Ok(false) => {
                    self.finished = true;
                    self.log_summary();
                    return None;
                }
                Err(e) => return self.fail(e),
            }
        }
    }
}

impl FusedIterator for ChunkStream<'_> {}
