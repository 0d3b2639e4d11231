//! Cutting the context-derived samples off a vocoded chunk.

use std::ops::Range;

use crate::chunk::{Chunk, ChunkPosition};
use crate::error::{Result, TtsError};

/// Sample range of a chunk's raw vocoder output that belongs to its core.
///
/// `raw_len` is only consulted for the last chunk, which keeps everything
/// after its front context.
pub fn keep_range(chunk: &Chunk, raw_len: usize, upsample_ratio: usize) -> Range<usize> {
    let skip = chunk.front_pad() * upsample_ratio;
    let core = chunk.core_len() * upsample_ratio;
    match chunk.position() {
        ChunkPosition::First => 0..core,
        ChunkPosition::Interior => skip..skip + core,
        ChunkPosition::Last | ChunkPosition::Only => skip..raw_len.max(skip),
    }
}

/// Trim `raw` (the vocoder output for `chunk.extended`) down to the samples
/// produced by the chunk's core frames.
pub fn trim_chunk(mut raw: Vec<f32>, chunk: &Chunk, upsample_ratio: usize) -> Result<Vec<f32>> {
    let range = keep_range(chunk, raw.len(), upsample_ratio);
    if range.end > raw.len() {
        return Err(TtsError::Inference(format!(
            "vocoder returned {} samples for chunk {}/{}, expected at least {}",
            raw.len(),
            chunk.index + 1,
            chunk.count,
            range.end
        )));
    }
    raw.truncate(range.end);
    raw.drain(..range.start);
    Ok(raw)
}
