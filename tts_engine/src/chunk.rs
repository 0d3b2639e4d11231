//! Splitting a spectral frame sequence into overlapping vocoder windows.
//!
//! Every chunk owns a *core* range of frames. The core ranges of all chunks
//! partition `[0, len)` in order. The frames actually handed to the vocoder
//! (the *extended* range) add up to `pad` frames of context on each side,
//! clipped at the sequence boundaries.

use std::ops::Range;

use crate::error::{Result, TtsError};

/// Where a chunk sits in its sequence. Decides which edges get trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPosition {
    /// The sequence fits in a single chunk: first and last at once.
    Only,
    First,
    Interior,
    Last,
}

/// One vocoder window over a frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Index of this chunk in the sequence.
    pub index: usize,
    /// Total number of chunks in the sequence.
    pub count: usize,
    /// Frames this chunk contributes to the output.
    pub core: Range<usize>,
    /// Frames fed to the vocoder: `core` plus clipped context.
    pub extended: Range<usize>,
}

impl Chunk {
    pub fn core_len(&self) -> usize {
        self.core.len()
    }

    /// Context frames actually available before the core.
    pub fn front_pad(&self) -> usize {
        self.core.start - self.extended.start
    }

    /// Context frames actually available after the core.
    pub fn back_pad(&self) -> usize {
        self.extended.end - self.core.end
    }

    pub fn position(&self) -> ChunkPosition {
        let first = self.index == 0;
        let last = self.index + 1 == self.count;
        match (first, last) {
            (true, true) => ChunkPosition::Only,
            (true, false) => ChunkPosition::First,
            (false, true) => ChunkPosition::Last,
            (false, false) => ChunkPosition::Interior,
        }
    }
}

/// Chunk layout for a sequence of `len` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    len: usize,
    block: usize,
    pad: usize,
}

impl ChunkPlan {
    /// `block` must be positive; `pad` may exceed the available context and
    /// is clipped per chunk.
    pub fn new(len: usize, block: usize, pad: usize) -> Result<Self> {
        if block == 0 {
            return Err(TtsError::Configuration(
                "chunk block size must be greater than 0".to_string(),
            ));
        }
        Ok(Self { len, block, pad })
    }

    /// Number of chunks: `ceil(len / block)`. Zero for an empty sequence.
    pub fn chunk_count(&self) -> usize {
        self.len.div_ceil(self.block)
    }

    pub fn frame_count(&self) -> usize {
        self.len
    }

    /// The `i`-th chunk, or `None` past the end.
    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        let count = self.chunk_count();
        if index >= count {
            return None;
        }
        let start = index * self.block;
        let end = start.saturating_add(self.block).min(self.len);
        // front context is min(i * block, pad)
        let ext_start = start - start.min(self.pad);
        let ext_end = end.saturating_add(self.pad).min(self.len);
        Some(Chunk {
            index,
            count,
            core: start..end,
            extended: ext_start..ext_end,
        })
    }

    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: 0,
        }
    }
}

impl IntoIterator for ChunkPlan {
    type Item = Chunk;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> ChunkIter {
        self.iter()
    }
}

/// Iterator over the chunks of a [`ChunkPlan`], in index order.
#[derive(Debug, Clone)]
pub struct ChunkIter {
    plan: ChunkPlan,
    next: usize,
}

impl Iterator for ChunkIter {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let chunk = self.plan.chunk(self.next)?;
        self.next += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.plan.chunk_count().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_chunks_with_clipped_padding() {
        let plan = ChunkPlan::new(50, 42, 12).unwrap();
        let chunks: Vec<Chunk> = plan.iter().collect();
        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].core, 0..42);
        assert_eq!(chunks[0].extended, 0..50);
        assert_eq!(chunks[0].front_pad(), 0);
        assert_eq!(chunks[0].back_pad(), 8);
        assert_eq!(chunks[0].position(), ChunkPosition::First);

        assert_eq!(chunks[1].core, 42..50);
        assert_eq!(chunks[1].extended, 30..50);
        assert_eq!(chunks[1].front_pad(), 12);
        assert_eq!(chunks[1].back_pad(), 0);
        assert_eq!(chunks[1].position(), ChunkPosition::Last);
    }

    #[test]
    fn test_short_sequence_is_single_chunk() {
        let plan = ChunkPlan::new(10, 42, 12).unwrap();
        let chunks: Vec<Chunk> = plan.iter().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].core, 0..10);
        assert_eq!(chunks[0].extended, 0..10);
        assert_eq!(chunks[0].position(), ChunkPosition::Only);
    }

    #[test]
    fn test_empty_sequence_has_no_chunks() {
        let plan = ChunkPlan::new(0, 14, 14).unwrap();
        assert_eq!(plan.chunk_count(), 0);
        assert!(plan.iter().next().is_none());
    }

    #[test]
    fn test_zero_block_rejected() {
        assert!(matches!(
            ChunkPlan::new(10, 0, 2),
            Err(TtsError::Configuration(_))
        ));
    }

    #[test]
    fn test_interior_chunk_has_both_pads() {
        let plan = ChunkPlan::new(100, 14, 14).unwrap();
        let chunk = plan.chunk(3).unwrap();
        assert_eq!(chunk.core, 42..56);
        assert_eq!(chunk.extended, 28..70);
        assert_eq!(chunk.position(), ChunkPosition::Interior);
        assert!(plan.chunk(plan.chunk_count()).is_none());
    }

    #[test]
    fn test_huge_pad_and_block_clip_to_sequence() {
        let plan = ChunkPlan::new(50, 14, usize::MAX).unwrap();
        let chunk = plan.chunk(1).unwrap();
        assert_eq!(chunk.core, 14..28);
        assert_eq!(chunk.extended, 0..50);

        let plan = ChunkPlan::new(50, usize::MAX, usize::MAX).unwrap();
        let chunks: Vec<Chunk> = plan.iter().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].core, 0..50);
        assert_eq!(chunks[0].extended, 0..50);
    }

    #[test]
    fn test_core_ranges_partition_sequence() {
        for len in 0..60 {
            for block in 1..20 {
                for pad in [0, 1, 3, 14, 40] {
                    let plan = ChunkPlan::new(len, block, pad).unwrap();
                    let mut cursor = 0;
                    let mut seen = 0;
                    for chunk in plan.iter() {
                        assert_eq!(chunk.core.start, cursor, "gap or overlap at len={len} block={block} pad={pad}");
                        assert!(!chunk.core.is_empty());
                        assert!(chunk.extended.start <= chunk.core.start);
                        assert!(chunk.extended.end >= chunk.core.end);
                        assert!(chunk.extended.end <= len);
                        assert_eq!(chunk.front_pad(), (chunk.index * block).min(pad));
                        cursor = chunk.core.end;
                        seen += 1;
                    }
                    assert_eq!(cursor, len);
                    assert_eq!(seen, len.div_ceil(block));
                    assert_eq!(plan.iter().len(), seen);
                }
            }
        }
    }
}
