//! Word-aligned byte storage shared by host tensors and pool slots.
//!
//! Element views are produced with `bytemuck` casts, which require the
//! backing allocation to be aligned for the target scalar. `Vec<u8>` gives
//! no such guarantee, so storage is held as `u64` words and exposed as a
//! byte slice of the logical length.

use crate::error::{EngineError, EngineResult};

/// Heap buffer aligned to 8 bytes, sufficient for every supported dtype.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AlignedBytes {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBytes {
    /// Allocates a zero-filled buffer, surfacing allocator exhaustion as
    /// [`EngineError::OutOfMemory`] instead of aborting the process.
    pub(crate) fn try_zeroed(len: usize) -> EngineResult<Self> {
        let word_count = len.div_ceil(8);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| EngineError::OutOfMemory { requested: len })?;
        words.resize(word_count, 0);
        Ok(AlignedBytes { words, len })
    }

    /// Infallible variant for host-sized buffers.
    pub(crate) fn zeroed(len: usize) -> Self {
        let word_count = len.div_ceil(8);
        AlignedBytes {
            words: vec![0u64; word_count],
            len,
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = Self::zeroed(bytes.len());
        buf.as_bytes_mut().copy_from_slice(bytes);
        buf
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }
}
