//! A contiguous run of PCM samples at a known stream-absolute index.
//!
//! Chunks always live inside a channel. Where a later chunk overlaps an
//! earlier one, the later chunk's data wins; the overlapped tail of the
//! earlier chunk is never read or written (see
//! [`Channel`](crate::channel::Channel)).

use crate::pcm;
use crate::types::{Count, Pcm};

/// A contiguous block of samples starting at `start_index` in its
/// channel's absolute sample indexing.
#[derive(Debug, Clone)]
pub struct Chunk {
    start_index: Count,
    data: Box<[Pcm]>,
}

impl Chunk {
    /// A zero-filled chunk of `length` samples at `start_index`.
    pub fn new(start_index: Count, length: Count) -> Chunk {
        Chunk {
            start_index,
            data: vec![0.0; length.max(0) as usize].into_boxed_slice(),
        }
    }

    /// Adopt a caller-supplied buffer without copying.
    pub fn from_buffer(start_index: Count, buffer: Vec<Pcm>) -> Chunk {
        Chunk {
            start_index,
            data: buffer.into_boxed_slice(),
        }
    }

    pub fn start_index(&self) -> Count {
        self.start_index
    }

    pub fn length(&self) -> Count {
        self.data.len() as Count
    }

    /// One past the final sample index this chunk covers.
    pub fn end_index(&self) -> Count {
        self.start_index + self.length()
    }

    pub fn data(&self) -> &[Pcm] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Pcm] {
        &mut self.data
    }

    /// Zero the whole chunk.
    pub fn clear(&mut self) {
        pcm::clear(&mut self.data);
    }

    /// Ordering predicate for channel insertion.
    pub fn starts_later_than(&self, other: &Chunk) -> bool {
        self.start_index > other.start_index
    }
}
