//! A sparse, sample-indexed, monophonic PCM container.
//!
//! A channel holds a sequence of chunks sorted by start index, plus a
//! resumable cursor. Reads from regions where no chunk is defined yield
//! silence; writes to such regions are skipped and the write stops
//! early. When two chunks overlap, the one with the greater start index
//! wins for both reading and writing in the overlapped region.
//!
//! The traversal functions lift a per-chunk operation (a closure over a
//! raw sample slice) over one, two or three channels, clamping each
//! step to the chunks' valid lengths and applying the gap policy:
//! missing source data is zero-filled on the destination, a missing
//! destination chunk ends the operation (short write), and a closure
//! reporting [`Error::Silence`] has its destination region zeroed.

use crate::chunk::Chunk;
use crate::context::ChannelName;
use crate::error::{Error, Result};
use crate::pcm;
use crate::types::{Count, Pcm};

/// An operation on one chunk region: `(data, absolute_start, channel)`.
/// Returns the number of samples actually handled.
pub type ChunkFn<'a> = dyn FnMut(&mut [Pcm], Count, ChannelName) -> Result<Count> + 'a;

/// An operation between regions of two chunks:
/// `(src, dest, dest_absolute_start, channel)`.
pub type ChunkChunkFn<'a> =
    dyn FnMut(&mut [Pcm], &mut [Pcm], Count, ChannelName) -> Result<Count> + 'a;

/// An operation between regions of three chunks:
/// `(src1, src2, dest, dest_absolute_start, channel)`.
pub type ChunkChunkChunkFn<'a> =
    dyn FnMut(&mut [Pcm], &mut [Pcm], &mut [Pcm], Count, ChannelName) -> Result<Count> + 'a;

/// A monophonic sequence of chunks with a traversal cursor.
#[derive(Debug, Default)]
pub struct Channel {
    chunks: Vec<Chunk>,
    current_offset: Count,
    current_chunk: Option<usize>,
}

impl Clone for Channel {
    /// Cloning copies the chunk data; the cursor starts fresh.
    fn clone(&self) -> Channel {
        Channel {
            chunks: self.chunks.clone(),
            current_offset: 0,
            current_chunk: None,
        }
    }
}

impl Channel {
    pub fn new() -> Channel {
        Channel::default()
    }

    pub fn nr_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn current_offset(&self) -> Count {
        self.current_offset
    }

    /// Insert a chunk, keeping the list sorted by start index. Among
    /// chunks with equal start the newest lands last, so it wins
    /// overlap resolution.
    pub fn add_chunk(&mut self, chunk: Chunk) {
        let pos = self
            .chunks
            .iter()
            .position(|u| u.starts_later_than(&chunk))
            .unwrap_or(self.chunks.len());
        self.chunks.insert(pos, chunk);
        self.refresh_cursor();
    }

    /// Create and insert a zeroed chunk covering
    /// `[offset, offset + length)`.
    pub fn add_new_chunk(&mut self, offset: Count, length: Count) {
        self.add_chunk(Chunk::new(offset, length));
    }

    pub fn remove_chunk(&mut self, index: usize) -> Chunk {
        let chunk = self.chunks.remove(index);
        self.refresh_cursor();
        chunk
    }

    /// The length for which chunk `i` is valid: its own length, or the
    /// distance to the next chunk's start if that chunk cuts it off.
    fn valid_length(&self, i: usize) -> Count {
        let u = &self.chunks[i];
        match self.chunks.get(i + 1) {
            Some(next) => u.length().min(next.start_index() - u.start_index()),
            None => u.length(),
        }
    }

    /// Index of the chunk validly spanning `offset`, if any.
    fn index_at(&self, offset: Count) -> Option<usize> {
        (0..self.chunks.len()).find(|&i| {
            let u = &self.chunks[i];
            u.start_index() <= offset && u.start_index() + self.valid_length(i) > offset
        })
    }

    /// Index of the first chunk starting at or after `offset`.
    fn index_after(&self, offset: Count) -> Option<usize> {
        self.chunks
            .iter()
            .position(|u| u.start_index() >= offset)
    }

    fn refresh_cursor(&mut self) {
        self.current_chunk = self
            .index_at(self.current_offset)
            .or_else(|| self.index_after(self.current_offset));
    }

    /// Total extent: the end of the final chunk, or zero when empty.
    pub fn length(&self) -> Count {
        match self.chunks.last() {
            Some(last) => last.end_index(),
            None => 0,
        }
    }

    /// Position the cursor at `offset`.
    pub fn seek(&mut self, offset: Count) -> Count {
        self.current_offset = offset;
        self.refresh_cursor();
        offset
    }

    /// Zero up to `count` samples of defined data from the cursor. Gaps
    /// are skipped; the cursor always advances by the full `count`.
    pub fn write0(&mut self, count: Count) -> Count {
        let mut offset = self.current_offset;
        let mut remaining = count;

        while remaining > 0 {
            if let Some(i) = self.index_at(offset) {
                let u_start = self.chunks[i].start_index();
                let avail = self.valid_length(i) - (offset - u_start);
                let n = remaining.min(avail);
                let lo = (offset - u_start) as usize;
                pcm::clear(&mut self.chunks[i].data_mut()[lo..lo + n as usize]);
                offset += n;
                remaining -= n;
            } else if let Some(i) = self.index_after(offset) {
                let n = remaining.min(self.chunks[i].start_index() - offset);
                offset += n;
                remaining -= n;
            } else {
                break;
            }
        }

        self.current_offset += count;
        self.refresh_cursor();
        count
    }

    /// Apply `f` to up to `count` samples of consecutive chunks from
    /// the cursor. Stops early when the channel runs out of defined
    /// data; returns the number of samples handled.
    pub fn chunkfuncify(&mut self, count: Count, name: ChannelName, f: &mut ChunkFn) -> Count {
        let mut remaining = count;
        let mut funced = 0;

        while remaining > 0 {
            let Some(i) = self.index_at(self.current_offset) else {
                break; // channel incomplete
            };
            self.current_chunk = Some(i);

            let u_start = self.chunks[i].start_index();
            let avail = self.valid_length(i) - (self.current_offset - u_start);
            let n = remaining.min(avail);
            let lo = (self.current_offset - u_start) as usize;
            let range = lo..lo + n as usize;
            let abs = self.current_offset;

            let done = match f(&mut self.chunks[i].data_mut()[range.clone()], abs, name) {
                Ok(m) => m,
                Err(Error::Silence) => {
                    pcm::clear(&mut self.chunks[i].data_mut()[range]);
                    n
                }
                Err(_) => break,
            };
            if done <= 0 {
                break;
            }
            funced += done;
            remaining -= done;
            self.current_offset += done;
        }

        funced
    }
}

/// Apply `f` between corresponding regions of `src` and `dest` for up
/// to `count` samples, walking both cursors.
///
/// Zeroes are written to `dest` wherever `src` has no data; when `src`
/// has no further data at all, the remainder of `dest` is zero-filled
/// and the call returns. A missing `dest` chunk ends the operation
/// early.
pub fn chunk_chunk_funcify(
    src: &mut Channel,
    dest: &mut Channel,
    count: Count,
    name: ChannelName,
    f: &mut ChunkChunkFn,
) -> Count {
    let mut remaining = count;
    let mut funced = 0;

    while remaining > 0 {
        if dest.index_at(dest.current_offset).is_none() {
            return funced; // destination incomplete
        }

        if src.index_at(src.current_offset).is_none() {
            match src.index_after(src.current_offset) {
                None => {
                    // No further source data: silence out the rest.
                    let n = dest.write0(remaining);
                    return funced + n;
                }
                Some(i) => {
                    let gap = src.chunks[i].start_index() - src.current_offset;
                    let n = dest.write0(gap.min(remaining));
                    funced += n;
                    remaining -= n;
                    src.current_offset += n;
                    if remaining == 0 {
                        break;
                    }
                    if dest.index_at(dest.current_offset).is_none() {
                        return funced;
                    }
                }
            }
        }

        let si = match src.index_at(src.current_offset) {
            Some(i) => i,
            None => break, // zero-valid chunk at the cursor; no progress possible
        };
        let Some(di) = dest.index_at(dest.current_offset) else {
            return funced;
        };

        let s_start = src.chunks[si].start_index();
        let s_avail = src.valid_length(si) - (src.current_offset - s_start);
        let d_start = dest.chunks[di].start_index();
        let d_avail = dest.valid_length(di) - (dest.current_offset - d_start);
        let n = remaining.min(s_avail).min(d_avail);

        let s_lo = (src.current_offset - s_start) as usize;
        let d_lo = (dest.current_offset - d_start) as usize;
        let d_range = d_lo..d_lo + n as usize;
        let abs = dest.current_offset;

        let done = {
            let s = &mut src.chunks[si].data_mut()[s_lo..s_lo + n as usize];
            let d = &mut dest.chunks[di].data_mut()[d_range.clone()];
            match f(s, d, abs, name) {
                Ok(m) => m,
                Err(Error::Silence) => {
                    pcm::clear(d);
                    n
                }
                Err(_) => return funced,
            }
        };
        if done <= 0 {
            break;
        }
        funced += done;
        remaining -= done;
        src.current_offset += done;
        dest.current_offset += done;
    }

    src.refresh_cursor();
    dest.refresh_cursor();
    funced
}

/// Apply `f` between corresponding regions of `src1`, `src2` and
/// `dest`. The destination is zero-filled wherever either source is
/// undefined; a missing destination chunk ends the operation early.
pub fn chunk_chunk_chunk_funcify(
    src1: &mut Channel,
    src2: &mut Channel,
    dest: &mut Channel,
    count: Count,
    name: ChannelName,
    f: &mut ChunkChunkChunkFn,
) -> Count {
    let mut remaining = count;
    let mut funced = 0;

    while remaining > 0 {
        if dest.index_at(dest.current_offset).is_none() {
            return funced;
        }

        let s1 = src1
            .index_at(src1.current_offset)
            .or_else(|| src1.index_after(src1.current_offset));
        let s2 = src2
            .index_at(src2.current_offset)
            .or_else(|| src2.index_after(src2.current_offset));
        let (Some(i1), Some(i2)) = (s1, s2) else {
            let n = dest.write0(remaining);
            return funced + n;
        };

        let gap1 = (src1.chunks[i1].start_index() - src1.current_offset).max(0);
        let gap2 = (src2.chunks[i2].start_index() - src2.current_offset).max(0);
        let gap = gap1.max(gap2);
        if gap > 0 {
            let n = dest.write0(gap.min(remaining));
            funced += n;
            remaining -= n;
            src1.current_offset += n;
            src2.current_offset += n;
            if remaining == 0 {
                break;
            }
            if dest.index_at(dest.current_offset).is_none() {
                return funced;
            }
        }

        let (Some(i1), Some(i2)) = (
            src1.index_at(src1.current_offset),
            src2.index_at(src2.current_offset),
        ) else {
            break; // zero-valid chunk at a source cursor; no progress possible
        };
        let Some(di) = dest.index_at(dest.current_offset) else {
            return funced;
        };

        let a1 = src1.valid_length(i1)
            - (src1.current_offset - src1.chunks[i1].start_index());
        let a2 = src2.valid_length(i2)
            - (src2.current_offset - src2.chunks[i2].start_index());
        let ad = dest.valid_length(di)
            - (dest.current_offset - dest.chunks[di].start_index());
        let n = remaining.min(a1).min(a2).min(ad);

        let l1 = (src1.current_offset - src1.chunks[i1].start_index()) as usize;
        let l2 = (src2.current_offset - src2.chunks[i2].start_index()) as usize;
        let ld = (dest.current_offset - dest.chunks[di].start_index()) as usize;
        let abs = dest.current_offset;

        let done = {
            let a = &mut src1.chunks[i1].data_mut()[l1..l1 + n as usize];
            let b = &mut src2.chunks[i2].data_mut()[l2..l2 + n as usize];
            let d = &mut dest.chunks[di].data_mut()[ld..ld + n as usize];
            match f(a, b, d, abs, name) {
                Ok(m) => m,
                Err(Error::Silence) => {
                    pcm::clear(d);
                    n
                }
                Err(_) => return funced,
            }
        };
        if done <= 0 {
            break;
        }
        funced += done;
        remaining -= done;
        src1.current_offset += done;
        src2.current_offset += done;
        dest.current_offset += done;
    }

    src1.refresh_cursor();
    src2.refresh_cursor();
    dest.refresh_cursor();
    funced
}
