//! A multichannel, sparse PCM container.
//!
//! A stream maps channel names to channels; all channels of one stream
//! are parallel spatialised voices of the same signal. Stream-level
//! operations lift the channel traversals over every channel present
//! in both the stream and the ambient channel set, and keep the
//! channels aligned by advancing the stream cursor by the minimum of
//! the individual channel advances.
//!
//! Streams also implement the node contract: processing a stream
//! copies its data to the output, which lets recorded material take
//! part in a score like any other source.

use tracing::trace;

use crate::channel::{
    self, Channel, ChunkChunkChunkFn, ChunkChunkFn, ChunkFn,
};
use crate::chunk::Chunk;
use crate::context::{ChannelName, Context};
use crate::error::{Error, Result};
use crate::node::{node_ref, Base, Node, NodeRef};
use crate::pcm;
use crate::types::{Count, Pcm};

/// A named collection of channels with a shared cursor.
#[derive(Debug)]
pub struct Stream {
    base: Base,
    channels: Vec<(ChannelName, Channel)>,
}

impl Stream {
    /// A stream with one empty channel per name in the ambient set.
    pub fn new(ctx: &Context) -> Stream {
        let mut stream = Stream {
            base: Base::new(ctx),
            channels: Vec::new(),
        };
        for name in ctx.channels().iter() {
            stream.add_channel(name);
        }
        stream
    }

    /// A stream whose channels each hold one zeroed chunk covering
    /// `[0, length)`. This is the shape of every scratch mix-buffer.
    pub fn new_contiguous(ctx: &Context, length: Count) -> Stream {
        let mut stream = Stream::new(ctx);
        stream.add_chunks(0, length);
        stream
    }

    /// Adopt caller-supplied buffers as the stream's contents without
    /// copying, one buffer per ambient channel in set order.
    pub fn from_buffers(ctx: &Context, buffers: Vec<Vec<Pcm>>) -> Stream {
        let mut stream = Stream::new(ctx);
        for ((_, channel), buffer) in stream.channels.iter_mut().zip(buffers) {
            channel.add_chunk(Chunk::from_buffer(0, buffer));
        }
        stream
    }

    /// Add a channel under `name` if not already present.
    pub fn add_channel(&mut self, name: ChannelName) -> &mut Channel {
        if let Some(i) = self.channels.iter().position(|(n, _)| *n == name) {
            return &mut self.channels[i].1;
        }
        self.channels.push((name, Channel::new()));
        &mut self.channels.last_mut().expect("just pushed").1
    }

    pub fn remove_channel(&mut self, name: ChannelName) -> Option<Channel> {
        let i = self.channels.iter().position(|(n, _)| *n == name)?;
        Some(self.channels.remove(i).1)
    }

    pub fn find_channel(&self, name: ChannelName) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    pub fn find_channel_mut(&mut self, name: ChannelName) -> Option<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    pub fn nr_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_names(&self) -> Vec<ChannelName> {
        self.channels.iter().map(|(n, _)| *n).collect()
    }

    /// Add a zeroed chunk covering `[offset, offset + length)` to every
    /// channel.
    pub fn add_chunks(&mut self, offset: Count, length: Count) {
        for (_, channel) in self.channels.iter_mut() {
            channel.add_new_chunk(offset, length);
        }
    }

    /// The stream cursor.
    pub fn offset(&self) -> Count {
        self.base.offset
    }

    /// Position the stream cursor and every channel cursor at
    /// `offset`.
    pub fn seek_to(&mut self, offset: Count) {
        self.base.offset = offset;
        for (_, channel) in self.channels.iter_mut() {
            channel.seek(offset);
        }
    }

    /// Maximum extent over all channels.
    pub fn length(&self) -> Count {
        self.channels
            .iter()
            .map(|(_, c)| c.length())
            .max()
            .unwrap_or(0)
    }

    /// Zero `count` samples of every channel from the cursor. The
    /// cursor always advances by the full `count`.
    pub fn write0(&mut self, count: Count) -> Count {
        for (_, channel) in self.channels.iter_mut() {
            channel.write0(count);
        }
        let offset = self.base.offset;
        self.seek_to(offset + count);
        trace!(count, "stream write0");
        count
    }

    /// Write `count` samples of `input` to this stream, or zeros when
    /// there is no input.
    pub fn write(&mut self, ctx: &Context, count: Count, input: Option<&mut Stream>) -> Count {
        match input {
            Some(src) => self.copy_from(ctx, src, count),
            None => self.write0(count),
        }
    }

    /// Apply a chunk operation to every ambient channel of this
    /// stream, advancing the cursor by the minimum channel progress.
    pub fn chunkfuncify(&mut self, ctx: &Context, count: Count, f: &mut ChunkFn) -> Count {
        let offset = self.base.offset;
        let mut minn = count;
        for (name, channel) in self.channels.iter_mut() {
            if ctx.channels().contains(*name) {
                let n = channel.chunkfuncify(minn, *name, f);
                minn = minn.min(n);
            }
        }
        self.seek_to(offset + minn);
        minn
    }

    /// Apply a two-chunk operation between `src` and this stream's
    /// corresponding channels; both stream cursors advance by the
    /// minimum progress.
    pub fn chunk_chunk_funcify(
        &mut self,
        ctx: &Context,
        src: &mut Stream,
        count: Count,
        f: &mut ChunkChunkFn,
    ) -> Count {
        let src_offset = src.base.offset;
        let dest_offset = self.base.offset;
        let mut minn = count;
        for (name, dch) in self.channels.iter_mut() {
            if ctx.channels().contains(*name) {
                if let Some(sch) = src.find_channel_mut(*name) {
                    let n = channel::chunk_chunk_funcify(sch, dch, count, *name, f);
                    minn = minn.min(n);
                }
            }
        }
        src.seek_to(src_offset + minn);
        self.seek_to(dest_offset + minn);
        minn
    }

    /// Apply a three-chunk operation between `src1`, `src2` and this
    /// stream's corresponding channels.
    pub fn chunk_chunk_chunk_funcify(
        &mut self,
        ctx: &Context,
        src1: &mut Stream,
        src2: &mut Stream,
        count: Count,
        f: &mut ChunkChunkChunkFn,
    ) -> Count {
        let src1_offset = src1.base.offset;
        let src2_offset = src2.base.offset;
        let dest_offset = self.base.offset;
        let mut minn = count;
        for (name, dch) in self.channels.iter_mut() {
            if ctx.channels().contains(*name) {
                if let (Some(s1), Some(s2)) =
                    (src1.find_channel_mut(*name), src2.find_channel_mut(*name))
                {
                    // Both sources feed this destination channel.
                    let n = channel::chunk_chunk_chunk_funcify(s1, s2, dch, count, *name, f);
                    minn = minn.min(n);
                }
            }
        }
        src1.seek_to(src1_offset + minn);
        src2.seek_to(src2_offset + minn);
        self.seek_to(dest_offset + minn);
        minn
    }

    /// Scale `count` samples in place by a constant gain.
    pub fn gain(&mut self, ctx: &Context, count: Count, gain: Pcm) -> Count {
        self.chunkfuncify(ctx, count, &mut |d, _, _| {
            pcm::gain(d, gain);
            Ok(d.len() as Count)
        })
    }

    /// Copy `count` samples from `src` into this stream.
    pub fn copy_from(&mut self, ctx: &Context, src: &mut Stream, count: Count) -> Count {
        self.chunk_chunk_funcify(ctx, src, count, &mut |s, d, _, _| {
            pcm::copy(s, d);
            Ok(s.len() as Count)
        })
    }

    /// Mix (add) `count` samples from `src` into this stream.
    pub fn mix_from(&mut self, ctx: &Context, src: &mut Stream, count: Count) -> Count {
        self.chunk_chunk_funcify(ctx, src, count, &mut |s, d, _, _| {
            pcm::add(s, d);
            Ok(s.len() as Count)
        })
    }

    /// Multiply `count` samples of this stream by those of `src`.
    pub fn mult_by(&mut self, ctx: &Context, src: &mut Stream, count: Count) -> Count {
        self.chunk_chunk_funcify(ctx, src, count, &mut |s, d, _, _| {
            pcm::mult(s, d);
            Ok(s.len() as Count)
        })
    }

    /// Fade `count` samples of this stream by the values of `src`:
    /// `dest *= 1 - src`.
    pub fn fade_by(&mut self, ctx: &Context, src: &mut Stream, count: Count) -> Count {
        self.chunk_chunk_funcify(ctx, src, count, &mut |s, d, _, _| {
            pcm::fade(s, d);
            Ok(s.len() as Count)
        })
    }

    /// Blend `count` samples of `src` into this stream by per-sample
    /// amounts in `blend`: `dest = dest * b + src * (1 - b)`.
    pub fn blend_from(
        &mut self,
        ctx: &Context,
        src: &mut Stream,
        blend: &mut Stream,
        count: Count,
    ) -> Count {
        self.chunk_chunk_chunk_funcify(ctx, src, blend, count, &mut |s, b, d, _, _| {
            pcm::blend(s, b, d);
            Ok(s.len() as Count)
        })
    }

    fn channel_pair_mut(
        &mut self,
        name1: ChannelName,
        name2: ChannelName,
    ) -> Option<(&mut Channel, &mut Channel)> {
        let i = self.channels.iter().position(|(n, _)| *n == name1)?;
        let j = self.channels.iter().position(|(n, _)| *n == name2)?;
        if i == j {
            return None;
        }
        if i < j {
            let (head, tail) = self.channels.split_at_mut(j);
            Some((&mut head[i].1, &mut tail[0].1))
        } else {
            let (head, tail) = self.channels.split_at_mut(i);
            Some((&mut tail[0].1, &mut head[j].1))
        }
    }

    /// Interleave `count` frames of the two named channels into
    /// `dest`, which must hold `2 * count` samples.
    pub fn interleave_2(
        &mut self,
        name1: ChannelName,
        name2: ChannelName,
        dest: &mut [Pcm],
        count: Count,
    ) -> Count {
        let mut consumed = 0usize;
        let n = match self.channel_pair_mut(name1, name2) {
            Some((c1, c2)) => channel::chunk_chunk_funcify(
                c1,
                c2,
                count,
                name1,
                &mut |a, b, _, _| {
                    let len = a.len();
                    pcm::interleave_2(a, b, &mut dest[2 * consumed..2 * (consumed + len)]);
                    consumed += len;
                    Ok(len as Count)
                },
            ),
            None => 0,
        };
        if n > 0 {
            let offset = self.base.offset;
            self.seek_to(offset + n);
        }
        n
    }

    /// Deinterleave `count` frames from `src` into the two named
    /// channels.
    pub fn deinterleave_2(
        &mut self,
        name1: ChannelName,
        name2: ChannelName,
        src: &[Pcm],
        count: Count,
    ) -> Count {
        let mut consumed = 0usize;
        let n = match self.channel_pair_mut(name1, name2) {
            Some((c1, c2)) => channel::chunk_chunk_funcify(
                c1,
                c2,
                count,
                name1,
                &mut |a, b, _, _| {
                    let len = a.len();
                    pcm::deinterleave_2(a, b, &src[2 * consumed..2 * (consumed + len)]);
                    consumed += len;
                    Ok(len as Count)
                },
            ),
            None => 0,
        };
        if n > 0 {
            let offset = self.base.offset;
            self.seek_to(offset + n);
        }
        n
    }
}

impl Node for Stream {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        Ok(node_ref(Stream {
            base: Base::new(ctx),
            channels: self.channels.clone(),
        }))
    }

    /// Copy this stream's data to the output from the cursor. Input is
    /// ignored.
    fn process(
        &mut self,
        ctx: &Context,
        count: Count,
        _input: Option<&mut Stream>,
        output: Option<&mut Stream>,
    ) -> Result<Count> {
        let Some(out) = output else {
            return Err(Error::NoEntity);
        };
        let before = self.base.offset;
        let n = out.write(ctx, count, Some(&mut *self));
        // The copy advanced our cursor; the wrapper owns that.
        self.base.offset = before;
        Ok(n)
    }

    fn length(&self, _ctx: &Context) -> Count {
        Stream::length(self)
    }

    fn seek(&mut self, _ctx: &Context, offset: Count) -> Result<Count> {
        self.seek_to(offset);
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChannelSet;

    fn stereo_ctx() -> Context {
        let mut ctx = Context::default();
        ctx.set_channels(ChannelSet::stereo());
        ctx
    }

    fn ramp_stream(ctx: &Context, len: Count) -> Stream {
        let mut s = Stream::new_contiguous(ctx, len);
        s.chunkfuncify(ctx, len, &mut |d, abs, _| {
            for (i, v) in d.iter_mut().enumerate() {
                *v = (abs as usize + i) as Pcm;
            }
            Ok(d.len() as Count)
        });
        s.seek_to(0);
        s
    }

    #[test]
    fn new_stream_has_ambient_channels() {
        let ctx = stereo_ctx();
        let s = Stream::new(&ctx);
        assert_eq!(s.nr_channels(), 2);
        assert!(s.find_channel(ChannelName::Left).is_some());
        assert!(s.find_channel(ChannelName::Right).is_some());
    }

    #[test]
    fn copy_roundtrip() {
        let ctx = stereo_ctx();
        let mut src = ramp_stream(&ctx, 64);
        let mut dest = Stream::new_contiguous(&ctx, 64);
        let n = dest.copy_from(&ctx, &mut src, 64);
        assert_eq!(n, 64);
        let left = dest.find_channel(ChannelName::Left).unwrap();
        assert_eq!(left.chunks()[0].data()[10], 10.0);
    }

    #[test]
    fn cursor_advances_by_minimum_channel_progress() {
        let ctx = stereo_ctx();
        let mut dest = Stream::new(&ctx);
        // Left can hold 32 samples, right only 16.
        dest.find_channel_mut(ChannelName::Left)
            .unwrap()
            .add_new_chunk(0, 32);
        dest.find_channel_mut(ChannelName::Right)
            .unwrap()
            .add_new_chunk(0, 16);
        dest.seek_to(0);

        let mut src = ramp_stream(&ctx, 32);
        let n = dest.copy_from(&ctx, &mut src, 32);
        assert_eq!(n, 16, "short write where the right channel ends");
        assert_eq!(dest.offset(), 16);
        assert_eq!(src.offset(), 16);
    }

    #[test]
    fn mix_adds_in_place() {
        let ctx = Context::default();
        let mut a = Stream::new_contiguous(&ctx, 8);
        a.chunkfuncify(&ctx, 8, &mut |d, _, _| {
            pcm::set(d, 1.0);
            Ok(d.len() as Count)
        });
        a.seek_to(0);
        let mut b = Stream::new_contiguous(&ctx, 8);
        b.chunkfuncify(&ctx, 8, &mut |d, _, _| {
            pcm::set(d, 2.0);
            Ok(d.len() as Count)
        });
        b.seek_to(0);

        b.mix_from(&ctx, &mut a, 8);
        let data = b.find_channel(ChannelName::Left).unwrap().chunks()[0].data();
        assert!(data.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn interleave_then_deinterleave_reproduces_the_stream() {
        let ctx = stereo_ctx();
        let mut src = Stream::new_contiguous(&ctx, 16);
        // Distinct data per channel.
        src.find_channel_mut(ChannelName::Left)
            .unwrap()
            .chunkfuncify(16, ChannelName::Left, &mut |d, abs, _| {
                for (i, v) in d.iter_mut().enumerate() {
                    *v = (abs as usize + i) as Pcm;
                }
                Ok(d.len() as Count)
            });
        src.find_channel_mut(ChannelName::Right)
            .unwrap()
            .chunkfuncify(16, ChannelName::Right, &mut |d, abs, _| {
                for (i, v) in d.iter_mut().enumerate() {
                    *v = -((abs as usize + i) as Pcm);
                }
                Ok(d.len() as Count)
            });
        src.seek_to(0);

        let mut inter = vec![0.0; 32];
        let n = src.interleave_2(ChannelName::Left, ChannelName::Right, &mut inter, 16);
        assert_eq!(n, 16);
        assert_eq!(inter[0], 0.0);
        assert_eq!(inter[2], 1.0);
        assert_eq!(inter[3], -1.0);

        let mut back = Stream::new_contiguous(&ctx, 16);
        let n = back.deinterleave_2(ChannelName::Left, ChannelName::Right, &inter, 16);
        assert_eq!(n, 16);

        for name in [ChannelName::Left, ChannelName::Right] {
            let original = src.find_channel(name).unwrap().chunks()[0].data();
            let restored = back.find_channel(name).unwrap().chunks()[0].data();
            assert_eq!(original, restored, "channel {name:?} survives the roundtrip");
        }
    }

    #[test]
    fn stream_processes_as_a_node() {
        let ctx = Context::default();
        let mut src = ramp_stream(&ctx, 32);
        let mut out = Stream::new_contiguous(&ctx, 32);
        let n = crate::node::process(&ctx, &mut src, 32, None, Some(&mut out)).unwrap();
        assert_eq!(n, 32);
        assert_eq!(crate::node::tell(&src), 32);
        assert_eq!(
            out.find_channel(ChannelName::Left).unwrap().chunks()[0].data()[7],
            7.0
        );
    }

    #[test]
    fn ambient_set_filters_stream_ops(){
        // A stereo stream under a mono ambient context only mixes LEFT.
        let stereo = stereo_ctx();
        let mono = Context::default();
        let mut src = Stream::new_contiguous(&stereo, 8);
        src.chunkfuncify(&stereo, 8, &mut |d, _, _| {
            pcm::set(d, 1.0);
            Ok(d.len() as Count)
        });
        src.seek_to(0);
        let mut dest = Stream::new_contiguous(&stereo, 8);
        dest.mix_from(&mono, &mut src, 8);
        let left = dest.find_channel(ChannelName::Left).unwrap().chunks()[0].data();
        let right = dest.find_channel(ChannelName::Right).unwrap().chunks()[0].data();
        assert!(left.iter().all(|&v| v == 1.0));
        assert!(right.iter().all(|&v| v == 0.0), "right channel untouched under mono");
    }
}
