//! A deck: tracks mixed in parallel.
//!
//! The first track renders straight into the output and is
//! gain-scaled there; every further track renders into the deck's
//! scratch mix-stream, is gain-scaled, and is added into the output.
//! A deck is itself a node, so an entire deck can be sequenced as the
//! source of a sound in another deck.

use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::{self, node_ref, Base, Node, NodeRef, Whence};
use crate::stream::Stream;
use crate::track::Track;
use crate::types::Count;

/// Processing routine selected by the optimiser from the track count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routine {
    Empty,
    OneTrack,
    TwoTrack,
    General,
}

/// The top-level mixing container.
pub struct Deck {
    base: Base,
    tracks: Vec<Track>,
    mixstream: Stream,
    routine: Routine,
}

impl Deck {
    pub fn new(ctx: &Context) -> Deck {
        let mixlength = ctx.mixlength();
        let mut deck = Deck {
            base: Base::new(ctx),
            tracks: Vec::new(),
            mixstream: Stream::new_contiguous(ctx, mixlength),
            routine: Routine::Empty,
        };
        deck.optimise();
        deck
    }

    pub fn nr_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    /// Add a new track; tracks are processed in insertion order.
    pub fn add_track(&mut self, ctx: &Context) -> &mut Track {
        self.tracks.push(Track::new(ctx));
        self.optimise();
        self.tracks.last_mut().expect("just pushed")
    }

    /// Remove and destroy a track and everything it owns.
    pub fn remove_track(&mut self, index: usize) -> Result<()> {
        if index >= self.tracks.len() {
            return Err(Error::NoEntity);
        }
        self.tracks.remove(index);
        self.optimise();
        Ok(())
    }

    fn replace_mixstream(&mut self, ctx: &Context) {
        let mixlength = self.base.limit.mixlength();
        self.mixstream = Stream::new_contiguous(ctx, mixlength);
    }

    /// Rebind the processing routine to the current topology.
    fn optimise(&mut self) {
        self.routine = match self.tracks.len() {
            0 => Routine::Empty,
            1 => Routine::OneTrack,
            2 => Routine::TwoTrack,
            _ => Routine::General,
        };
    }

    pub(crate) fn duplicate(&self, ctx: &Context) -> Deck {
        let mut copy = Deck::new(ctx);
        copy.tracks = self.tracks.iter().map(|t| t.duplicate(ctx)).collect();
        copy.optimise();
        copy
    }

    /// Run one track, treating an empty track as a silent
    /// contribution rather than an error.
    fn process_track(
        ctx: &Context,
        track: &mut Track,
        count: Count,
        input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        match node::process(ctx, track, count, input, output.as_deref_mut()) {
            Ok(n) => Ok(n),
            Err(Error::Noop) => {
                let n = match output {
                    Some(out) => out.write0(count),
                    None => count,
                };
                node::seek(ctx, track, node::tell(track) + n, Whence::Set)?;
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }

    fn process_general(
        &mut self,
        ctx: &Context,
        count: Count,
        mut input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let mixlength = self.base.limit.mixlength();
        let Deck {
            tracks, mixstream, ..
        } = self;

        let mut remaining = count;
        let mut processed = 0;

        while remaining > 0 {
            let block = remaining.min(mixlength);
            let in_off = input.as_ref().map(|s| s.offset());
            let out_off = output.as_ref().map(|s| s.offset());
            let mut n = block;

            for (i, track) in tracks.iter_mut().enumerate() {
                let gain = track.gain();
                if i == 0 {
                    n = Deck::process_track(
                        ctx,
                        track,
                        n,
                        input.as_deref_mut(),
                        output.as_deref_mut(),
                    )?;
                    if let (Some(out), Some(off)) = (output.as_deref_mut(), out_off) {
                        out.seek_to(off);
                        n = out.gain(ctx, n, gain);
                    }
                } else {
                    if let (Some(inp), Some(off)) = (input.as_deref_mut(), in_off) {
                        inp.seek_to(off);
                    }
                    mixstream.seek_to(0);
                    n = Deck::process_track(
                        ctx,
                        track,
                        n,
                        input.as_deref_mut(),
                        Some(&mut *mixstream),
                    )?;
                    mixstream.seek_to(0);
                    n = mixstream.gain(ctx, n, gain);
                    if let (Some(out), Some(off)) = (output.as_deref_mut(), out_off) {
                        mixstream.seek_to(0);
                        out.seek_to(off);
                        n = out.mix_from(ctx, mixstream, n);
                    }
                }
            }

            processed += n;
            remaining -= n;
            if n == 0 {
                break;
            }
        }

        trace!(processed, "deck processed");
        Ok(processed)
    }

    fn process_two_track(
        &mut self,
        ctx: &Context,
        count: Count,
        mut input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let in_off = input.as_ref().map(|s| s.offset());
        let out_off = output.as_ref().map(|s| s.offset());
        let Deck {
            tracks, mixstream, ..
        } = self;
        let (first, rest) = tracks.split_at_mut(1);
        let track1 = &mut first[0];
        let track2 = &mut rest[0];

        let mut n = Deck::process_track(
            ctx,
            track1,
            count,
            input.as_deref_mut(),
            output.as_deref_mut(),
        )?;
        if let (Some(out), Some(off)) = (output.as_deref_mut(), out_off) {
            out.seek_to(off);
            n = out.gain(ctx, n, track1.gain());
        }

        if let (Some(inp), Some(off)) = (input.as_deref_mut(), in_off) {
            inp.seek_to(off);
        }
        mixstream.seek_to(0);
        n = Deck::process_track(ctx, track2, n, input.as_deref_mut(), Some(&mut *mixstream))?;
        mixstream.seek_to(0);
        n = mixstream.gain(ctx, n, track2.gain());
        if let (Some(out), Some(off)) = (output.as_deref_mut(), out_off) {
            mixstream.seek_to(0);
            out.seek_to(off);
            n = out.mix_from(ctx, mixstream, n);
        }

        Ok(n)
    }
}

impl Node for Deck {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        Ok(node_ref(self.duplicate(ctx)))
    }

    fn ready(&self, ctx: &Context) -> bool {
        self.base.encompasses_mixlength(ctx) && self.base.encompasses_channels(ctx)
    }

    fn prepare(&mut self, ctx: &Context) -> Result<()> {
        self.replace_mixstream(ctx);
        for track in self.tracks.iter_mut() {
            node::prepare(ctx, track)?;
        }
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &Context,
        count: Count,
        input: Option<&mut Stream>,
        output: Option<&mut Stream>,
    ) -> Result<Count> {
        trace!(count, routine = ?self.routine, "processing deck");
        match self.routine {
            Routine::Empty => Err(Error::Noop),
            Routine::OneTrack => node::process(ctx, &mut self.tracks[0], count, input, output),
            Routine::TwoTrack => self.process_two_track(ctx, count, input, output),
            Routine::General => self.process_general(ctx, count, input, output),
        }
    }

    fn length(&self, ctx: &Context) -> Count {
        self.tracks
            .iter()
            .map(|t| t.length(ctx))
            .max()
            .unwrap_or(0)
    }

    fn seek(&mut self, ctx: &Context, offset: Count) -> Result<Count> {
        for track in self.tracks.iter_mut() {
            node::seek(ctx, track, offset, Whence::Set)?;
        }
        Ok(offset)
    }

    fn flush(&mut self, ctx: &Context) -> Result<()> {
        for track in self.tracks.iter_mut() {
            track.flush(ctx)?;
        }
        Ok(())
    }
}
