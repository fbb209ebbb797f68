//! A track: layers chained in series, bottom to top.
//!
//! Each layer takes the previous layer's output as its input, so a
//! track is a serial effects chain over sequenced material. Chaining
//! uses a ping-pong pair of scratch streams; the last layer writes to
//! the track's real output. Track gain is applied by the containing
//! deck when it sums tracks.

use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::node::{self, node_ref, Base, Node, NodeRef, Whence};
use crate::stream::Stream;
use crate::time::TimeKind;
use crate::types::{Count, Pcm};

/// Processing routine selected by the optimiser from the layer count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routine {
    Empty,
    OneLayer,
    TwoLayer,
    General,
}

/// A serial chain of layers with a gain.
pub struct Track {
    base: Base,
    gain: Pcm,
    layers: Vec<Layer>,
    mix_a: Stream,
    mix_b: Stream,
    routine: Routine,
}

impl Track {
    pub fn new(ctx: &Context) -> Track {
        let mixlength = ctx.mixlength();
        let mut track = Track {
            base: Base::new(ctx),
            gain: 1.0,
            layers: Vec::new(),
            mix_a: Stream::new_contiguous(ctx, mixlength),
            mix_b: Stream::new_contiguous(ctx, mixlength),
            routine: Routine::Empty,
        };
        track.optimise();
        track
    }

    pub fn gain(&self) -> Pcm {
        self.gain
    }

    pub fn set_gain(&mut self, gain: Pcm) -> Pcm {
        std::mem::replace(&mut self.gain, gain)
    }

    pub fn nr_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Add a new layer on top of the chain.
    pub fn add_layer(&mut self, ctx: &Context, unit: TimeKind) -> &mut Layer {
        self.layers.push(Layer::new(ctx, unit));
        self.optimise();
        self.layers.last_mut().expect("just pushed")
    }

    pub fn remove_layer(&mut self, index: usize) -> Result<Layer> {
        if index >= self.layers.len() {
            return Err(Error::NoEntity);
        }
        let layer = self.layers.remove(index);
        self.optimise();
        Ok(layer)
    }

    fn replace_mixstreams(&mut self, ctx: &Context) {
        let mixlength = self.base.limit.mixlength();
        self.mix_a = Stream::new_contiguous(ctx, mixlength);
        self.mix_b = Stream::new_contiguous(ctx, mixlength);
    }

    /// Rebind the processing routine to the current topology.
    fn optimise(&mut self) {
        self.routine = match self.layers.len() {
            0 => Routine::Empty,
            1 => Routine::OneLayer,
            2 => Routine::TwoLayer,
            _ => Routine::General,
        };
    }

    pub(crate) fn duplicate(&self, ctx: &Context) -> Track {
        let mut copy = Track::new(ctx);
        copy.gain = self.gain;
        copy.layers = self.layers.iter().map(|l| l.duplicate(ctx)).collect();
        copy.optimise();
        copy
    }

    fn process_two_layer(
        &mut self,
        ctx: &Context,
        count: Count,
        mut input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let current_offset = self.base.offset;
        let mixlength = self.base.limit.mixlength();
        let Track {
            layers, mix_a, ..
        } = self;
        let (first, rest) = layers.split_at_mut(1);
        let lower = &mut first[0];
        let upper = &mut rest[0];

        node::seek(ctx, lower, current_offset, Whence::Set)?;
        node::seek(ctx, upper, current_offset, Whence::Set)?;

        let mut remaining = count;
        let mut processed = 0;
        while remaining > 0 {
            let mut n = remaining.min(mixlength);

            mix_a.seek_to(0);
            n = node::process(ctx, lower, n, input.as_deref_mut(), Some(&mut *mix_a))?;

            mix_a.seek_to(0);
            n = node::process(ctx, upper, n, Some(&mut *mix_a), output.as_deref_mut())?;

            processed += n;
            remaining -= n;
            if n == 0 {
                break;
            }
        }
        Ok(processed)
    }

    fn process_general(
        &mut self,
        ctx: &Context,
        count: Count,
        mut input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let mixlength = self.base.limit.mixlength();
        let Track {
            layers,
            mix_a,
            mix_b,
            ..
        } = self;
        let len = layers.len();

        let mut remaining = count;
        let mut processed = 0;
        while remaining > 0 {
            let mut n = remaining.min(mixlength);

            for i in 0..len {
                let last = i + 1 == len;
                let layer = &mut layers[i];
                n = if i == 0 {
                    if last {
                        node::process(ctx, layer, n, input.as_deref_mut(), output.as_deref_mut())?
                    } else {
                        mix_a.seek_to(0);
                        node::process(ctx, layer, n, input.as_deref_mut(), Some(&mut *mix_a))?
                    }
                } else if i % 2 == 1 {
                    mix_a.seek_to(0);
                    if last {
                        node::process(ctx, layer, n, Some(&mut *mix_a), output.as_deref_mut())?
                    } else {
                        mix_b.seek_to(0);
                        node::process(ctx, layer, n, Some(&mut *mix_a), Some(&mut *mix_b))?
                    }
                } else {
                    mix_b.seek_to(0);
                    if last {
                        node::process(ctx, layer, n, Some(&mut *mix_b), output.as_deref_mut())?
                    } else {
                        mix_a.seek_to(0);
                        node::process(ctx, layer, n, Some(&mut *mix_b), Some(&mut *mix_a))?
                    }
                };
            }

            processed += n;
            remaining -= n;
            if n == 0 {
                break;
            }
        }
        Ok(processed)
    }
}

impl Node for Track {
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
        self.replace_mixstreams(ctx);
        for layer in self.layers.iter_mut() {
            node::prepare(ctx, layer)?;
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
        trace!(count, routine = ?self.routine, "processing track");
        match self.routine {
            Routine::Empty => Err(Error::Noop),
            Routine::OneLayer => {
                node::process(ctx, &mut self.layers[0], count, input, output)
            }
            Routine::TwoLayer => self.process_two_layer(ctx, count, input, output),
            Routine::General => self.process_general(ctx, count, input, output),
        }
    }

    fn length(&self, ctx: &Context) -> Count {
        self.layers
            .iter()
            .map(|l| l.length(ctx))
            .max()
            .unwrap_or(0)
    }

    fn seek(&mut self, ctx: &Context, offset: Count) -> Result<Count> {
        for layer in self.layers.iter_mut() {
            node::seek(ctx, layer, offset, Whence::Set)?;
        }
        Ok(offset)
    }

    fn flush(&mut self, ctx: &Context) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.flush(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChannelName;
    use crate::sound::Sound;
    use crate::time::Time;

    /// A source producing a constant value forever.
    struct Constant {
        base: Base,
        value: f32,
    }

    impl Constant {
        fn shared(ctx: &Context, value: f32) -> NodeRef {
            node_ref(Constant {
                base: Base::new(ctx),
                value,
            })
        }
    }

    impl Node for Constant {
        fn base(&self) -> &Base {
            &self.base
        }
        fn base_mut(&mut self) -> &mut Base {
            &mut self.base
        }
        fn clone_node(&self, _ctx: &Context) -> Result<NodeRef> {
            Err(Error::Invalid)
        }
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
            let value = self.value;
            Ok(out.chunkfuncify(ctx, count, &mut |d, _, _| {
                crate::pcm::set(d, value);
                Ok(d.len() as Count)
            }))
        }
        fn length(&self, _ctx: &Context) -> Count {
            crate::COUNT_INFINITE
        }
    }

    fn track_with_constant_layers(ctx: &Context, values: &[f32]) -> Track {
        let mut track = Track::new(ctx);
        for &v in values {
            let layer = track.add_layer(ctx, TimeKind::Samples);
            let src = Constant::shared(ctx, v);
            layer.add_sound(
                ctx,
                Sound::new(ctx, src, Time::Samples(0), Time::Samples(1 << 20)),
            );
        }
        track
    }

    fn render(track: &mut Track, ctx: &Context, count: Count) -> Vec<f32> {
        let mut out = Stream::new_contiguous(ctx, count);
        node::process(ctx, track, count, None, Some(&mut out)).unwrap();
        out.find_channel(ChannelName::Left).unwrap().chunks()[0]
            .data()
            .to_vec()
    }

    #[test]
    fn empty_track_reports_noop() {
        let ctx = Context::default();
        let mut track = Track::new(&ctx);
        let mut out = Stream::new_contiguous(&ctx, 8);
        let err = node::process(&ctx, &mut track, 8, None, Some(&mut out)).unwrap_err();
        assert_eq!(err, Error::Noop);
        assert_eq!(track.length(&ctx), 0);
    }

    #[test]
    fn one_layer_track_passes_its_layer_through() {
        let ctx = Context::default();
        let mut track = track_with_constant_layers(&ctx, &[0.25]);
        let out = render(&mut track, &ctx, 64);
        assert!(out.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn serial_chaining_top_layer_wins_without_blend() {
        // With opaque sounds the top layer replaces the lower one's
        // output, which is exactly the serial-chain contract.
        let ctx = Context::default();
        let mut track = track_with_constant_layers(&ctx, &[0.25, 0.75]);
        let out = render(&mut track, &ctx, 64);
        assert!(out.iter().all(|&v| v == 0.75));
    }

    #[test]
    fn three_layer_chain_uses_the_general_routine() {
        let ctx = Context::default();
        let mut track = track_with_constant_layers(&ctx, &[0.1, 0.2, 0.9]);
        let out = render(&mut track, &ctx, 2048);
        assert_eq!(out.len(), 2048);
        assert!(out.iter().all(|&v| v == 0.9));
    }

    #[test]
    fn transparent_upper_layer_exposes_the_lower_one() {
        let ctx = Context::default();
        let mut track = track_with_constant_layers(&ctx, &[0.5]);
        // An empty layer on top is transparent, not silent.
        track.add_layer(&ctx, TimeKind::Samples);
        let out = render(&mut track, &ctx, 64);
        assert!(out.iter().all(|&v| v == 0.5));
    }

    #[test]
    fn gain_is_stored_for_the_deck() {
        let ctx = Context::default();
        let mut track = Track::new(&ctx);
        assert_eq!(track.gain(), 1.0);
        assert_eq!(track.set_gain(0.6), 1.0);
        assert_eq!(track.gain(), 0.6);
    }

    #[test]
    fn removing_layers_rebinds_the_routine() {
        let ctx = Context::default();
        let mut track = track_with_constant_layers(&ctx, &[0.3, 0.6]);
        track.remove_layer(1).unwrap();
        let out = render(&mut track, &ctx, 16);
        assert!(out.iter().all(|&v| v == 0.3));
        assert!(track.remove_layer(5).is_err());
    }
}
