//! A sound: the placement of a source node in a layer's timeline.
//!
//! A sound plays the audio produced by its source starting at
//! `start_time` for up to `duration`, optionally skipping the first
//! `cutin` samples of the source and limiting total source consumption
//! to `cutlength`. Gain and blend envelopes shape the result through
//! per-sound scratch streams. Many sounds may share one source; the
//! seek performed before every source read is the isolation mechanism
//! that keeps them independent.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::{self, node_ref, Base, Node, NodeRef, Whence};
use crate::stream::Stream;
use crate::time::Time;
use crate::types::Count;

/// A source node scheduled at a position in a layer.
pub struct Sound {
    base: Base,
    source: NodeRef,
    start_time: Time,
    duration: Time,
    cutin: Count,
    cutlength: Count,
    rate_envelope: Option<NodeRef>,
    gain_envelope: Option<NodeRef>,
    blend_envelope: Option<NodeRef>,
    // Rate envelopes are declared but not applied, so this stream is
    // only ever reshaped, never read.
    #[allow(dead_code)]
    rate_stream: Stream,
    gain_stream: Stream,
    blend_stream: Stream,
}

impl Sound {
    /// A sound playing `source` at `start_time` for `duration`. The
    /// times should carry the unit of the layer the sound will join;
    /// the layer converts them if they do not.
    pub fn new(ctx: &Context, source: NodeRef, start_time: Time, duration: Time) -> Sound {
        let mixlength = ctx.mixlength();
        Sound {
            base: Base::new(ctx),
            source,
            start_time,
            duration,
            cutin: 0,
            cutlength: 0,
            rate_envelope: None,
            gain_envelope: None,
            blend_envelope: None,
            rate_stream: Stream::new_contiguous(ctx, mixlength),
            gain_stream: Stream::new_contiguous(ctx, mixlength),
            blend_stream: Stream::new_contiguous(ctx, mixlength),
        }
    }

    pub fn source(&self) -> NodeRef {
        Rc::clone(&self.source)
    }

    pub fn set_source(&mut self, source: NodeRef) -> NodeRef {
        std::mem::replace(&mut self.source, source)
    }

    pub fn start_time(&self) -> Time {
        self.start_time
    }

    pub(crate) fn set_start_time_internal(&mut self, time: Time) {
        self.start_time = time;
    }

    pub fn duration(&self) -> Time {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Time) -> Time {
        std::mem::replace(&mut self.duration, duration)
    }

    /// Samples of the source to skip before the sound's first sample.
    pub fn cutin(&self) -> Count {
        self.cutin
    }

    pub fn set_cutin(&mut self, cutin: Count) -> Count {
        std::mem::replace(&mut self.cutin, cutin)
    }

    /// Maximum samples to consume from the source; zero means
    /// unlimited.
    pub fn cutlength(&self) -> Count {
        self.cutlength
    }

    pub fn set_cutlength(&mut self, cutlength: Count) -> Count {
        std::mem::replace(&mut self.cutlength, cutlength)
    }

    /// The core does not resample, so rate envelopes are rejected
    /// outright rather than silently ignored.
    pub fn set_rate_envelope(&mut self, _envelope: NodeRef) -> Result<()> {
        Err(Error::Invalid)
    }

    pub fn rate_envelope(&self) -> Option<NodeRef> {
        self.rate_envelope.as_ref().map(Rc::clone)
    }

    pub fn set_gain_envelope(&mut self, envelope: NodeRef) -> Option<NodeRef> {
        self.gain_envelope.replace(envelope)
    }

    pub fn gain_envelope(&self) -> Option<NodeRef> {
        self.gain_envelope.as_ref().map(Rc::clone)
    }

    pub fn set_blend_envelope(&mut self, envelope: NodeRef) -> Option<NodeRef> {
        self.blend_envelope.replace(envelope)
    }

    pub fn blend_envelope(&self) -> Option<NodeRef> {
        self.blend_envelope.as_ref().map(Rc::clone)
    }

    fn replace_mixstreams(&mut self, ctx: &Context) {
        let mixlength = self.base.limit.mixlength();
        self.rate_stream = Stream::new_contiguous(ctx, mixlength);
        self.gain_stream = Stream::new_contiguous(ctx, mixlength);
        self.blend_stream = Stream::new_contiguous(ctx, mixlength);
    }

    pub(crate) fn duplicate(&self, ctx: &Context) -> Sound {
        let mut copy = Sound::new(
            ctx,
            Rc::clone(&self.source),
            self.start_time,
            self.duration,
        );
        copy.cutin = self.cutin;
        copy.cutlength = self.cutlength;
        copy.gain_envelope = self.gain_envelope.as_ref().map(Rc::clone);
        copy.blend_envelope = self.blend_envelope.as_ref().map(Rc::clone);
        copy
    }

    /// Fetch raw source data at `cutin + offset`, clamped by
    /// `cutlength`, zero-padding any shortfall.
    fn get_raw(
        &mut self,
        ctx: &Context,
        offset: Count,
        count: Count,
        input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let block = if self.cutlength > 0 {
            if offset > self.cutlength {
                return Err(Error::Silence);
            }
            count.min(self.cutlength - offset)
        } else {
            count
        };

        trace!(block, cutin = self.cutin, cutlength = self.cutlength, "fetching raw source data");

        let source = Rc::clone(&self.source);
        let mut src = source.borrow_mut();
        node::seek(ctx, &mut *src, self.cutin + offset, Whence::Set)?;
        let mut n = node::process(ctx, &mut *src, block, input, output.as_deref_mut())?;
        drop(src);

        if block < count {
            n += match output {
                Some(out) => out.write0(count - block),
                None => count - block,
            };
        }
        Ok(n)
    }

    /// Render the gain envelope at the sound's offset and multiply it
    /// into the freshly produced output block.
    fn apply_gain(
        &mut self,
        ctx: &Context,
        offset: Count,
        count: Count,
        output: Option<&mut Stream>,
        output_offset: Option<Count>,
    ) -> Result<Count> {
        let Some(envelope) = self.gain_envelope.as_ref().map(Rc::clone) else {
            return Ok(count);
        };

        let mut env = envelope.borrow_mut();
        node::seek(ctx, &mut *env, offset, Whence::Set)?;
        self.gain_stream.seek_to(0);
        let n = node::process(ctx, &mut *env, count, None, Some(&mut self.gain_stream))?;
        drop(env);

        let (Some(out), Some(out_off)) = (output, output_offset) else {
            return Ok(n);
        };
        out.seek_to(out_off);
        self.gain_stream.seek_to(0);
        Ok(out.mult_by(ctx, &mut self.gain_stream, n))
    }

    /// Blend the input back into the produced block by the blend
    /// envelope's per-sample amounts.
    fn apply_blend(
        &mut self,
        ctx: &Context,
        offset: Count,
        count: Count,
        input: &mut Stream,
        output: &mut Stream,
    ) -> Result<Count> {
        let Some(envelope) = self.blend_envelope.as_ref().map(Rc::clone) else {
            return Ok(count);
        };

        let mut env = envelope.borrow_mut();
        node::seek(ctx, &mut *env, offset, Whence::Set)?;
        self.blend_stream.seek_to(0);
        let n = node::process(ctx, &mut *env, count, None, Some(&mut self.blend_stream))?;
        drop(env);

        self.blend_stream.seek_to(0);
        Ok(output.blend_from(ctx, input, &mut self.blend_stream, n))
    }

    /// Past the source's end the sound contributes nothing of its own:
    /// the input is written through, faded by the blend envelope.
    fn fade_input(
        &mut self,
        ctx: &Context,
        envelope: NodeRef,
        count: Count,
        input: Option<&mut Stream>,
        output: Option<&mut Stream>,
    ) -> Result<Count> {
        let Some(out) = output else {
            return Ok(count);
        };
        let output_offset = out.offset();

        let mut env = envelope.borrow_mut();
        node::seek(ctx, &mut *env, self.base.offset, Whence::Set)?;
        self.blend_stream.seek_to(0);
        node::process(ctx, &mut *env, count, None, Some(&mut self.blend_stream))?;
        drop(env);

        out.write(ctx, count, input);
        self.blend_stream.seek_to(0);
        out.seek_to(output_offset);
        Ok(out.fade_by(ctx, &mut self.blend_stream, count))
    }
}

impl Node for Sound {
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
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &Context,
        count: Count,
        mut input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let mut offset = self.base.offset;
        let source_length = self.source.borrow().length(ctx);

        trace!(count, offset, "processing sound");

        if offset > source_length {
            // The source is exhausted; degrade to a blend-envelope
            // fade of the input, or report nothing to do.
            return match self.blend_envelope.as_ref().map(Rc::clone) {
                None => Err(Error::Noop),
                Some(envelope) => self.fade_input(ctx, envelope, count, input, output),
            };
        }

        let mixlength = self.base.limit.mixlength();
        let mut remaining = count;
        let mut processed = 0;

        while remaining > 0 {
            let block = remaining.min(mixlength);
            let input_offset = input.as_ref().map(|s| s.offset());
            let output_offset = output.as_ref().map(|s| s.offset());

            let mut n = match self.get_raw(
                ctx,
                offset,
                block,
                input.as_deref_mut(),
                output.as_deref_mut(),
            ) {
                Ok(n) => n,
                Err(e) => {
                    if processed > 0 {
                        break;
                    }
                    return Err(e);
                }
            };

            if self.gain_envelope.is_some() {
                match self.apply_gain(ctx, offset, n, output.as_deref_mut(), output_offset) {
                    Ok(m) => n = m,
                    Err(e) => debug!(error = %e, "gain envelope not applied"),
                }
            }

            if self.blend_envelope.is_some() {
                if let (Some(inp), Some(out), Some(in_off), Some(out_off)) = (
                    input.as_deref_mut(),
                    output.as_deref_mut(),
                    input_offset,
                    output_offset,
                ) {
                    inp.seek_to(in_off);
                    out.seek_to(out_off);
                    n = self.apply_blend(ctx, offset, n, inp, out)?;
                }
            }

            offset += n;
            processed += n;
            remaining -= n;
            if n == 0 {
                break;
            }
        }

        trace!(processed, "sound processed");
        Ok(processed)
    }

    fn length(&self, ctx: &Context) -> Count {
        self.duration.to_samples(ctx)
    }

    fn seek(&mut self, ctx: &Context, offset: Count) -> Result<Count> {
        let mut offset = offset;
        if self.cutlength > 0 && offset > self.cutlength {
            offset = self.cutlength;
        }
        let source = Rc::clone(&self.source);
        node::seek(ctx, &mut *source.borrow_mut(), self.cutin + offset, Whence::Set)?;
        Ok(offset)
    }

    fn flush(&mut self, ctx: &Context) -> Result<()> {
        let source = Rc::clone(&self.source);
        let result = source.borrow_mut().flush(ctx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChannelName;
    use crate::envelope::{Envelope, EnvelopeShape};

    /// A source producing a constant value, with configurable length.
    struct Constant {
        base: Base,
        value: f32,
        len: Count,
    }

    impl Constant {
        fn new(ctx: &Context, value: f32, len: Count) -> Constant {
            Constant {
                base: Base::new(ctx),
                value,
                len,
            }
        }
    }

    impl Node for Constant {
        fn base(&self) -> &Base {
            &self.base
        }
        fn base_mut(&mut self) -> &mut Base {
            &mut self.base
        }
        fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
            Ok(node_ref(Constant::new(ctx, self.value, self.len)))
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
            self.len
        }
    }

    fn left_data(stream: &Stream) -> Vec<f32> {
        stream.find_channel(ChannelName::Left).unwrap().chunks()[0]
            .data()
            .to_vec()
    }

    #[test]
    fn plays_its_source() {
        let ctx = Context::default();
        let source = node_ref(Constant::new(&ctx, 0.5, crate::COUNT_INFINITE));
        let mut sound = Sound::new(&ctx, source, Time::Samples(0), Time::Samples(64));

        let mut out = Stream::new_contiguous(&ctx, 64);
        let n = node::process(&ctx, &mut sound, 64, None, Some(&mut out)).unwrap();
        assert_eq!(n, 64);
        assert!(left_data(&out).iter().all(|&v| v == 0.5));
    }

    #[test]
    fn gain_envelope_scales_the_output() {
        let ctx = Context::default();
        let source = node_ref(Constant::new(&ctx, 1.0, crate::COUNT_INFINITE));
        let mut sound = Sound::new(&ctx, source, Time::Samples(0), Time::Samples(100));

        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(0), 0.0).unwrap();
        env.add_point(Time::Samples(100), 1.0).unwrap();
        sound.set_gain_envelope(node_ref(env));

        let mut out = Stream::new_contiguous(&ctx, 100);
        node::process(&ctx, &mut sound, 100, None, Some(&mut out)).unwrap();
        let data = left_data(&out);
        assert_eq!(data[0], 0.0);
        assert_eq!(data[50], 0.5);
        assert_eq!(data[99], 0.99);
    }

    #[test]
    fn cutlength_limits_source_consumption() {
        let ctx = Context::default();
        let source = node_ref(Constant::new(&ctx, 1.0, crate::COUNT_INFINITE));
        let mut sound = Sound::new(&ctx, source, Time::Samples(0), Time::Samples(64));
        sound.set_cutlength(16);

        let mut out = Stream::new_contiguous(&ctx, 64);
        let n = node::process(&ctx, &mut sound, 64, None, Some(&mut out)).unwrap();
        assert_eq!(n, 64, "shortfall is zero-padded, not truncated");
        let data = left_data(&out);
        assert!(data[..16].iter().all(|&v| v == 1.0));
        assert!(data[16..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn cutin_skips_the_source_head() {
        let ctx = Context::default();
        // 441 Hz at 44100 Hz: 100-sample wavelength, +1 for the first
        // 50 samples. A cutin of 50 starts in the negative half-wave.
        let tone = node_ref(crate::nodes::squaretone::SquareTone::new(&ctx, 441.0));
        let mut sound = Sound::new(&ctx, tone, Time::Samples(0), Time::Samples(50));
        sound.set_cutin(50);

        let mut out = Stream::new_contiguous(&ctx, 50);
        node::process(&ctx, &mut sound, 50, None, Some(&mut out)).unwrap();
        assert!(left_data(&out).iter().all(|&v| v == -1.0));
    }

    #[test]
    fn past_source_end_without_blend_is_a_noop() {
        let ctx = Context::default();
        let source = node_ref(Constant::new(&ctx, 1.0, 10));
        let mut sound = Sound::new(&ctx, source, Time::Samples(0), Time::Samples(64));

        node::seek(&ctx, &mut sound, 20, Whence::Set).unwrap();
        let mut out = Stream::new_contiguous(&ctx, 16);
        let err = node::process(&ctx, &mut sound, 16, None, Some(&mut out)).unwrap_err();
        assert_eq!(err, Error::Noop);
    }

    #[test]
    fn rate_envelopes_are_rejected() {
        let ctx = Context::default();
        let source = node_ref(Constant::new(&ctx, 1.0, 10));
        let mut sound = Sound::new(&ctx, source, Time::Samples(0), Time::Samples(10));
        let env = node_ref(Envelope::new(&ctx, EnvelopeShape::Linear));
        assert_eq!(sound.set_rate_envelope(env).unwrap_err(), Error::Invalid);
        assert!(sound.rate_envelope().is_none());
    }

    #[test]
    fn length_follows_duration_unit() {
        let ctx = Context::default();
        let source = node_ref(Constant::new(&ctx, 1.0, crate::COUNT_INFINITE));
        let sound = Sound::new(&ctx, source, Time::Beat24s(0), Time::Beat24s(24));
        assert_eq!(sound.length(&ctx), 22050);
    }

    #[test]
    fn shared_source_is_isolated_by_seeks() {
        let ctx = Context::default();
        // A ramp source so position matters.
        struct Ramp {
            base: Base,
        }
        impl Node for Ramp {
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
                let mut pos = self.base.offset();
                Ok(out.chunkfuncify(ctx, count, &mut |d, _, _| {
                    for v in d.iter_mut() {
                        *v = pos as f32;
                        pos += 1;
                    }
                    Ok(d.len() as Count)
                }))
            }
            fn length(&self, _ctx: &Context) -> Count {
                crate::COUNT_INFINITE
            }
        }

        let source = node_ref(Ramp {
            base: Base::new(&ctx),
        });
        let mut a = Sound::new(&ctx, Rc::clone(&source), Time::Samples(0), Time::Samples(8));
        let mut b = Sound::new(&ctx, source, Time::Samples(8), Time::Samples(8));

        let mut out = Stream::new_contiguous(&ctx, 8);
        node::process(&ctx, &mut a, 8, None, Some(&mut out)).unwrap();

        // B starts reading the source from its own beginning, not from
        // where A left the shared cursor.
        let mut out_b = Stream::new_contiguous(&ctx, 8);
        node::process(&ctx, &mut b, 8, None, Some(&mut out_b)).unwrap();
        assert_eq!(left_data(&out_b)[0], 0.0);
    }
}
