//! Square wave tone generator.
//!
//! Keeps a cycle offset per channel so every channel of a stream gets
//! the same phase. Depends on the ambient sample rate: a rate change
//! makes the node not-ready and preparation rebuilds the channel
//! state.

use std::collections::BTreeMap;

use tracing::trace;

use crate::context::{ChannelName, Context};
use crate::error::{Error, Result};
use crate::node::{node_ref, Base, Node, NodeRef};
use crate::pcm;
use crate::plugin::{MetaText, Param, ParamKind, ParamScheme, ParamSet, Plugin, PluginFlags};
use crate::stream::Stream;
use crate::types::{Count, COUNT_INFINITE};
use crate::world::Env;

/// Key of the `frequency` init parameter.
pub const FREQUENCY_KEY: usize = 0;

const DEFAULT_FREQUENCY: f64 = 440.0;

/// A square wave source at a fixed frequency.
pub struct SquareTone {
    base: Base,
    frequency: f64,
    channels: BTreeMap<ChannelName, Count>,
}

impl SquareTone {
    pub fn new(ctx: &Context, frequency: f64) -> SquareTone {
        let mut tone = SquareTone {
            base: Base::new(ctx),
            frequency,
            channels: BTreeMap::new(),
        };
        tone.replace_channels(ctx);
        tone
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn set_frequency(&mut self, frequency: f64) -> f64 {
        std::mem::replace(&mut self.frequency, frequency)
    }

    /// Samples per full cycle at the ambient rate.
    fn wavelength(&self, ctx: &Context) -> Count {
        ((ctx.samplerate() / self.frequency) as Count).max(1)
    }

    /// Rebuild per-channel cycle state for the ambient channel set,
    /// preserving the playback phase.
    fn replace_channels(&mut self, ctx: &Context) {
        let cycle = self.base.offset % self.wavelength(ctx);
        self.channels = ctx.channels().iter().map(|name| (name, cycle)).collect();
    }
}

impl Node for SquareTone {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        Ok(node_ref(SquareTone::new(ctx, self.frequency)))
    }

    fn ready(&self, ctx: &Context) -> bool {
        self.base.has_samplerate(ctx) && self.base.encompasses_channels(ctx)
    }

    fn prepare(&mut self, ctx: &Context) -> Result<()> {
        self.replace_channels(ctx);
        Ok(())
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
        let wavelength = self.wavelength(ctx);
        let half = (wavelength / 2).max(1);
        let channels = &mut self.channels;

        trace!(count, wavelength, "processing squaretone");

        Ok(out.chunkfuncify(ctx, count, &mut |d, _, name| {
            let Some(cycle) = channels.get_mut(&name) else {
                // A channel we never prepared for: silence.
                return Err(Error::Silence);
            };

            let total = d.len() as Count;
            let mut remaining = total;
            let mut written = 0usize;

            // Finish the half-wave in progress.
            let (mut n, mut value) = if *cycle < half {
                ((half - *cycle).min(remaining), 1.0)
            } else {
                ((wavelength - *cycle).min(remaining), -1.0)
            };
            pcm::set(&mut d[written..written + n as usize], value);
            written += n as usize;
            remaining -= n;

            while remaining > 0 {
                n = remaining.min(half);
                value = -value;
                pcm::set(&mut d[written..written + n as usize], value);
                written += n as usize;
                remaining -= n;
            }

            *cycle = (*cycle + total) % wavelength;
            Ok(total)
        }))
    }

    fn length(&self, _ctx: &Context) -> Count {
        COUNT_INFINITE
    }

    fn seek(&mut self, ctx: &Context, offset: Count) -> Result<Count> {
        let cycle = offset % self.wavelength(ctx);
        for value in self.channels.values_mut() {
            *value = cycle;
        }
        Ok(offset)
    }
}

/// The `builtin::squaretone` plugin descriptor.
pub fn plugin() -> Plugin {
    Plugin {
        metatext: MetaText {
            identifier: "builtin::squaretone",
            category: "Generators::Tone",
            description: "Square wave tone generator",
            copyright: "",
            url: "",
            authors: Vec::new(),
        },
        flags: PluginFlags {
            seekable: true,
            ..PluginFlags::default()
        },
        init_scheme: vec![ParamScheme::new(
            "frequency",
            "Oscillation frequency in Hz",
            ParamKind::Float,
        )],
        init: squaretone_init,
        process_scheme: Vec::new(),
        suggest: Some(squaretone_suggest),
    }
}

fn squaretone_init(env: &mut Env, params: &ParamSet) -> Result<NodeRef> {
    let frequency = params
        .get(&FREQUENCY_KEY)
        .and_then(Param::as_float)
        .unwrap_or(DEFAULT_FREQUENCY);
    if frequency <= 0.0 {
        return Err(Error::Invalid);
    }
    Ok(node_ref(SquareTone::new(env, frequency)))
}

fn squaretone_suggest(_env: &Env, _plugin: &Plugin, mut params: ParamSet) -> ParamSet {
    params
        .entry(FREQUENCY_KEY)
        .or_insert(Param::Float(DEFAULT_FREQUENCY));
    params
}
