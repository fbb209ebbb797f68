//! Envelope-controlled gain effect.
//!
//! Multiplies its input by the values of an envelope supplied as the
//! runtime parameter `gain envelope`. Without one the filter reports a
//! no-op, which its container turns into a clean pass-through.

use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::{self, node_ref, Base, Node, NodeRef, Whence};
use crate::plugin::{MetaText, ParamKind, ParamScheme, ParamSet, Plugin, PluginFlags};
use crate::stream::Stream;
use crate::types::{Count, COUNT_INFINITE};
use crate::world::Env;

/// Key of the `gain envelope` runtime parameter.
pub const GAIN_ENVELOPE_KEY: usize = 0;

/// An effect scaling its input by an envelope.
pub struct GainFilter {
    base: Base,
    envstream: Stream,
}

impl GainFilter {
    pub fn new(ctx: &Context) -> GainFilter {
        let mixlength = ctx.mixlength();
        GainFilter {
            base: Base::new(ctx),
            envstream: Stream::new_contiguous(ctx, mixlength),
        }
    }

    fn envelope(&self) -> Option<NodeRef> {
        self.base
            .params
            .get(&GAIN_ENVELOPE_KEY)
            .and_then(|p| p.as_node())
    }

    fn replace_envstream(&mut self, ctx: &Context) {
        let mixlength = self.base.limit.mixlength();
        self.envstream = Stream::new_contiguous(ctx, mixlength);
    }
}

impl Node for GainFilter {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        Ok(node_ref(GainFilter::new(ctx)))
    }

    fn ready(&self, ctx: &Context) -> bool {
        self.base.encompasses_mixlength(ctx) && self.base.encompasses_channels(ctx)
    }

    fn prepare(&mut self, ctx: &Context) -> Result<()> {
        self.replace_envstream(ctx);
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &Context,
        count: Count,
        mut input: Option<&mut Stream>,
        output: Option<&mut Stream>,
    ) -> Result<Count> {
        let Some(envelope) = self.envelope() else {
            return Err(Error::Noop);
        };
        let Some(out) = output else {
            return Err(Error::NoEntity);
        };

        let mixlength = self.base.limit.mixlength();
        let mut remaining = count;
        let mut processed = 0;

        trace!(count, "processing gain filter");

        while remaining > 0 {
            let mut n = remaining.min(mixlength);
            let out_off = out.offset();

            n = out.write(ctx, n, input.as_deref_mut());

            let mut env = envelope.borrow_mut();
            self.envstream.seek_to(0);
            n = node::process(ctx, &mut *env, n, None, Some(&mut self.envstream))?;
            drop(env);

            self.envstream.seek_to(0);
            out.seek_to(out_off);
            n = out.mult_by(ctx, &mut self.envstream, n);

            processed += n;
            remaining -= n;
            if n == 0 {
                break;
            }
        }

        Ok(processed)
    }

    fn length(&self, ctx: &Context) -> Count {
        match self.envelope() {
            Some(envelope) => envelope.borrow().length(ctx),
            None => COUNT_INFINITE,
        }
    }

    fn seek(&mut self, ctx: &Context, offset: Count) -> Result<Count> {
        if let Some(envelope) = self.envelope() {
            node::seek(ctx, &mut *envelope.borrow_mut(), offset, Whence::Set)?;
        }
        Ok(offset)
    }
}

/// The `builtin::gain` plugin descriptor.
pub fn plugin() -> Plugin {
    Plugin {
        metatext: MetaText {
            identifier: "builtin::gain",
            category: "Processors::Gain Adjustment",
            description: "Adjusts the gain of its input",
            copyright: "",
            url: "",
            authors: Vec::new(),
        },
        flags: PluginFlags {
            causal: true,
            ..PluginFlags::default()
        },
        init_scheme: Vec::new(),
        init: gain_init,
        process_scheme: vec![ParamScheme::new(
            "gain envelope",
            "An envelope to control the amplitude",
            ParamKind::Node,
        )],
        suggest: None,
    }
}

fn gain_init(env: &mut Env, _params: &ParamSet) -> Result<NodeRef> {
    Ok(node_ref(GainFilter::new(env)))
}
