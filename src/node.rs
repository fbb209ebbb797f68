//! The uniform processing-node contract.
//!
//! Every entity in the engine (containers, envelopes, generators,
//! effects, even streams) exposes the same operation vocabulary
//! through [`Node`]. The free functions here are the wrapper layer that
//! enforces universal bookkeeping on top of a node's own methods:
//! advancing the play cursor after a successful `process`, resolving
//! seek whence modes, merging the ambient context on preparation, and
//! recovering the [`Silence`](Error::Silence) and [`Noop`](Error::Noop)
//! signals into the correct zero-fill or pass-through.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::plugin::{Param, ParamKind, Plugin};
use crate::stream::Stream;
use crate::types::Count;

/// A shared handle to any node. Sources and envelopes are shared
/// between sounds through these; per-sound seeks before each process
/// call are the isolation mechanism.
pub type NodeRef = Rc<RefCell<dyn Node>>;

/// Wrap a concrete node into a shareable [`NodeRef`].
pub fn node_ref<N: Node + 'static>(node: N) -> NodeRef {
    Rc::new(RefCell::new(node))
}

/// State every node carries: play cursor, recorded context limit, and
/// the runtime parameter map.
#[derive(Debug)]
pub struct Base {
    pub(crate) offset: Count,
    pub(crate) limit: Context,
    pub(crate) params: BTreeMap<usize, Param>,
    pub(crate) plugin: Option<Rc<Plugin>>,
}

impl Base {
    /// A fresh base capturing the ambient context as its limit.
    pub fn new(ctx: &Context) -> Base {
        Base {
            offset: 0,
            limit: ctx.clone(),
            params: BTreeMap::new(),
            plugin: None,
        }
    }

    pub fn offset(&self) -> Count {
        self.offset
    }

    /// The context this node was last prepared against.
    pub fn limit(&self) -> &Context {
        &self.limit
    }

    pub fn plugin(&self) -> Option<&Rc<Plugin>> {
        self.plugin.as_ref()
    }

    /// True when the ambient sample rate matches the recorded one.
    pub fn has_samplerate(&self, ctx: &Context) -> bool {
        ctx.samplerate() == self.limit.samplerate()
    }

    /// True when the recorded mixlength covers the ambient one.
    pub fn encompasses_mixlength(&self, ctx: &Context) -> bool {
        ctx.mixlength() <= self.limit.mixlength()
    }

    /// True when every ambient channel is present in the recorded set.
    pub fn encompasses_channels(&self, ctx: &Context) -> bool {
        self.limit.channels().is_superset(ctx.channels())
    }
}

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").finish()
    }
}

/// The uniform node contract.
///
/// `ready`, `prepare`, `seek` and `flush` have defaults matching the
/// absent-method behaviour of the contract: always ready, no
/// preparation, seek records the offset, flush is a no-op.
pub trait Node {
    fn base(&self) -> &Base;
    fn base_mut(&mut self) -> &mut Base;

    /// Deep copy of this node's state as a fresh, independent node.
    fn clone_node(&self, ctx: &Context) -> Result<NodeRef>;

    /// True iff the node can process under the ambient context without
    /// re-preparation.
    fn ready(&self, _ctx: &Context) -> bool {
        true
    }

    /// Reshape internal buffers and state to the ambient context.
    fn prepare(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Produce up to `count` samples into `output`, optionally
    /// consuming `input`. Cursor advancement is handled by the wrapper,
    /// not here.
    fn process(
        &mut self,
        ctx: &Context,
        count: Count,
        input: Option<&mut Stream>,
        output: Option<&mut Stream>,
    ) -> Result<Count>;

    /// Total sample length, or [`COUNT_INFINITE`](crate::COUNT_INFINITE).
    fn length(&self, ctx: &Context) -> Count;

    /// Reposition internal state for playback from `offset`; returns
    /// the offset actually set.
    fn seek(&mut self, _ctx: &Context, offset: Count) -> Result<Count> {
        Ok(offset)
    }

    /// Surface any buffered output.
    fn flush(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Whence modes for [`seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute.
    Set,
    /// Relative to the current play cursor.
    Cur,
    /// Relative to the node's length.
    End,
}

/// The node's current play cursor.
pub fn tell<N: Node + ?Sized>(node: &N) -> Count {
    node.base().offset
}

/// Dispatch `process` and advance the play cursor, without recovery.
pub fn process_raw<N: Node + ?Sized>(
    ctx: &Context,
    node: &mut N,
    count: Count,
    input: Option<&mut Stream>,
    output: Option<&mut Stream>,
) -> Result<Count> {
    let n = node.process(ctx, count, input, output)?;
    if n > 0 {
        node.base_mut().offset += n;
    }
    Ok(n)
}

/// Dispatch `process` with cursor bookkeeping and local recovery of
/// the cheap signals: `Silence` zero-fills the output for the
/// requested count, `Noop` copies the input straight through. A `Noop`
/// with no input to copy is returned to the caller untouched.
pub fn process<N: Node + ?Sized>(
    ctx: &Context,
    node: &mut N,
    count: Count,
    mut input: Option<&mut Stream>,
    mut output: Option<&mut Stream>,
) -> Result<Count> {
    match process_raw(ctx, node, count, input.as_deref_mut(), output.as_deref_mut()) {
        Ok(n) => Ok(n),
        Err(Error::Silence) => {
            trace!(count, "recovering silence as zero-fill");
            let n = match output {
                Some(out) => out.write0(count),
                None => count,
            };
            if n > 0 {
                node.base_mut().offset += n;
            }
            Ok(n)
        }
        Err(Error::Noop) => match input {
            Some(inp) => {
                trace!(count, "recovering no-op as pass-through");
                let n = match output {
                    Some(out) => out.write(ctx, count, Some(inp)),
                    None => count,
                };
                if n > 0 {
                    node.base_mut().offset += n;
                }
                Ok(n)
            }
            None => Err(Error::Noop),
        },
        Err(e) => Err(e),
    }
}

/// Set the play cursor according to `whence`, dispatching to the
/// node's own `seek` for internal repositioning.
pub fn seek<N: Node + ?Sized>(
    ctx: &Context,
    node: &mut N,
    offset: Count,
    whence: Whence,
) -> Result<Count> {
    let new_offset = match whence {
        Whence::Set => offset,
        Whence::Cur => node.base().offset + offset,
        Whence::End => {
            let len = node.length(ctx);
            if len < 0 {
                return Err(Error::Invalid);
            }
            len + offset
        }
    };

    let set = node.seek(ctx, new_offset)?;
    node.base_mut().offset = set;
    Ok(set)
}

/// Merge the ambient context into the node's recorded limit, then run
/// its `prepare` if `ready` reports the node cannot cope as-is.
/// Idempotent while `ready` stays true.
pub fn prepare<N: Node + ?Sized>(ctx: &Context, node: &mut N) -> Result<()> {
    let is_ready = node.ready(ctx);
    ctx.merge_into(&mut node.base_mut().limit);
    if !is_ready {
        node.prepare(ctx)?;
    }
    Ok(())
}

/// Write a typed runtime parameter, returning any previous value.
pub fn set_parameter<N: Node + ?Sized>(node: &mut N, key: usize, value: Param) -> Option<Param> {
    node.base_mut().params.insert(key, value)
}

/// Read back a runtime parameter.
pub fn get_parameter<N: Node + ?Sized>(node: &N, key: usize) -> Option<Param> {
    node.base().params.get(&key).cloned()
}

/// Resolve a named entry of the node's runtime parameter scheme.
pub fn parameter_key<N: Node + ?Sized>(node: &N, name: &str) -> Result<usize> {
    let plugin = node.base().plugin.as_ref().ok_or(Error::NoEntity)?;
    plugin.process_key(name)
}

/// The declared type of a runtime parameter key.
pub fn parameter_kind<N: Node + ?Sized>(node: &N, key: usize) -> Result<ParamKind> {
    let plugin = node.base().plugin.as_ref().ok_or(Error::NoEntity)?;
    plugin
        .process_scheme
        .get(key)
        .map(|scheme| scheme.kind)
        .ok_or(Error::NoEntity)
}

fn plugin_flags<N: Node + ?Sized>(node: &N) -> Result<crate::plugin::PluginFlags> {
    node.base()
        .plugin
        .as_ref()
        .map(|p| p.flags)
        .ok_or(Error::NoEntity)
}

/// Whether the node's plugin declares its instances writeable.
pub fn is_writeable<N: Node + ?Sized>(node: &N) -> Result<bool> {
    plugin_flags(node).map(|f| f.writeable)
}

/// Whether the node's plugin declares its instances seekable.
pub fn is_seekable<N: Node + ?Sized>(node: &N) -> Result<bool> {
    plugin_flags(node).map(|f| f.seekable)
}

/// Whether the node's plugin declares its instances cacheable.
pub fn is_cacheable<N: Node + ?Sized>(node: &N) -> Result<bool> {
    plugin_flags(node).map(|f| f.cacheable)
}

/// Whether the node's plugin declares its instances causal.
pub fn is_causal<N: Node + ?Sized>(node: &N) -> Result<bool> {
    plugin_flags(node).map(|f| f.causal)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A node producing a fixed ramp, for exercising the wrappers.
    struct Ramp {
        base: Base,
        fail_with: Option<Error>,
    }

    impl Ramp {
        fn new(ctx: &Context) -> Ramp {
            Ramp {
                base: Base::new(ctx),
                fail_with: None,
            }
        }
    }

    impl Node for Ramp {
        fn base(&self) -> &Base {
            &self.base
        }
        fn base_mut(&mut self) -> &mut Base {
            &mut self.base
        }
        fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
            Ok(node_ref(Ramp::new(ctx)))
        }
        fn process(
            &mut self,
            _ctx: &Context,
            count: Count,
            _input: Option<&mut Stream>,
            _output: Option<&mut Stream>,
        ) -> Result<Count> {
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(count),
            }
        }
        fn length(&self, _ctx: &Context) -> Count {
            1000
        }
    }

    #[test]
    fn process_advances_the_cursor() {
        let ctx = Context::default();
        let mut node = Ramp::new(&ctx);
        let n = process(&ctx, &mut node, 64, None, None).unwrap();
        assert_eq!(n, 64);
        assert_eq!(tell(&node), 64);
        process(&ctx, &mut node, 36, None, None).unwrap();
        assert_eq!(tell(&node), 100);
    }

    #[test]
    fn seek_whence_modes() {
        let ctx = Context::default();
        let mut node = Ramp::new(&ctx);
        assert_eq!(seek(&ctx, &mut node, 10, Whence::Set).unwrap(), 10);
        assert_eq!(seek(&ctx, &mut node, 5, Whence::Cur).unwrap(), 15);
        assert_eq!(seek(&ctx, &mut node, -100, Whence::End).unwrap(), 900);
        assert_eq!(tell(&node), 900);
    }

    #[test]
    fn silence_recovery_zero_fills_and_advances() {
        let ctx = Context::default();
        let mut node = Ramp::new(&ctx);
        node.fail_with = Some(Error::Silence);

        let mut out = Stream::new_contiguous(&ctx, 32);
        let n = process(&ctx, &mut node, 32, None, Some(&mut out)).unwrap();
        assert_eq!(n, 32);
        assert_eq!(tell(&node), 32, "cursor advances across the recovered region");
    }

    #[test]
    fn noop_without_input_is_not_recovered() {
        let ctx = Context::default();
        let mut node = Ramp::new(&ctx);
        node.fail_with = Some(Error::Noop);

        let mut out = Stream::new_contiguous(&ctx, 32);
        let err = process(&ctx, &mut node, 32, None, Some(&mut out)).unwrap_err();
        assert_eq!(err, Error::Noop);
        assert_eq!(tell(&node), 0, "cursor untouched when nothing was recovered");
    }

    #[test]
    fn other_errors_bubble() {
        let ctx = Context::default();
        let mut node = Ramp::new(&ctx);
        node.fail_with = Some(Error::Invalid);
        let err = process(&ctx, &mut node, 8, None, None).unwrap_err();
        assert_eq!(err, Error::Invalid);
    }

    #[test]
    fn prepare_is_idempotent_while_ready() {
        let ctx = Context::default();
        let mut node = Ramp::new(&ctx);
        prepare(&ctx, &mut node).unwrap();
        let limit = node.base().limit().clone();
        prepare(&ctx, &mut node).unwrap();
        assert_eq!(node.base().limit(), &limit);
    }

    #[test]
    fn parameters_round_trip() {
        let ctx = Context::default();
        let mut node = Ramp::new(&ctx);
        set_parameter(&mut node, 3, Param::Float(0.5));
        assert_eq!(get_parameter(&node, 3), Some(Param::Float(0.5)));
        assert_eq!(get_parameter(&node, 4), None);
    }
}
