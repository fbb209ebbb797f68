//! White noise generator.
//!
//! Samples come from a seeded PRNG, so two noise nodes created with
//! the same seed produce bit-identical output. The node is infinite
//! and unseekable; seeking just records the offset.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::{node_ref, Base, Node, NodeRef};
use crate::plugin::{MetaText, Param, ParamKind, ParamScheme, ParamSet, Plugin, PluginFlags};
use crate::stream::Stream;
use crate::types::{Count, COUNT_INFINITE};
use crate::world::Env;

/// Key of the optional `seed` init parameter.
pub const SEED_KEY: usize = 0;

/// A deterministic white noise source.
pub struct Noise {
    base: Base,
    seed: u64,
    rng: StdRng,
}

impl Noise {
    /// Noise seeded with zero.
    pub fn new(ctx: &Context) -> Noise {
        Noise::with_seed(ctx, 0)
    }

    pub fn with_seed(ctx: &Context, seed: u64) -> Noise {
        Noise {
            base: Base::new(ctx),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Node for Noise {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        Ok(node_ref(Noise::with_seed(ctx, self.seed)))
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
        let rng = &mut self.rng;
        Ok(out.chunkfuncify(ctx, count, &mut |d, _, _| {
            for v in d.iter_mut() {
                *v = rng.gen::<f32>() * 2.0 - 1.0;
            }
            Ok(d.len() as Count)
        }))
    }

    fn length(&self, _ctx: &Context) -> Count {
        COUNT_INFINITE
    }
}

/// The `builtin::noise` plugin descriptor.
pub fn plugin() -> Plugin {
    Plugin {
        metatext: MetaText {
            identifier: "builtin::noise",
            category: "Generators::Noise",
            description: "White noise generator",
            copyright: "",
            url: "",
            authors: Vec::new(),
        },
        flags: PluginFlags::default(),
        init_scheme: vec![ParamScheme::new(
            "seed",
            "PRNG seed; equal seeds give identical output",
            ParamKind::Int,
        )],
        init: noise_init,
        process_scheme: Vec::new(),
        suggest: None,
    }
}

fn noise_init(env: &mut Env, params: &ParamSet) -> Result<NodeRef> {
    let seed = params
        .get(&SEED_KEY)
        .and_then(Param::as_int)
        .unwrap_or(0) as u64;
    Ok(node_ref(Noise::with_seed(env, seed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChannelName;
    use crate::node;

    fn render(noise: &mut Noise, ctx: &Context, count: Count) -> Vec<f32> {
        let mut out = Stream::new_contiguous(ctx, count);
        node::process(ctx, noise, count, None, Some(&mut out)).unwrap();
        out.find_channel(ChannelName::Left).unwrap().chunks()[0]
            .data()
            .to_vec()
    }

    #[test]
    fn deterministic_for_equal_seeds() {
        let ctx = Context::default();
        let a = render(&mut Noise::with_seed(&ctx, 0), &ctx, 256);
        let b = render(&mut Noise::with_seed(&ctx, 0), &ctx, 256);
        assert_eq!(a, b, "same seed must be bit-identical");

        let c = render(&mut Noise::with_seed(&ctx, 1), &ctx, 256);
        assert_ne!(a, c, "different seeds should differ");
    }

    #[test]
    fn samples_are_in_range() {
        let ctx = Context::default();
        let out = render(&mut Noise::new(&ctx), &ctx, 1024);
        assert!(out.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        // Not all equal; it is noise after all.
        assert!(out.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn noise_is_infinite() {
        let ctx = Context::default();
        let noise = Noise::new(&ctx);
        assert_eq!(noise.length(&ctx), COUNT_INFINITE);
    }
}
