//! # Mixdown: an audio mixing and sequencing engine
//!
//! Mixdown assembles a hierarchical score and renders it into
//! multichannel floating-point PCM by pulling samples on demand. A
//! score is built from four levels of containers:
//!
//! - a [`Deck`] mixes its tracks in parallel;
//! - a [`Track`] chains its layers in series, bottom to top;
//! - a [`Layer`] sequences sounds in time under a chosen unit
//!   (samples, seconds, or 24ths of a beat);
//! - a [`Sound`] places a source node at a start time for a duration,
//!   with optional gain and blend envelopes.
//!
//! Everything, from generators and envelopes up to whole decks,
//! implements the same [`Node`] contract, so a deck can be sequenced
//! as the source of a sound inside another deck. Sources may be shared
//! between sounds; the engine isolates them by seeking before every
//! read.
//!
//! ## Quick start
//!
//! ```
//! use mixdown::{node, node_ref, Deck, Env, Sound, Stream, Time, TimeKind};
//! use mixdown::nodes::squaretone::SquareTone;
//!
//! let env = Env::new();
//!
//! let mut deck = Deck::new(&env);
//! let track = deck.add_track(&env);
//! let layer = track.add_layer(&env, TimeKind::Samples);
//! let tone = node_ref(SquareTone::new(&env, 440.0));
//! layer.add_sound(
//!     &env,
//!     Sound::new(&env, tone, Time::Samples(0), Time::Samples(64)),
//! );
//!
//! let mut out = Stream::new_contiguous(&env, 64);
//! let n = node::process(&env, &mut deck, 64, None, Some(&mut out)).unwrap();
//! assert_eq!(n, 64);
//! ```
//!
//! ## Time and tempo
//!
//! [`Time`] values are tagged with their unit and convert explicitly
//! through the ambient [`Context`] (sample rate and tempo). Layers
//! indexed in beat24s follow tempo changes: the same musical position
//! is re-anchored to its new sample offset.
//!
//! ## Errors
//!
//! Fallible operations return [`Result`]. Two error values are cheap
//! signals rather than failures: [`Error::Silence`] ("the right output
//! is zeros") and [`Error::Noop`] ("I would not change the data"),
//! which containers recover into zero-fills and pass-throughs.

pub mod channel;
pub mod chunk;
pub mod context;
pub mod deck;
pub mod envelope;
pub mod error;
pub mod layer;
pub mod node;
pub mod nodes;
pub mod pcm;
pub mod plugin;
pub mod render;
pub mod sound;
pub mod stream;
pub mod time;
pub mod track;
pub mod types;
pub mod world;

pub use channel::Channel;
pub use chunk::Chunk;
pub use context::{ChannelName, ChannelSet, Context};
pub use deck::Deck;
pub use envelope::{Envelope, EnvelopeShape, Point};
pub use error::{Error, Result};
pub use layer::Layer;
pub use node::{node_ref, Node, NodeRef, Whence};
pub use plugin::{Param, ParamKind, ParamScheme, ParamSet, Plugin};
pub use render::{RenderConfig, RenderStats, Renderer};
pub use sound::Sound;
pub use stream::Stream;
pub use time::{Time, TimeKind};
pub use track::Track;
pub use types::{Count, Pcm, COUNT_INFINITE};
pub use world::{Env, World};
