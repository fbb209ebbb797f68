//! Built-in node families.
//!
//! Each family is an ordinary plugin: it could equally well live
//! outside the crate and register itself through
//! [`Env::register_plugin`](crate::world::Env::register_plugin).
//! These four are compiled in because every score needs something to
//! play.

pub mod gain;
pub mod noise;
pub mod squaretone;
pub mod wavfile;

use crate::plugin::Plugin;

/// The plugins registered into every fresh world.
pub fn builtin_plugins() -> Vec<Plugin> {
    vec![
        noise::plugin(),
        squaretone::plugin(),
        gain::plugin(),
        wavfile::plugin(),
    ]
}
