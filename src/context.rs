//! The ambient rendering context: sample rate, tempo, channel set and
//! mix-buffer length.
//!
//! Every node records the context it was last prepared against (its
//! "context limit"); before a render the ambient context is merged into
//! that limit so a root render negotiates enough buffer capacity and
//! channel coverage for every node downstream.

use std::collections::BTreeSet;

use crate::types::Count;

/// Default mix-buffer length in samples.
pub const DEFAULT_MIXLENGTH: Count = 1024;
/// Default sample rate in Hz.
pub const DEFAULT_SAMPLERATE: f64 = 44100.0;
/// Default tempo in beats per minute.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Names for the spatial voices a stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelName {
    Left,
    Right,
    Centre,
    Rear,
    RearLeft,
    RearRight,
    RearCentre,
    /// Low frequency effects.
    Lfe,
}

/// A set of channel names.
///
/// Streams created under a context get one channel per name in its
/// set, and stream operations only touch channels present in the
/// ambient set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelSet {
    names: BTreeSet<ChannelName>,
}

impl ChannelSet {
    pub fn new() -> ChannelSet {
        ChannelSet::default()
    }

    /// Just LEFT.
    pub fn mono() -> ChannelSet {
        let mut set = ChannelSet::new();
        set.insert(ChannelName::Left);
        set
    }

    /// LEFT and RIGHT.
    pub fn stereo() -> ChannelSet {
        let mut set = ChannelSet::new();
        set.insert(ChannelName::Left);
        set.insert(ChannelName::Right);
        set
    }

    pub fn insert(&mut self, name: ChannelName) -> bool {
        self.names.insert(name)
    }

    pub fn remove(&mut self, name: ChannelName) -> bool {
        self.names.remove(&name)
    }

    pub fn contains(&self, name: ChannelName) -> bool {
        self.names.contains(&name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChannelName> + '_ {
        self.names.iter().copied()
    }

    /// True if every name in `other` is present in `self`.
    pub fn is_superset(&self, other: &ChannelSet) -> bool {
        self.names.is_superset(&other.names)
    }

    /// Add every name from `other` that is missing here.
    pub fn union_with(&mut self, other: &ChannelSet) {
        for name in other.iter() {
            self.names.insert(name);
        }
    }
}

/// The ambient context a render runs under.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    samplerate: f64,
    tempo: f64,
    channels: ChannelSet,
    mixlength: Count,
}

impl Default for Context {
    fn default() -> Context {
        Context {
            samplerate: DEFAULT_SAMPLERATE,
            tempo: DEFAULT_TEMPO,
            channels: ChannelSet::mono(),
            mixlength: DEFAULT_MIXLENGTH,
        }
    }
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn samplerate(&self) -> f64 {
        self.samplerate
    }

    /// Replace the sample rate, returning the previous value.
    pub fn set_samplerate(&mut self, samplerate: f64) -> f64 {
        std::mem::replace(&mut self.samplerate, samplerate)
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Replace the tempo, returning the previous value.
    pub fn set_tempo(&mut self, tempo: f64) -> f64 {
        std::mem::replace(&mut self.tempo, tempo)
    }

    pub fn mixlength(&self) -> Count {
        self.mixlength
    }

    /// Replace the internal mix-buffer length, returning the previous
    /// value. Takes effect on nodes at their next preparation.
    pub fn set_mixlength(&mut self, mixlength: Count) -> Count {
        std::mem::replace(&mut self.mixlength, mixlength)
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Replace the channel set, returning the previous one. Only the
    /// names are taken; streams materialise the actual channels.
    pub fn set_channels(&mut self, channels: ChannelSet) -> ChannelSet {
        std::mem::replace(&mut self.channels, channels)
    }

    /// Merge this (ambient) context into a node's recorded limit:
    /// sample rate and tempo are taken verbatim, mixlength grows to
    /// the maximum, and the channel sets are unioned.
    pub fn merge_into(&self, dest: &mut Context) {
        dest.samplerate = self.samplerate;
        dest.tempo = self.tempo;
        if self.mixlength > dest.mixlength {
            dest.mixlength = self.mixlength;
        }
        dest.channels.union_with(&self.channels);
    }
}
