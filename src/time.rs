//! Tagged time values for sequencing.
//!
//! A score position can be expressed in samples, in seconds, or in
//! 24ths of a beat (the engine's native musical unit). Arithmetic and
//! comparison are only defined between values of the same unit;
//! conversion between units is explicit and goes through the ambient
//! [`Context`], because it depends on the current sample rate and
//! tempo.

use crate::context::Context;
use crate::types::Count;

/// The unit a [`Time`] value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeKind {
    /// Integer sample frames.
    Samples,
    /// Floating-point seconds.
    Seconds,
    /// Integer 24ths of a beat.
    Beat24s,
}

/// A time value tagged with its unit.
///
/// Negative values are the per-unit invalid sentinels, produced by
/// failed conversions and by arithmetic on mismatched units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Time {
    Samples(Count),
    Seconds(f32),
    Beat24s(i32),
}

impl Time {
    /// Zero in the given unit.
    pub fn zero(kind: TimeKind) -> Time {
        match kind {
            TimeKind::Samples => Time::Samples(0),
            TimeKind::Seconds => Time::Seconds(0.0),
            TimeKind::Beat24s => Time::Beat24s(0),
        }
    }

    /// The invalid sentinel in the given unit.
    pub fn invalid(kind: TimeKind) -> Time {
        match kind {
            TimeKind::Samples => Time::Samples(-1),
            TimeKind::Seconds => Time::Seconds(-1.0),
            TimeKind::Beat24s => Time::Beat24s(-1),
        }
    }

    pub fn kind(&self) -> TimeKind {
        match self {
            Time::Samples(_) => TimeKind::Samples,
            Time::Seconds(_) => TimeKind::Seconds,
            Time::Beat24s(_) => TimeKind::Beat24s,
        }
    }

    pub fn is_invalid(&self) -> bool {
        match self {
            Time::Samples(x) => *x < 0,
            Time::Seconds(s) => *s < 0.0,
            Time::Beat24s(b) => *b < 0,
        }
    }

    /// Same-unit addition. Mixing units yields the invalid sentinel of
    /// the left operand's unit.
    pub fn add(self, other: Time) -> Time {
        match (self, other) {
            (Time::Samples(a), Time::Samples(b)) => Time::Samples(a + b),
            (Time::Seconds(a), Time::Seconds(b)) => Time::Seconds(a + b),
            (Time::Beat24s(a), Time::Beat24s(b)) => Time::Beat24s(a + b),
            _ => Time::invalid(self.kind()),
        }
    }

    /// Same-unit subtraction.
    pub fn sub(self, other: Time) -> Time {
        match (self, other) {
            (Time::Samples(a), Time::Samples(b)) => Time::Samples(a - b),
            (Time::Seconds(a), Time::Seconds(b)) => Time::Seconds(a - b),
            (Time::Beat24s(a), Time::Beat24s(b)) => Time::Beat24s(a - b),
            _ => Time::invalid(self.kind()),
        }
    }

    pub fn min(self, other: Time) -> Time {
        if other.lt(&self) {
            other
        } else {
            self
        }
    }

    pub fn max(self, other: Time) -> Time {
        if other.gt(&self) {
            other
        } else {
            self
        }
    }

    /// Same-unit less-than. Mismatched units compare false.
    pub fn lt(&self, other: &Time) -> bool {
        match (self, other) {
            (Time::Samples(a), Time::Samples(b)) => a < b,
            (Time::Seconds(a), Time::Seconds(b)) => a < b,
            (Time::Beat24s(a), Time::Beat24s(b)) => a < b,
            _ => false,
        }
    }

    pub fn gt(&self, other: &Time) -> bool {
        other.lt(self)
    }

    pub fn le(&self, other: &Time) -> bool {
        !self.gt(other)
    }

    pub fn ge(&self, other: &Time) -> bool {
        !self.lt(other)
    }

    /// Convert to another unit under the given context.
    ///
    /// Sample rate relates samples and seconds; tempo additionally
    /// relates beat24s to the other two. Converting an already-matching
    /// unit is the identity.
    pub fn convert(self, ctx: &Context, to: TimeKind) -> Time {
        if self.kind() == to {
            return self;
        }

        let samplerate = ctx.samplerate();
        let tempo = ctx.tempo();

        match (self, to) {
            (Time::Samples(x), TimeKind::Seconds) => {
                Time::Seconds((x as f64 / samplerate) as f32)
            }
            (Time::Samples(x), TimeKind::Beat24s) => {
                Time::Beat24s((x as f64 * tempo * 24.0 / (samplerate * 60.0)) as i32)
            }
            (Time::Seconds(s), TimeKind::Samples) => {
                Time::Samples((s as f64 * samplerate) as Count)
            }
            (Time::Seconds(s), TimeKind::Beat24s) => {
                Time::Beat24s((s as f64 * tempo * 24.0 / 60.0) as i32)
            }
            (Time::Beat24s(b), TimeKind::Samples) => {
                Time::Samples((b as f64 * samplerate * 60.0 / (tempo * 24.0)) as Count)
            }
            (Time::Beat24s(b), TimeKind::Seconds) => {
                Time::Seconds((b as f64 * 60.0 / (tempo * 24.0)) as f32)
            }
            _ => Time::invalid(to),
        }
    }

    /// The value in samples under the given context.
    pub fn to_samples(self, ctx: &Context) -> Count {
        match self.convert(ctx, TimeKind::Samples) {
            Time::Samples(x) => x,
            _ => -1,
        }
    }

    /// The value in seconds under the given context.
    pub fn to_seconds(self, ctx: &Context) -> f32 {
        match self.convert(ctx, TimeKind::Seconds) {
            Time::Seconds(s) => s,
            _ => -1.0,
        }
    }

    /// The value in 24ths of a beat under the given context.
    pub fn to_beat24s(self, ctx: &Context) -> i32 {
        match self.convert(ctx, TimeKind::Beat24s) {
            Time::Beat24s(b) => b,
            _ => -1,
        }
    }
}
