//! Base sample and count types shared across the engine.

/// A single floating-point PCM sample. All internal signal math uses
/// this width.
pub type Pcm = f32;

/// A signed sample count, wide enough for multi-hour streams at any
/// practical sample rate.
pub type Count = i64;

/// Sentinel length for unbounded sources (tone generators, noise).
///
/// Finite lengths are always strictly smaller, so `min` clamping
/// against a window length works without special cases.
pub const COUNT_INFINITE: Count = i64::MAX - 1;
