//! Primitive operations over raw blocks of PCM samples.
//!
//! Everything here works on plain slices with no indirection, so these
//! loops are the natural target for auto-vectorisation. The chunk and
//! channel layers clamp window bounds before calling down; slice
//! lengths arriving here are already matched.

use crate::types::{Count, Pcm};

/// Zero a region.
pub fn clear(data: &mut [Pcm]) {
    data.fill(0.0);
}

/// Fill a region with a constant value.
pub fn set(data: &mut [Pcm], value: Pcm) {
    data.fill(value);
}

/// Multiply a region by a constant gain, in place.
pub fn gain(data: &mut [Pcm], gain: Pcm) {
    for v in data.iter_mut() {
        *v *= gain;
    }
}

/// Copy `src` into `dest`.
pub fn copy(src: &[Pcm], dest: &mut [Pcm]) {
    dest.copy_from_slice(src);
}

/// Add `src` into `dest`, in place.
pub fn add(src: &[Pcm], dest: &mut [Pcm]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d += *s;
    }
}

/// Multiply `dest` by `src`, in place.
pub fn mult(src: &[Pcm], dest: &mut [Pcm]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d *= *s;
    }
}

/// Fade `dest` by `src`: `dest *= 1 - src`.
pub fn fade(src: &[Pcm], dest: &mut [Pcm]) {
    for (d, s) in dest.iter_mut().zip(src) {
        *d *= 1.0 - *s;
    }
}

/// Blend `src` into `dest` by per-sample amounts in `blend`:
/// `dest = dest * b + src * (1 - b)`.
pub fn blend(src: &[Pcm], blend: &[Pcm], dest: &mut [Pcm]) {
    for ((d, s), b) in dest.iter_mut().zip(src).zip(blend) {
        *d = *d * *b + *s * (1.0 - *b);
    }
}

/// Interleave two equal-length channels into `dest`, which must hold
/// `2 * src1.len()` samples.
pub fn interleave_2(src1: &[Pcm], src2: &[Pcm], dest: &mut [Pcm]) {
    for (i, (a, b)) in src1.iter().zip(src2).enumerate() {
        dest[2 * i] = *a;
        dest[2 * i + 1] = *b;
    }
}

/// Deinterleave `src` into two equal-length channels. `src` must hold
/// `2 * dest1.len()` samples.
pub fn deinterleave_2(dest1: &mut [Pcm], dest2: &mut [Pcm], src: &[Pcm]) {
    for (i, (a, b)) in dest1.iter_mut().zip(dest2.iter_mut()).enumerate() {
        *a = src[2 * i];
        *b = src[2 * i + 1];
    }
}

/// Write samples along the line through `(x1, y1)` and `(x2, y2)`,
/// starting at x position `offset`. `x2` must differ from `x1`.
pub fn write_linear(
    data: &mut [Pcm],
    x1: Count,
    y1: Pcm,
    x2: Count,
    y2: Pcm,
    offset: Count,
) {
    let dx = (x2 - x1) as Pcm;
    for (i, v) in data.iter_mut().enumerate() {
        *v = y1 + (i as Count + offset - x1) as Pcm * (y2 - y1) / dx;
    }
}
