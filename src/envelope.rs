//! Keyframe-driven control signal generation.
//!
//! An envelope holds points sorted by time and generates
//! sample-accurate values between them. With no points it is a null
//! node; with one point it is a constant; with two or more it
//! interpolates according to its shape. The spline shape is declared
//! but not evaluated; processing a spline envelope is an error.
//!
//! Past its last point a linear envelope keeps extrapolating along the
//! final segment's gradient rather than holding the last value, so an
//! envelope never goes silent just because the score ran beyond its
//! last keyframe. Callers wanting a hold add a final flat segment.

use tracing::trace;

use crate::context::{ChannelName, Context};
use crate::error::{Error, Result};
use crate::node::{node_ref, Base, Node, NodeRef};
use crate::pcm;
use crate::stream::Stream;
use crate::time::{Time, TimeKind};
use crate::types::{Count, Pcm};

/// An envelope keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub time: Time,
    pub value: Pcm,
}

/// Interpolation shape between keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    Linear,
    Spline,
}

/// Processing routine selected by the optimiser from point count and
/// shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routine {
    Empty,
    Constant,
    Linear,
    Spline,
}

/// A keyframe envelope node.
#[derive(Debug)]
pub struct Envelope {
    base: Base,
    shape: EnvelopeShape,
    unit: TimeKind,
    points: Vec<Point>,
    routine: Routine,
    cursor_point: Option<usize>,
    cursor_offset: Count,
}

impl Envelope {
    pub fn new(ctx: &Context, shape: EnvelopeShape) -> Envelope {
        let mut envelope = Envelope {
            base: Base::new(ctx),
            shape,
            unit: TimeKind::Samples,
            points: Vec::new(),
            routine: Routine::Empty,
            cursor_point: None,
            cursor_offset: 0,
        };
        envelope.optimise();
        envelope
    }

    pub fn shape(&self) -> EnvelopeShape {
        self.shape
    }

    pub fn set_shape(&mut self, shape: EnvelopeShape) -> EnvelopeShape {
        let old = std::mem::replace(&mut self.shape, shape);
        self.optimise();
        old
    }

    pub fn time_unit(&self) -> TimeKind {
        self.unit
    }

    /// Change the envelope's time unit, converting every point's time
    /// under the given context.
    pub fn set_time_unit(&mut self, ctx: &Context, unit: TimeKind) -> TimeKind {
        let old = self.unit;
        if old != unit {
            for point in self.points.iter_mut() {
                point.time = point.time.convert(ctx, unit);
            }
            self.unit = unit;
        }
        old
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Insert a keyframe, keeping points sorted by time. The time must
    /// carry the envelope's unit.
    pub fn add_point(&mut self, time: Time, value: Pcm) -> Result<usize> {
        if time.kind() != self.unit {
            return Err(Error::Invalid);
        }
        let point = Point { time, value };
        let pos = self
            .points
            .iter()
            .position(|p| p.time.gt(&time))
            .unwrap_or(self.points.len());
        self.points.insert(pos, point);
        self.optimise();
        Ok(pos)
    }

    pub fn remove_point(&mut self, index: usize) -> Result<Point> {
        if index >= self.points.len() {
            return Err(Error::NoEntity);
        }
        let point = self.points.remove(index);
        self.optimise();
        Ok(point)
    }

    /// Multiply every point's value by `gain`.
    pub fn scale(&mut self, gain: Pcm) {
        for point in self.points.iter_mut() {
            point.value *= gain;
        }
    }

    /// Add `delta` to every point's time. The delta must carry the
    /// envelope's unit.
    pub fn shift(&mut self, delta: Time) -> Result<()> {
        if delta.kind() != self.unit {
            return Err(Error::Invalid);
        }
        for point in self.points.iter_mut() {
            point.time = point.time.add(delta);
        }
        Ok(())
    }

    /// The time of the last keyframe, or zero with no points.
    pub fn duration(&self) -> Time {
        match self.points.last() {
            Some(p) => p.time,
            None => Time::zero(self.unit),
        }
    }

    /// The envelope's value at `time`, interpolating between keyframes
    /// and extrapolating along the first/last segment outside them.
    pub fn value_at(&self, ctx: &Context, time: Time) -> Pcm {
        let x = time.to_samples(ctx) as f64;
        self.value_at_x(ctx, x)
    }

    fn value_at_x(&self, ctx: &Context, x: f64) -> Pcm {
        match self.points.len() {
            0 => 0.0,
            1 => self.points[0].value,
            len => {
                // Bracketing segment, clamped to the first/last for
                // extrapolation.
                let mut l = self
                    .points
                    .iter()
                    .rposition(|p| (p.time.to_samples(ctx) as f64) <= x)
                    .unwrap_or(0);
                if l + 1 >= len {
                    l = len - 2;
                }
                let px = self.points[l].time.to_samples(ctx) as f64;
                let npx = self.points[l + 1].time.to_samples(ctx) as f64;
                let py = self.points[l].value as f64;
                let npy = self.points[l + 1].value as f64;
                if npx == px {
                    npy as Pcm
                } else {
                    (py + (x - px) * (npy - py) / (npx - px)) as Pcm
                }
            }
        }
    }

    /// Area under the envelope between `t1` and `t2`, measured in
    /// value × samples. Trapezoidal for the linear shape.
    pub fn integral(&self, ctx: &Context, t1: Time, t2: Time) -> Pcm {
        let x1 = t1.to_samples(ctx) as f64;
        let x2 = t2.to_samples(ctx) as f64;
        if x2 <= x1 {
            return 0.0;
        }

        // Breakpoints: the interval ends plus every keyframe inside.
        let mut xs = vec![x1];
        for p in self.points.iter() {
            let x = p.time.to_samples(ctx) as f64;
            if x > x1 && x < x2 {
                xs.push(x);
            }
        }
        xs.push(x2);

        let mut area = 0.0f64;
        for pair in xs.windows(2) {
            let a = self.value_at_x(ctx, pair[0]) as f64;
            let b = self.value_at_x(ctx, pair[1]) as f64;
            area += (a + b) / 2.0 * (pair[1] - pair[0]);
        }
        area as Pcm
    }

    /// Index of the last point at or before sample offset `x`.
    fn point_index_before(&self, ctx: &Context, x: Count) -> Option<usize> {
        self.points
            .iter()
            .rposition(|p| p.time.to_samples(ctx) <= x)
    }

    /// Rebind the processing routine to the current point count and
    /// shape.
    fn optimise(&mut self) {
        self.routine = match (self.points.len(), self.shape) {
            (0, _) => Routine::Empty,
            (1, _) => Routine::Constant,
            (_, EnvelopeShape::Linear) => Routine::Linear,
            (_, EnvelopeShape::Spline) => Routine::Spline,
        };
    }

    fn process_constant(&mut self, ctx: &Context, count: Count, out: &mut Stream) -> Count {
        let value = self.points[0].value;
        let n = out.chunkfuncify(ctx, count, &mut |d, _, _| {
            pcm::set(d, value);
            Ok(d.len() as Count)
        });
        self.cursor_offset += n;
        n
    }

    fn process_linear(&mut self, ctx: &Context, count: Count, out: &mut Stream) -> Count {
        let points = &self.points;
        // Every channel of the output gets the same control signal, so
        // the cursor restarts from the call's origin per channel.
        let start_point = self.cursor_point;
        let start_offset = self.cursor_offset;
        let mut cur_point = start_point;
        let mut cur_offset = start_offset;
        let mut last_name: Option<ChannelName> = None;

        let n = out.chunkfuncify(ctx, count, &mut |d, _, name| {
            if last_name != Some(name) {
                cur_point = start_point;
                cur_offset = start_offset;
                last_name = Some(name);
            }
            write_linear_region(points, ctx, &mut cur_point, &mut cur_offset, d);
            Ok(d.len() as Count)
        });

        self.cursor_point = cur_point;
        self.cursor_offset = cur_offset;
        n
    }
}

/// Fill `d` with linear envelope data from position `*pos`, resuming
/// from the cached bracketing point.
fn write_linear_region(
    points: &[Point],
    ctx: &Context,
    cursor_point: &mut Option<usize>,
    pos: &mut Count,
    d: &mut [Pcm],
) {
    let count = d.len() as Count;
    debug_assert!(points.len() >= 2, "linear routine needs two points");

    let mut l = cursor_point.unwrap_or(0);
    if l + 1 >= points.len() {
        l = points.len() - 2;
    }

    let mut written = 0usize;
    let mut remaining = count;
    while remaining > 0 {
        let px = points[l].time.to_samples(ctx);
        let npx = points[l + 1].time.to_samples(ctx);
        let last_segment = l + 2 >= points.len();

        let n = if last_segment {
            remaining
        } else {
            remaining.min(npx - *pos)
        };
        if n <= 0 {
            // The cursor has passed this segment; move to the next.
            l += 1;
            continue;
        }

        let region = &mut d[written..written + n as usize];
        if npx == px {
            pcm::set(region, points[l + 1].value);
        } else {
            pcm::write_linear(region, px, points[l].value, npx, points[l + 1].value, *pos);
        }
        written += n as usize;
        remaining -= n;
        *pos += n;

        if remaining > 0 {
            l += 1;
        }
    }

    *cursor_point = Some(l);
}

impl Node for Envelope {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        let mut clone = Envelope::new(ctx, self.shape);
        clone.unit = self.unit;
        clone.points = self.points.clone();
        clone.optimise();
        Ok(node_ref(clone))
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
        trace!(count, routine = ?self.routine, "processing envelope");
        match self.routine {
            Routine::Empty => Err(Error::Noop),
            Routine::Constant => Ok(self.process_constant(ctx, count, out)),
            Routine::Linear => Ok(self.process_linear(ctx, count, out)),
            Routine::Spline => Err(Error::Invalid),
        }
    }

    fn length(&self, ctx: &Context) -> Count {
        match self.routine {
            Routine::Empty => 0,
            _ => self.duration().to_samples(ctx),
        }
    }

    fn seek(&mut self, ctx: &Context, offset: Count) -> Result<Count> {
        self.cursor_point = self.point_index_before(ctx, offset);
        self.cursor_offset = offset;
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChannelName;
    use crate::node;

    fn render(env: &mut Envelope, ctx: &Context, count: Count) -> Vec<Pcm> {
        let mut out = Stream::new_contiguous(ctx, count);
        node::process(ctx, env, count, None, Some(&mut out)).unwrap();
        out.find_channel(ChannelName::Left).unwrap().chunks()[0]
            .data()
            .to_vec()
    }

    #[test]
    fn empty_envelope_is_a_noop() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        let mut out = Stream::new_contiguous(&ctx, 8);
        let err = node::process(&ctx, &mut env, 8, None, Some(&mut out)).unwrap_err();
        assert_eq!(err, Error::Noop);
        assert_eq!(env.length(&ctx), 0);
    }

    #[test]
    fn single_point_is_constant() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(0), 0.7).unwrap();
        let out = render(&mut env, &ctx, 16);
        assert!(out.iter().all(|&v| v == 0.7));
    }

    #[test]
    fn linear_ramp_is_sample_accurate() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(0), 0.0).unwrap();
        env.add_point(Time::Samples(100), 1.0).unwrap();
        let out = render(&mut env, &ctx, 100);
        for (i, &v) in out.iter().enumerate() {
            assert_eq!(v, i as Pcm / 100.0, "sample {i}");
        }
    }

    #[test]
    fn extrapolates_past_the_last_point() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(0), 0.0).unwrap();
        env.add_point(Time::Samples(10), 1.0).unwrap();
        let out = render(&mut env, &ctx, 20);
        assert_eq!(out[10], 1.0);
        assert_eq!(out[15], 1.5, "gradient continues past the final keyframe");
    }

    #[test]
    fn points_stay_sorted() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(50), 0.5).unwrap();
        env.add_point(Time::Samples(0), 0.0).unwrap();
        env.add_point(Time::Samples(25), 1.0).unwrap();
        let times: Vec<Count> = env
            .points()
            .iter()
            .map(|p| p.time.to_samples(&ctx))
            .collect();
        assert_eq!(times, vec![0, 25, 50]);
    }

    #[test]
    fn mismatched_point_unit_is_rejected() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        assert_eq!(
            env.add_point(Time::Beat24s(0), 1.0).unwrap_err(),
            Error::Invalid
        );
    }

    #[test]
    fn length_is_last_point_in_samples() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.set_time_unit(&ctx, TimeKind::Beat24s);
        env.add_point(Time::Beat24s(0), 0.0).unwrap();
        env.add_point(Time::Beat24s(24), 1.0).unwrap();
        assert_eq!(env.length(&ctx), 22050);
    }

    #[test]
    fn seek_refinds_the_bracketing_point() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(0), 0.0).unwrap();
        env.add_point(Time::Samples(100), 1.0).unwrap();

        node::seek(&ctx, &mut env, 50, node::Whence::Set).unwrap();
        let out = render(&mut env, &ctx, 10);
        assert_eq!(out[0], 0.5);
    }

    #[test]
    fn spline_processing_is_an_error() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Spline);
        env.add_point(Time::Samples(0), 0.0).unwrap();
        env.add_point(Time::Samples(10), 1.0).unwrap();
        let mut out = Stream::new_contiguous(&ctx, 8);
        let err = node::process(&ctx, &mut env, 8, None, Some(&mut out)).unwrap_err();
        assert_eq!(err, Error::Invalid);
    }

    #[test]
    fn scale_and_shift_transform_points() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(10), 0.5).unwrap();
        env.scale(2.0);
        env.shift(Time::Samples(5)).unwrap();
        assert_eq!(env.points()[0].value, 1.0);
        assert_eq!(env.points()[0].time, Time::Samples(15));
    }

    #[test]
    fn value_at_and_integral() {
        let ctx = Context::default();
        let mut env = Envelope::new(&ctx, EnvelopeShape::Linear);
        env.add_point(Time::Samples(0), 0.0).unwrap();
        env.add_point(Time::Samples(100), 1.0).unwrap();
        assert_eq!(env.value_at(&ctx, Time::Samples(50)), 0.5);
        // Area of the triangle under the ramp.
        let area = env.integral(&ctx, Time::Samples(0), Time::Samples(100));
        assert!((area - 50.0).abs() < 1e-3, "got {area}");
    }
}
