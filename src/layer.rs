//! A layer: a time-indexed sequence of sounds.
//!
//! Sounds are kept sorted by start time in the layer's time unit.
//! Where no sound is playing the layer is transparent rather than
//! silent: input passes through unchanged. When two sounds overlap, the later
//! one truncates the earlier at its start; overlapping sounds are not
//! mixed.
//!
//! A layer indexed in beat24s watches the ambient tempo: when the
//! tempo changes between calls it re-anchors its cursor so the same
//! musical position maps to the new sample offset.

use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::{self, node_ref, Base, Node, NodeRef, Whence};
use crate::sound::Sound;
use crate::stream::Stream;
use crate::time::{Time, TimeKind};
use crate::types::Count;

/// An ordered sequence of sounds under one time unit.
pub struct Layer {
    base: Base,
    unit: TimeKind,
    sounds: Vec<Sound>,
    cursor: Option<usize>,
    current_tempo: f64,
    current_offset: Count,
}

impl Layer {
    pub fn new(ctx: &Context, unit: TimeKind) -> Layer {
        Layer {
            base: Base::new(ctx),
            unit,
            sounds: Vec::new(),
            cursor: None,
            current_tempo: ctx.tempo(),
            current_offset: 0,
        }
    }

    pub fn time_unit(&self) -> TimeKind {
        self.unit
    }

    /// Change the layer's time unit, converting every contained
    /// sound's start time and duration.
    pub fn set_time_unit(&mut self, ctx: &Context, unit: TimeKind) -> TimeKind {
        let old = self.unit;
        if old != unit {
            for sound in self.sounds.iter_mut() {
                let start = sound.start_time().convert(ctx, unit);
                let duration = sound.duration().convert(ctx, unit);
                sound.set_start_time_internal(start);
                sound.set_duration(duration);
            }
            self.unit = unit;
        }
        old
    }

    pub fn nr_sounds(&self) -> usize {
        self.sounds.len()
    }

    /// The sample offset reached by the last `process` or `seek`.
    pub fn current_offset(&self) -> Count {
        self.current_offset
    }

    pub fn sounds(&self) -> &[Sound] {
        &self.sounds
    }

    pub fn sound_mut(&mut self, index: usize) -> Option<&mut Sound> {
        self.sounds.get_mut(index)
    }

    /// Insert a sound, converting its times to the layer's unit and
    /// keeping the list sorted by start time.
    pub fn add_sound(&mut self, ctx: &Context, mut sound: Sound) -> &mut Sound {
        let start = sound.start_time().convert(ctx, self.unit);
        let duration = sound.duration().convert(ctx, self.unit);
        sound.set_start_time_internal(start);
        sound.set_duration(duration);

        let pos = self
            .sounds
            .iter()
            .position(|s| s.start_time().gt(&start))
            .unwrap_or(self.sounds.len());
        self.sounds.insert(pos, sound);
        debug!(position = pos, "sound added to layer");
        self.ensure_coherency(ctx);
        &mut self.sounds[pos]
    }

    pub fn remove_sound(&mut self, ctx: &Context, index: usize) -> Result<Sound> {
        if index >= self.sounds.len() {
            return Err(Error::NoEntity);
        }
        let sound = self.sounds.remove(index);
        self.ensure_coherency(ctx);
        Ok(sound)
    }

    /// Move a sound to a new start time, re-sorting the sequence.
    /// Returns the sound's new index.
    pub fn move_sound(&mut self, ctx: &Context, index: usize, start_time: Time) -> Result<usize> {
        if index >= self.sounds.len() {
            return Err(Error::NoEntity);
        }
        let mut sound = self.sounds.remove(index);
        sound.set_start_time_internal(start_time);
        let _ = self.add_sound(ctx, sound);
        let start = start_time.convert(ctx, self.unit);
        self.sounds
            .iter()
            .rposition(|s| s.start_time() == start)
            .ok_or(Error::NoEntity)
    }

    /// Index of the last sound starting at or before `time`.
    fn sound_index_before(&self, time: Time) -> Option<usize> {
        self.sounds.iter().rposition(|s| s.start_time().le(&time))
    }

    /// Index of the sound playing at `time`, if any.
    pub fn sound_at(&self, time: Time) -> Option<usize> {
        let i = self.sound_index_before(time)?;
        let s = &self.sounds[i];
        let end = s.start_time().add(s.duration());
        if end.le(&time) {
            None
        } else {
            Some(i)
        }
    }

    /// Index of the first sound starting at or after `time`.
    pub fn sound_after(&self, time: Time) -> Option<usize> {
        self.sounds.iter().position(|s| s.start_time().ge(&time))
    }

    /// Re-anchor the cursor at the current offset under the current
    /// context; called after structural changes and tempo changes.
    fn ensure_coherency(&mut self, ctx: &Context) {
        let offset = self.base.offset;
        let _ = Node::seek(self, ctx, offset);
        self.current_tempo = ctx.tempo();
    }

    pub(crate) fn duplicate(&self, ctx: &Context) -> Layer {
        let mut copy = Layer::new(ctx, self.unit);
        copy.sounds = self.sounds.iter().map(|s| s.duplicate(ctx)).collect();
        copy
    }

    /// Process one sound window: fill any gap before the sound from
    /// the input (transparency), then run the sound itself.
    #[allow(clippy::too_many_arguments)]
    fn process_sound(
        &mut self,
        ctx: &Context,
        current_offset: Count,
        index: usize,
        sound_offset: Count,
        sound_length: Count,
        count: Count,
        mut input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let mut remaining = count;
        let mut processed = 0;
        let mut position = current_offset;

        if sound_offset > position {
            let n = remaining.min(sound_offset - position);
            trace!(n, "layer transparent before next sound");
            let n = match output.as_deref_mut() {
                Some(out) => out.write(ctx, n, input.as_deref_mut()),
                None => n,
            };
            position += n;
            processed += n;
            remaining -= n;
        }

        if processed < count {
            let n = remaining.min(sound_offset + sound_length - position);
            let sound = &mut self.sounds[index];
            node::seek(ctx, sound, position - sound_offset, Whence::Set)?;
            match node::process(ctx, sound, n, input.as_deref_mut(), output.as_deref_mut()) {
                Ok(m) => processed += m,
                Err(Error::Noop) => {
                    // An exhausted sound with no input to pass through
                    // contributes silence for its window.
                    let z = match output.as_deref_mut() {
                        Some(out) => out.write0(n),
                        None => n,
                    };
                    processed += z;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(processed)
    }
}

impl Node for Layer {
    fn base(&self) -> &Base {
        &self.base
    }

    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    fn clone_node(&self, ctx: &Context) -> Result<NodeRef> {
        Ok(node_ref(self.duplicate(ctx)))
    }

    fn ready(&self, ctx: &Context) -> bool {
        self.base.encompasses_mixlength(ctx) && self.base.encompasses_channels(ctx)
    }

    fn prepare(&mut self, ctx: &Context) -> Result<()> {
        for sound in self.sounds.iter_mut() {
            node::prepare(ctx, sound)?;
        }
        Ok(())
    }

    fn process(
        &mut self,
        ctx: &Context,
        count: Count,
        mut input: Option<&mut Stream>,
        mut output: Option<&mut Stream>,
    ) -> Result<Count> {
        let mut current_offset = self.base.offset;

        trace!(count, offset = current_offset, "processing layer");

        // Tempo coherency: re-anchor musically-indexed layers when the
        // tempo moved under us.
        if self.unit == TimeKind::Beat24s && self.current_tempo != ctx.tempo() {
            debug!(
                old_tempo = self.current_tempo,
                new_tempo = ctx.tempo(),
                "tempo changed, re-anchoring layer"
            );
            self.ensure_coherency(ctx);
        }

        let mut remaining = count;
        let mut processed = 0;

        while remaining > 0 {
            let Some(index) = self.cursor else {
                // No more sounds: transparent to the end of the call.
                let n = match output.as_deref_mut() {
                    Some(out) => out.write(ctx, remaining, input.as_deref_mut()),
                    None => remaining,
                };
                current_offset += n;
                processed += n;
                remaining -= n;
                break;
            };

            let sound = &self.sounds[index];
            let sound_offset = sound.start_time().to_samples(ctx);
            let mut sound_length = sound.duration().to_samples(ctx);

            // A following sound truncates this one at its start.
            if let Some(next) = self.sounds.get(index + 1) {
                let next_offset = next.start_time().to_samples(ctx);
                if next_offset < sound_offset + sound_length {
                    sound_length = next_offset - sound_offset;
                }
            }

            trace!(index, sound_offset, sound_length, "next sound window");

            let n = self.process_sound(
                ctx,
                current_offset,
                index,
                sound_offset,
                sound_length,
                remaining,
                input.as_deref_mut(),
                output.as_deref_mut(),
            )?;

            current_offset += n;
            processed += n;
            remaining -= n;

            let cursor_before = self.cursor;
            if current_offset >= sound_offset + sound_length {
                self.cursor = if index + 1 < self.sounds.len() {
                    Some(index + 1)
                } else {
                    None
                };
            }

            // Zero progress is only acceptable when it moved the
            // cursor past a degenerate window.
            if n == 0 && self.cursor == cursor_before {
                break;
            }
        }

        if processed == 0 {
            return Err(Error::Noop);
        }

        self.current_offset = current_offset;
        Ok(processed)
    }

    fn length(&self, ctx: &Context) -> Count {
        self.sounds
            .iter()
            .map(|s| s.start_time().add(s.duration()).to_samples(ctx))
            .max()
            .unwrap_or(0)
    }

    fn seek(&mut self, ctx: &Context, offset: Count) -> Result<Count> {
        let time = Time::Samples(offset).convert(ctx, self.unit);
        self.cursor = self.sound_at(time).or_else(|| self.sound_after(time));
        self.current_offset = offset;
        Ok(offset)
    }

    fn flush(&mut self, ctx: &Context) -> Result<()> {
        if let Some(index) = self.cursor {
            self.sounds[index].flush(ctx)?;
        }
        Ok(())
    }
}
