//! Offline rendering: drive a root node to completion and collect the
//! result as a stream, an interleaved buffer, or a WAV file.

use std::path::Path;

use tracing::debug;

use crate::context::ChannelName;
use crate::channel::{self, Channel};
use crate::error::{Error, Result};
use crate::node::{self, Node, Whence};
use crate::nodes::wavfile;
use crate::pcm;
use crate::stream::Stream;
use crate::time::Time;
use crate::types::{Count, Pcm};
use crate::world::Env;

/// Configuration for an offline render.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// How much of the score to render.
    pub duration: Time,
    /// Gain applied to the final mix.
    pub master_gain: Pcm,
}

impl Default for RenderConfig {
    fn default() -> RenderConfig {
        RenderConfig {
            duration: Time::Seconds(1.0),
            master_gain: 1.0,
        }
    }
}

/// Renders a node tree from its start under the ambient context.
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Renderer {
        Renderer { config }
    }

    /// Render into a contiguous stream. An empty score renders as
    /// silence.
    pub fn render_stream(&self, env: &Env, root: &mut dyn Node) -> Result<Stream> {
        let count = self.config.duration.to_samples(env);
        if count <= 0 {
            return Err(Error::Invalid);
        }

        node::prepare(env, root)?;
        node::seek(env, root, 0, Whence::Set)?;

        let mut out = Stream::new_contiguous(env, count);
        match node::process(env, root, count, None, Some(&mut out)) {
            Ok(n) => debug!(rendered = n, requested = count, "render complete"),
            Err(Error::Noop) => debug!("empty score; rendering silence"),
            Err(e) => return Err(e),
        }

        if self.config.master_gain != 1.0 {
            out.seek_to(0);
            out.gain(env, count, self.config.master_gain);
        }
        out.seek_to(0);
        Ok(out)
    }

    /// Render to interleaved samples. Stereo contexts produce
    /// LEFT/RIGHT frame pairs; anything else extracts LEFT alone.
    /// Returns the samples and the channel count.
    pub fn render_interleaved(&self, env: &Env, root: &mut dyn Node) -> Result<(Vec<Pcm>, u16)> {
        let count = self.config.duration.to_samples(env);
        let mut stream = self.render_stream(env, root)?;

        let stereo = env.channels().contains(ChannelName::Left)
            && env.channels().contains(ChannelName::Right);
        if stereo {
            let mut buffer = vec![0.0; 2 * count as usize];
            stream.seek_to(0);
            stream.interleave_2(ChannelName::Left, ChannelName::Right, &mut buffer, count);
            Ok((buffer, 2))
        } else {
            Ok((extract_channel(&mut stream, ChannelName::Left, count), 1))
        }
    }

    /// Render straight to a 16-bit WAV file, reporting statistics
    /// about the mix.
    pub fn render_to_wav(
        &self,
        env: &Env,
        root: &mut dyn Node,
        path: &Path,
    ) -> Result<RenderStats> {
        let (samples, channels) = self.render_interleaved(env, root)?;
        wavfile::write_wav(path, &samples, channels, env.samplerate() as u32)?;
        Ok(RenderStats::from_samples(&samples))
    }
}

/// Copy one channel of a stream into a plain buffer, silence where the
/// channel is undefined.
fn extract_channel(stream: &mut Stream, name: ChannelName, count: Count) -> Vec<Pcm> {
    let Some(src) = stream.find_channel_mut(name) else {
        return vec![0.0; count as usize];
    };
    let mut dest = Channel::new();
    dest.add_new_chunk(0, count);
    dest.seek(0);
    src.seek(0);
    channel::chunk_chunk_funcify(src, &mut dest, count, name, &mut |s, d, _, _| {
        pcm::copy(s, d);
        Ok(s.len() as Count)
    });
    dest.chunks()[0].data().to_vec()
}

/// Statistics over a rendered buffer.
#[derive(Debug, Clone)]
pub struct RenderStats {
    pub sample_count: usize,
    pub rms: Pcm,
    pub peak: Pcm,
    pub dc_offset: Pcm,
    pub zero_crossings: usize,
}

impl RenderStats {
    pub fn from_samples(samples: &[Pcm]) -> RenderStats {
        let sample_count = samples.len();
        if sample_count == 0 {
            return RenderStats {
                sample_count: 0,
                rms: 0.0,
                peak: 0.0,
                dc_offset: 0.0,
                zero_crossings: 0,
            };
        }

        let sum_squares: f64 = samples.iter().map(|&x| (x as f64) * (x as f64)).sum();
        let rms = (sum_squares / sample_count as f64).sqrt() as Pcm;
        let peak = samples.iter().map(|x| x.abs()).fold(0.0, Pcm::max);
        let dc_offset =
            (samples.iter().map(|&x| x as f64).sum::<f64>() / sample_count as f64) as Pcm;

        let mut zero_crossings = 0;
        for w in samples.windows(2) {
            if (w[0] >= 0.0) != (w[1] >= 0.0) {
                zero_crossings += 1;
            }
        }

        RenderStats {
            sample_count,
            rms,
            peak,
            dc_offset,
            zero_crossings,
        }
    }
}

impl std::fmt::Display for RenderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "samples:        {}", self.sample_count)?;
        writeln!(f, "rms:            {:.3}", self.rms)?;
        writeln!(f, "peak:           {:.3}", self.peak)?;
        writeln!(f, "dc offset:      {:.6}", self.dc_offset)?;
        write!(f, "zero crossings: {}", self.zero_crossings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Deck;
    use crate::nodes::squaretone::SquareTone;
    use crate::sound::Sound;
    use crate::time::TimeKind;

    fn tone_deck(env: &Env) -> Deck {
        let mut deck = Deck::new(env);
        let track = deck.add_track(env);
        let layer = track.add_layer(env, TimeKind::Samples);
        let tone = crate::node::node_ref(SquareTone::new(env, 441.0));
        layer.add_sound(
            env,
            Sound::new(env, tone, Time::Samples(0), Time::Samples(44100)),
        );
        deck
    }

    #[test]
    fn renders_one_second_of_tone() {
        let env = Env::new();
        let mut deck = tone_deck(&env);
        let renderer = Renderer::new(RenderConfig::default());
        let (samples, channels) = renderer.render_interleaved(&env, &mut deck).unwrap();
        assert_eq!(channels, 1);
        assert_eq!(samples.len(), 44100);

        let stats = RenderStats::from_samples(&samples);
        assert_eq!(stats.peak, 1.0, "square wave peaks at full scale");
        assert!((stats.rms - 1.0).abs() < 0.01, "square wave rms is ~1");
        // 441 Hz square: ~882 sign changes per second.
        assert!(
            (stats.zero_crossings as i64 - 882).abs() <= 2,
            "got {} crossings",
            stats.zero_crossings
        );
    }

    #[test]
    fn master_gain_scales_the_mix() {
        let env = Env::new();
        let mut deck = tone_deck(&env);
        let renderer = Renderer::new(RenderConfig {
            master_gain: 0.5,
            ..RenderConfig::default()
        });
        let (samples, _) = renderer.render_interleaved(&env, &mut deck).unwrap();
        let stats = RenderStats::from_samples(&samples);
        assert_eq!(stats.peak, 0.5);
    }

    #[test]
    fn empty_score_renders_silence() {
        let env = Env::new();
        let mut deck = Deck::new(&env);
        let renderer = Renderer::new(RenderConfig::default());
        let (samples, _) = renderer.render_interleaved(&env, &mut deck).unwrap();
        assert_eq!(samples.len(), 44100);
        assert!(samples.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_duration_is_invalid() {
        let env = Env::new();
        let mut deck = Deck::new(&env);
        let renderer = Renderer::new(RenderConfig {
            duration: Time::Samples(0),
            ..RenderConfig::default()
        });
        assert_eq!(
            renderer.render_stream(&env, &mut deck).unwrap_err(),
            Error::Invalid
        );
    }
}
