//! Render a small demonstration score to a WAV file.
//!
//! Builds a square-tone melody over a blend-enveloped counterpoint and
//! a bed of noise, sequences the whole deck three times inside an
//! outer deck with fade-in/fade-out gain envelopes, and renders the
//! result offline.

use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;

use mixdown::nodes::squaretone::SquareTone;
use mixdown::plugin::{Param, ParamSet};
use mixdown::{
    node_ref, ChannelSet, Deck, Env, Envelope, EnvelopeShape, NodeRef, RenderConfig, Renderer,
    Sound, Time, TimeKind,
};

const BEAT: i32 = 24;
const HALF_BEAT: i32 = 12;
const QUARTER_BEAT: i32 = 6;

#[derive(Parser)]
#[command(about = "Render the demonstration score to a WAV file")]
struct Args {
    /// Output file
    #[arg(short, long, default_value = "score.wav")]
    output: PathBuf,

    /// Tempo in beats per minute
    #[arg(long, default_value_t = 160.0)]
    tempo: f64,

    /// Render in stereo instead of mono
    #[arg(long)]
    stereo: bool,

    /// Master gain applied to the final mix
    #[arg(long, default_value_t = 1.0)]
    gain: f32,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("render failed: {e}");
        std::process::exit(1);
    }
}

fn beat_sound(env: &Env, source: &NodeRef, at: i32, length: i32) -> Sound {
    Sound::new(
        env,
        Rc::clone(source),
        Time::Beat24s(at),
        Time::Beat24s(length),
    )
}

fn blend_envelope(env: &Env, amount: f32) -> NodeRef {
    let mut envelope = Envelope::new(env, EnvelopeShape::Linear);
    envelope.set_time_unit(env, TimeKind::Beat24s);
    envelope
        .add_point(Time::Beat24s(0), amount)
        .expect("point unit matches envelope unit");
    node_ref(envelope)
}

fn run(args: &Args) -> mixdown::Result<()> {
    let mut env = Env::new();
    env.set_tempo(args.tempo);
    if args.stereo {
        env.set_channels(ChannelSet::stereo());
    }

    let square1 = node_ref(SquareTone::new(&env, 220.0));
    let square2 = node_ref(SquareTone::new(&env, 440.0));
    let square3 = node_ref(SquareTone::new(&env, 385.0));
    let square4 = node_ref(SquareTone::new(&env, 231.0));
    let square5 = node_ref(SquareTone::new(&env, 165.0));

    let mut noise_params = ParamSet::new();
    noise_params.insert(mixdown::nodes::noise::SEED_KEY, Param::Int(0));
    let noise = env.create("builtin::noise", &noise_params)?;

    let mut deck = Deck::new(&env);

    // Melody track.
    let mut b = 0;
    {
        let track = deck.add_track(&env);
        let layer = track.add_layer(&env, TimeKind::Beat24s);
        layer.add_sound(&env, beat_sound(&env, &square1, b, BEAT));
        b += BEAT;
        for (source, length, advance) in [
            (&square2, QUARTER_BEAT, HALF_BEAT),
            (&square2, HALF_BEAT, HALF_BEAT),
            (&square1, HALF_BEAT, HALF_BEAT),
            (&square2, QUARTER_BEAT, HALF_BEAT),
            (&square3, HALF_BEAT, HALF_BEAT),
            (&square2, HALF_BEAT, HALF_BEAT),
        ] {
            layer.add_sound(&env, beat_sound(&env, source, b, length));
            b += advance;
        }
    }

    // Counterpoint track, blended against the melody bus.
    let mut b2 = 0;
    {
        let track = deck.add_track(&env);
        track.set_gain(0.6);
        let layer = track.add_layer(&env, TimeKind::Beat24s);
        for (source, length, amount) in [
            (&square4, HALF_BEAT, 0.9),
            (&square5, HALF_BEAT, 0.6),
            (&square4, BEAT, 0.8),
        ] {
            let sound = layer.add_sound(&env, beat_sound(&env, source, b2, length));
            sound.set_blend_envelope(blend_envelope(&env, amount));
            b2 += BEAT;
        }
        b2 += BEAT;
    }

    // A quiet bed of noise under everything.
    {
        let track = deck.add_track(&env);
        track.set_gain(0.1);
        let layer = track.add_layer(&env, TimeKind::Beat24s);
        layer.add_sound(&env, beat_sound(&env, &noise, 0, b));
    }

    let phrase = b.max(b2);

    // Sequence the deck three times in an outer deck: fade in, hold,
    // fade out.
    let deck_source: NodeRef = node_ref(deck);
    let mut outer = Deck::new(&env);
    let track = outer.add_track(&env);
    let layer = track.add_layer(&env, TimeKind::Beat24s);

    for (i, (from, to)) in [(0.0f32, 0.9f32), (0.9, 0.9), (0.9, 0.0)].iter().enumerate() {
        let sound = layer.add_sound(&env, beat_sound(&env, &deck_source, i as i32 * phrase, phrase));
        let mut gain_env = Envelope::new(&env, EnvelopeShape::Linear);
        gain_env.set_time_unit(&env, TimeKind::Beat24s);
        gain_env.add_point(Time::Beat24s(0), *from)?;
        gain_env.add_point(Time::Beat24s(phrase), *to)?;
        sound.set_gain_envelope(node_ref(gain_env));
    }

    let renderer = Renderer::new(RenderConfig {
        duration: Time::Beat24s(3 * phrase),
        master_gain: args.gain,
    });
    let mut root = outer;
    let stats = renderer.render_to_wav(&env, &mut root, &args.output)?;

    println!("wrote {}", args.output.display());
    println!("{stats}");
    Ok(())
}
