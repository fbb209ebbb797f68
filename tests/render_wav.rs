//! Offline rendering to WAV and reading the result back as a source.

use mixdown::node;
use mixdown::nodes::squaretone::SquareTone;
use mixdown::nodes::wavfile::WavSource;
use mixdown::{
    node_ref, ChannelName, ChannelSet, Deck, Env, RenderConfig, Renderer, Sound, Stream, Time,
    TimeKind,
};

fn tone_deck(env: &Env, frequency: f64) -> Deck {
    let mut deck = Deck::new(env);
    let track = deck.add_track(env);
    let layer = track.add_layer(env, TimeKind::Samples);
    layer.add_sound(
        env,
        Sound::new(
            env,
            node_ref(SquareTone::new(env, frequency)),
            Time::Samples(0),
            Time::Samples(1 << 20),
        ),
    );
    deck
}

#[test]
fn mono_render_survives_the_file_roundtrip() {
    let env = Env::new();
    let mut deck = tone_deck(&env, 441.0);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mono.wav");

    let renderer = Renderer::new(RenderConfig {
        duration: Time::Samples(4410),
        master_gain: 0.5,
    });
    let stats = renderer.render_to_wav(&env, &mut deck, &path).unwrap();
    assert_eq!(stats.sample_count, 4410);
    assert!((stats.peak - 0.5).abs() < 0.001);

    let mut source = WavSource::open(&env, &path).unwrap();
    assert_eq!(source.frames(), 4410);

    let mut out = Stream::new_contiguous(&env, 4410);
    node::process(&env, &mut source, 4410, None, Some(&mut out)).unwrap();
    let data = out.find_channel(ChannelName::Left).unwrap().chunks()[0].data();

    // 16-bit quantisation allows a small error on the ±0.5 square.
    assert!(data.iter().all(|&v| (v.abs() - 0.5).abs() < 0.001));
}

#[test]
fn stereo_render_writes_two_channels() {
    let mut env = Env::new();
    env.set_channels(ChannelSet::stereo());
    let mut deck = tone_deck(&env, 441.0);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stereo.wav");

    let renderer = Renderer::new(RenderConfig {
        duration: Time::Samples(1000),
        master_gain: 1.0,
    });
    renderer.render_to_wav(&env, &mut deck, &path).unwrap();

    let source = WavSource::open(&env, &path).unwrap();
    assert_eq!(source.frames(), 1000);

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 44100);
}

#[test]
fn rendered_file_can_be_sequenced_again() {
    let env = Env::new();
    let mut deck = tone_deck(&env, 441.0);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clip.wav");
    Renderer::new(RenderConfig {
        duration: Time::Samples(500),
        master_gain: 1.0,
    })
    .render_to_wav(&env, &mut deck, &path)
    .unwrap();

    // Place the rendered clip twice in a fresh score.
    let clip = node_ref(WavSource::open(&env, &path).unwrap());
    let mut score = Deck::new(&env);
    let track = score.add_track(&env);
    let layer = track.add_layer(&env, TimeKind::Samples);
    layer.add_sound(
        &env,
        Sound::new(&env, clip.clone(), Time::Samples(0), Time::Samples(500)),
    );
    layer.add_sound(
        &env,
        Sound::new(&env, clip, Time::Samples(500), Time::Samples(500)),
    );

    let mut out = Stream::new_contiguous(&env, 1000);
    let n = node::process(&env, &mut score, 1000, None, Some(&mut out)).unwrap();
    assert_eq!(n, 1000);

    let data = out.find_channel(ChannelName::Left).unwrap().chunks()[0].data();
    assert_eq!(
        &data[..500],
        &data[500..],
        "both placements play the same clip from its start"
    );
    assert!(data.iter().any(|&v| v != 0.0));
}
