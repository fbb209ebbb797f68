use criterion::{criterion_group, criterion_main, Criterion};

use mixdown::node::{self, Whence};
use mixdown::nodes::squaretone::SquareTone;
use mixdown::{
    node_ref, Deck, Env, Envelope, EnvelopeShape, Sound, Stream, Time, TimeKind,
};

fn build_deck(env: &Env, nr_tracks: usize) -> Deck {
    let mut deck = Deck::new(env);
    for i in 0..nr_tracks {
        let track = deck.add_track(env);
        track.set_gain(1.0 / nr_tracks as f32);
        let layer = track.add_layer(env, TimeKind::Samples);
        let tone = node_ref(SquareTone::new(env, 110.0 * (i + 1) as f64));
        layer.add_sound(
            env,
            Sound::new(env, tone, Time::Samples(0), Time::Samples(1 << 30)),
        );
    }
    deck
}

fn bench_deck_mix(c: &mut Criterion) {
    let env = Env::new();
    let mut group = c.benchmark_group("deck_mix");

    for nr_tracks in [1usize, 2, 8] {
        let mut deck = build_deck(&env, nr_tracks);
        let mut out = Stream::new_contiguous(&env, 4096);
        group.bench_function(format!("{nr_tracks}_tracks_4096"), |b| {
            b.iter(|| {
                node::seek(&env, &mut deck, 0, Whence::Set).unwrap();
                out.seek_to(0);
                node::process(&env, &mut deck, 4096, None, Some(&mut out)).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let env = Env::new();
    let mut envelope = Envelope::new(&env, EnvelopeShape::Linear);
    for i in 0..16i64 {
        envelope
            .add_point(Time::Samples(i * 1000), (i % 2) as f32)
            .unwrap();
    }
    let mut out = Stream::new_contiguous(&env, 4096);

    c.bench_function("linear_envelope_4096", |b| {
        b.iter(|| {
            node::seek(&env, &mut envelope, 0, Whence::Set).unwrap();
            out.seek_to(0);
            node::process(&env, &mut envelope, 4096, None, Some(&mut out)).unwrap()
        })
    });
}

fn bench_stream_mix(c: &mut Criterion) {
    let env = Env::new();
    let mut src = Stream::new_contiguous(&env, 4096);
    let mut dest = Stream::new_contiguous(&env, 4096);

    c.bench_function("stream_mix_4096", |b| {
        b.iter(|| {
            src.seek_to(0);
            dest.seek_to(0);
            dest.mix_from(&env, &mut src, 4096)
        })
    });
}

criterion_group!(benches, bench_deck_mix, bench_envelope, bench_stream_mix);
criterion_main!(benches);
