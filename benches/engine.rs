//! Benchmarks for the FM engine hot path
//!
//! Run with: cargo bench --bench engine

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use ymfm::{Engine, EngineConfig, Family};

/// Key on every channel of a YM2612 with a bright 4-op patch
fn opn2_full_chord() -> Engine {
    let mut engine = Engine::new(EngineConfig::new(Family::Opn2)).unwrap();
    engine.write(0x22, 0x0b); // LFO on
    for bank in [0x000, 0x100] {
        for channel in 0..3u16 {
            engine.write(bank + 0xb0 + channel, 0x3c); // feedback 7, algorithm 4
            engine.write(bank + 0xb4 + channel, 0xc7);
            for slot in [0x00u16, 0x04, 0x08, 0x0c] {
                let op = bank + slot + channel;
                engine.write(0x30 + op, 0x71);
                engine.write(0x40 + op, 0x10);
                engine.write(0x50 + op, 0x1f);
                engine.write(0x60 + op, 0x85);
                engine.write(0x80 + op, 0x2f);
            }
            engine.write(bank + 0xa4 + channel, 0x22 + channel as u8);
            engine.write(bank + 0xa0 + channel, 0x6a);
        }
    }
    for channel in [0u8, 1, 2, 4, 5, 6] {
        engine.write(0x28, 0xf0 | channel);
    }
    engine
}

fn bench_clock_iterations(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock");

    for family in [Family::Opm, Family::Opn2, Family::Opl3, Family::Opll] {
        let mut engine = Engine::new(EngineConfig::new(family)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(family), &family, |b, _| {
            b.iter(|| {
                for _ in 0..1000 {
                    black_box(engine.clock());
                }
            });
        });
    }

    group.finish();
}

fn bench_generate_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");

    let mut engine = opn2_full_chord();
    for frame_count in [883, 4410, 53_267].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(frame_count),
            frame_count,
            |b, &frame_count| {
                b.iter(|| {
                    black_box(engine.generate(frame_count));
                });
            },
        );
    }

    group.finish();
}

fn bench_register_writes(c: &mut Criterion) {
    let mut engine = opn2_full_chord();

    c.bench_function("write_and_clock", |b| {
        b.iter(|| {
            engine.write(black_box(0xa4), black_box(0x22));
            engine.write(black_box(0xa0), black_box(0x6a));
            black_box(engine.clock());
        });
    });
}

criterion_group!(
    benches,
    bench_clock_iterations,
    bench_generate_frames,
    bench_register_writes
);
criterion_main!(benches);
