//! Command buffer benchmarks: buffered writes and atomic finalize.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ecb_ecs::Component;
use ecb_storage::{GameState, MemoryStorage, ReaderExt, Writer, WriterExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

impl Component for Position {
    const NAME: &'static str = "position";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

impl Component for Velocity {
    const NAME: &'static str = "velocity";
}

fn state() -> GameState<MemoryStorage> {
    let mut state = GameState::new(MemoryStorage::new());
    state.register_component::<Position>().unwrap();
    state.register_component::<Velocity>().unwrap();
    state.init().unwrap();
    state
}

fn create_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for count in [1u64, 100, 1000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("buffered", count), &count, |b, &count| {
            let mut state = state();
            let ecb = state.ecb().unwrap();
            b.iter(|| {
                black_box(
                    ecb.create_many_entities(count as usize, &[&Position::default()])
                        .unwrap(),
                );
                ecb.discard_pending();
            });
        });

        group.bench_with_input(
            BenchmarkId::new("finalized", count),
            &count,
            |b, &count| {
                let mut state = state();
                let ecb = state.ecb().unwrap();
                b.iter(|| {
                    ecb.create_many_entities(
                        count as usize,
                        &[&Position::default(), &Velocity::default()],
                    )
                    .unwrap();
                    ecb.finalize_tick().unwrap();
                });
            },
        );
    }

    group.finish();
}

fn update_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");

    for count in [100u64, 1000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("set_and_finalize", count), &count, |b, &count| {
            let mut state = state();
            let ecb = state.ecb().unwrap();
            let entities = ecb
                .create_many_entities(count as usize, &[&Position::default()])
                .unwrap();
            ecb.finalize_tick().unwrap();

            b.iter(|| {
                for (i, &e) in entities.iter().enumerate() {
                    let pos = Position {
                        x: i as f32,
                        y: 0.0,
                        z: 0.0,
                    };
                    ecb.set_component(e, pos).unwrap();
                }
                ecb.finalize_tick().unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("read_through", count), &count, |b, &count| {
            let mut state = state();
            let ecb = state.ecb().unwrap();
            let entities = ecb
                .create_many_entities(count as usize, &[&Position::default()])
                .unwrap();
            ecb.finalize_tick().unwrap();

            b.iter(|| {
                for &e in &entities {
                    black_box(ecb.get_component::<Position>(e).unwrap());
                }
                ecb.discard_pending();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, create_benchmarks, update_benchmarks);
criterion_main!(benches);
