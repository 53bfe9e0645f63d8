//! Performance benchmarks for the events engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use headway::{Clock, Connection, EngineConfig, EventsEngine, ManualClock, Timestamp};
use std::sync::Arc;
use tempfile::TempDir;

fn create_engine(dir: &TempDir) -> EventsEngine {
    EventsEngine::open_or_create(EngineConfig {
        path: dir.path().join("events"),
        ..Default::default()
    })
    .unwrap()
}

fn connection(id: u64, departure_delay: i64) -> Connection {
    Connection {
        id: format!("http://example.org/connections/{id}"),
        connection_type: "Connection".to_string(),
        departure_delay,
        arrival_delay: 0,
        departure_time: None,
        extra: serde_json::Map::new(),
    }
}

/// Benchmark ingestion against a warm snapshot (mostly no-op diffs).
fn bench_record_update(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let engine = create_engine(&dir);

    for i in 0..1000 {
        engine.record_update("bench", connection(i, 0)).unwrap();
    }
    engine.flush("bench", Timestamp(1_000_000)).unwrap();

    let mut i = 0u64;
    c.bench_function("record_update_warm", |b| {
        b.iter(|| {
            i = (i + 1) % 1000;
            black_box(engine.record_update("bench", connection(i, 0)).unwrap());
        });
    });
}

/// Benchmark a full publication cycle with varying batch sizes.
fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");

    for batch in [10u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("events", batch), &batch, |b, &batch| {
            let dir = TempDir::new().unwrap();
            let engine = create_engine(&dir);
            let mut timestamp = 0i64;

            b.iter(|| {
                for i in 0..batch {
                    engine
                        .record_update("bench", connection(i, timestamp))
                        .unwrap();
                }
                timestamp += 1000;
                black_box(engine.flush("bench", Timestamp(timestamp)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark cursor lookups over page logs of varying depth.
fn bench_poll_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_lookup");

    for pages in [10i64, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("pages", pages), &pages, |b, &pages| {
            let base = 1_000_000_000_000i64;
            let dir = TempDir::new().unwrap();
            let clock = Arc::new(ManualClock::new(Timestamp(base)));
            let engine = EventsEngine::open_or_create_with_clock(
                EngineConfig {
                    path: dir.path().join("events"),
                    ..Default::default()
                },
                Arc::clone(&clock) as Arc<dyn Clock>,
            )
            .unwrap();

            for p in 0..pages {
                engine.record_update("bench", connection(0, p)).unwrap();
                engine
                    .flush("bench", Timestamp(base + (p + 1) * 1000))
                    .unwrap();
            }
            clock.set(Timestamp(base + pages * 1000));

            let mut offset = 0i64;
            b.iter(|| {
                offset = (offset + 997) % (pages * 1000);
                black_box(engine.poll("bench", Timestamp(base + offset)).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_update, bench_flush, bench_poll_lookup);
criterion_main!(benches);
