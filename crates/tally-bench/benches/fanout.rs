//! Fanout benchmarks for Tally.
//!
//! These benchmarks measure registry and broadcast cost as the number of
//! connected clients grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::{ClientRegistry, EntityStore, FanoutDispatcher, FanoutStats, MemoryStore, Outbox, Payload};
use tally_protocol::Event;

fn registry_with(clients: usize, capacity: usize) -> (Arc<ClientRegistry>, Vec<Outbox>) {
    let registry = Arc::new(ClientRegistry::new());
    let outboxes = (0..clients)
        .map(|_| registry.register(capacity).1)
        .collect();
    (registry, outboxes)
}

fn drain(outboxes: &mut [Outbox]) {
    for outbox in outboxes {
        while outbox.try_recv().is_ok() {}
    }
}

/// Benchmark registry operations.
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("register_unregister", |b| {
        let registry = ClientRegistry::new();
        b.iter(|| {
            let (id, _outbox) = registry.register(16);
            registry.unregister(black_box(id))
        });
    });

    for size in [100, 10_000] {
        group.bench_with_input(BenchmarkId::new("snapshot", size), &size, |b, &size| {
            let (registry, _outboxes) = registry_with(size, 1);
            b.iter(|| black_box(registry.snapshot()));
        });
    }

    group.finish();
}

/// Benchmark broadcasting one payload to every client.
fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");
    let payload: Payload = Arc::from(r#"{"RESP":"RESP_UPVOTECARD","IDENTIFIER":"c","COUNTER":1}"#);

    for size in [10, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (registry, mut outboxes) = registry_with(size, 64);
            let dispatcher = FanoutDispatcher::new(registry, Arc::new(FanoutStats::default()));

            // Outboxes are drained outside the timed section so no client
            // ever lags.
            b.iter_custom(|iters| {
                let mut elapsed = Duration::ZERO;
                for _ in 0..iters {
                    let start = Instant::now();
                    black_box(dispatcher.broadcast(Arc::clone(&payload)));
                    elapsed += start.elapsed();
                    drain(&mut outboxes);
                }
                elapsed
            });
        });
    }

    group.finish();
}

/// Benchmark encode plus broadcast of a typed event.
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    let upvote = Event::UpvoteCard {
        identifier: "3f2a9c1e-0b7d-4e55-8a61-2c9f0d4b7e13".into(),
        list_identifier: Some("9b1d2e4f-6a7c-4d3e-b2f1-8c0a5e7d9f21".into()),
        counter: 42,
    };

    group.bench_function("upvote_100_clients", |b| {
        let (registry, mut outboxes) = registry_with(100, 64);
        let dispatcher = FanoutDispatcher::new(registry, Arc::new(FanoutStats::default()));

        b.iter_custom(|iters| {
            let mut elapsed = Duration::ZERO;
            for _ in 0..iters {
                let start = Instant::now();
                black_box(dispatcher.dispatch(black_box(&upvote)));
                elapsed += start.elapsed();
                drain(&mut outboxes);
            }
            elapsed
        });
    });

    group.finish();
}

/// Benchmark store mutations.
fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("increment_counter", |b| {
        let store = MemoryStore::new();
        let card = runtime.block_on(store.create_card("bench")).unwrap();
        b.to_async(&runtime)
            .iter(|| store.increment_counter(black_box(&card.identifier)));
    });

    group.bench_function("create_card_list", |b| {
        let store = MemoryStore::new();
        b.to_async(&runtime)
            .iter(|| store.create_card_list(black_box("Untitled")));
    });

    group.finish();
}

criterion_group!(benches, bench_registry, bench_broadcast, bench_dispatch, bench_store);
criterion_main!(benches);
