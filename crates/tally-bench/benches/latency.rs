//! Latency benchmarks for Tally.
//!
//! These benchmarks measure the time from submitting a raw payload to the
//! event landing in client outboxes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Instant;
use tally_core::{EntityStore, MemoryStore, Relay, RelayConfig};
use tally_protocol::codec;

fn start_relay(runtime: &tokio::runtime::Runtime) -> Relay {
    runtime
        .block_on(Relay::start(
            Arc::new(MemoryStore::new()),
            RelayConfig::default(),
        ))
        .unwrap()
}

/// Benchmark decoding of each inbound command shape.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let payloads = [
        ("refresh", r#"{"REQ":"REFRESH"}"#),
        ("newcard", r#"{"REQ":"NEWCARD","LISTIDENTIFIER":"9b1d2e4f"}"#),
        (
            "renamecard",
            r#"{"REQ":"RENAMECARD","IDENTIFIER":"3f2a9c1e","LISTIDENTIFIER":"9b1d2e4f","TEXT":"Ship it"}"#,
        ),
    ];

    for (name, payload) in payloads {
        group.bench_function(name, |b| {
            b.iter(|| codec::decode_command(black_box(payload)))
        });
    }

    group.finish();
}

/// Benchmark submit + fanout + receive.
fn bench_submit_to_outbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_to_outbox");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for clients in [1usize, 10] {
        group.bench_function(format!("upvote_{clients}_clients"), |b| {
            let relay = start_relay(&runtime);
            let card = runtime
                .block_on(relay.store().create_card("bench"))
                .unwrap();
            let payload = format!(r#"{{"REQ":"UPVOTECARD","IDENTIFIER":"{}"}}"#, card.identifier);
            let mut outboxes: Vec<_> = (0..clients).map(|_| relay.connect().1).collect();

            b.iter_custom(|iters| {
                runtime.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        relay.submit(&payload).await.unwrap();
                        for outbox in &mut outboxes {
                            black_box(outbox.recv().await);
                        }
                    }
                    start.elapsed()
                })
            });

            runtime.block_on(relay.shutdown());
        });
    }

    group.finish();
}

/// Benchmark building a full board snapshot.
fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("20_lists_x_10_cards", |b| {
        let relay = start_relay(&runtime);
        runtime.block_on(async {
            let store = relay.store();
            for _ in 0..20 {
                let list = store.create_card_list("Untitled").await.unwrap();
                for _ in 0..10 {
                    let card = store.create_card("Untitled").await.unwrap();
                    store
                        .append_card(&list.identifier, &card.identifier)
                        .await
                        .unwrap();
                }
            }
        });

        b.to_async(&runtime)
            .iter(|| relay.submit(black_box(r#"{"REQ":"REFRESH"}"#)));

        runtime.block_on(relay.shutdown());
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_submit_to_outbox, bench_refresh);
criterion_main!(benches);
