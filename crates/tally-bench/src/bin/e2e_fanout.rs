//! End-to-end fanout benchmark for Tally.
//!
//! Opens N receive sockets and one submit socket against a running server,
//! fires upvotes at a single card and counts events arriving across all
//! receivers.

use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_protocol::{codec, Command};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SUBMIT_URL: &str = "ws://127.0.0.1:8080/submit";
const RECEIVE_URL: &str = "ws://127.0.0.1:8080/receive";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║            Tally End-to-End Fanout Benchmark                 ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    if let Err(e) = run_fanout_benchmark(num_clients).await {
        eprintln!("Benchmark failed: {}", e);
    }
}

async fn run_fanout_benchmark(num_clients: usize) -> Result<(), BoxError> {
    println!("📊 Fanout Benchmark: {} receivers", num_clients);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let received = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let received = Arc::clone(&received);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_receiver(received, barrier).await {
                eprintln!("Receiver {} error: {}", client_id, e);
            }
        }));
    }

    barrier.wait().await;
    println!("✓ All {} receivers connected", num_clients);

    let card_id = create_card().await?;
    println!("✓ Created card {}", card_id);

    let sent = Arc::new(AtomicU64::new(0));
    let submitter = {
        let sent = Arc::clone(&sent);
        tokio::spawn(async move {
            if let Err(e) = run_submitter(&card_id, sent).await {
                eprintln!("Submitter error: {}", e);
            }
        })
    };

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    sent.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_received = received.load(Ordering::SeqCst);
    let total_sent = sent.load(Ordering::SeqCst);

    let commands_per_sec = total_sent as f64 / elapsed.as_secs_f64();
    let events_per_sec = total_received as f64 / elapsed.as_secs_f64();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Receivers:            {:>10}                           ║",
        num_clients
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Commands Sent:        {:>10}                           ║",
        total_sent
    );
    println!(
        "║  Events Received:      {:>10}                           ║",
        total_received
    );
    println!(
        "║  Submit Rate:          {:>10.0} cmd/s                    ║",
        commands_per_sec
    );
    println!(
        "║  Fanout Rate:          {:>10.0} evt/s                    ║",
        events_per_sec
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    submitter.abort();
    for handle in handles {
        handle.abort();
    }

    Ok(())
}

/// Create a list and a card on it, returning the card identifier as seen
/// on the event stream.
async fn create_card() -> Result<String, BoxError> {
    let (receiver, _) = connect_async(RECEIVE_URL).await?;
    let (_receiver_tx, mut events) = receiver.split();
    let (mut submit, _) = connect_async(SUBMIT_URL).await?;

    // The server registers a receiver just after the handshake completes.
    tokio::time::sleep(Duration::from_millis(100)).await;

    submit
        .send(Message::Text(codec::encode_command(&Command::NewList)?))
        .await?;
    let list_id = next_event(&mut events, "RESP_NEWLIST").await?;

    let new_card = codec::encode_command(&Command::new_card(list_id))?;
    submit.send(Message::Text(new_card)).await?;
    next_event(&mut events, "RESP_NEWCARD").await
}

async fn next_event<S>(events: &mut S, resp: &str) -> Result<String, BoxError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = events.next().await {
        if let Message::Text(text) = message? {
            let event: serde_json::Value = serde_json::from_str(&text)?;
            if event["RESP"] == resp {
                if let Some(id) = event["IDENTIFIER"].as_str() {
                    return Ok(id.to_string());
                }
            }
        }
    }
    Err(format!("connection closed before {}", resp).into())
}

async fn run_receiver(received: Arc<AtomicU64>, barrier: Arc<Barrier>) -> Result<(), BoxError> {
    let (ws, _) = connect_async(RECEIVE_URL).await?;
    let (_sender, mut receiver) = ws.split();

    barrier.wait().await;

    while let Some(result) = receiver.next().await {
        if let Ok(Message::Text(_)) = result {
            received.fetch_add(1, Ordering::Relaxed);
        }
    }

    Ok(())
}

async fn run_submitter(card_id: &str, sent: Arc<AtomicU64>) -> Result<(), BoxError> {
    let (mut submit, _) = connect_async(SUBMIT_URL).await?;
    let upvote = codec::encode_command(&Command::upvote_card(card_id, None))?;

    loop {
        submit.send(Message::Text(upvote.clone())).await?;
        sent.fetch_add(1, Ordering::Relaxed);
        // Small yield to not starve the receivers
        tokio::task::yield_now().await;
    }
}
