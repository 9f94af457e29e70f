//! Fanout dispatcher.
//!
//! Drains the event bus one event at a time and hands each event to every
//! registered client. A client that cannot take the event is unregistered
//! on the spot; no other client, and no later event, waits on it.

use crate::bus::EventStream;
use crate::registry::{ClientRegistry, Payload};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tally_protocol::{codec, Event};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Outcome of broadcasting one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Clients the event was enqueued for.
    pub delivered: usize,
    /// Clients that failed and were unregistered.
    pub dropped: usize,
}

/// Fanout counters, updated without locks.
#[derive(Debug, Default)]
pub struct FanoutStats {
    events_dispatched: AtomicU64,
    deliveries: AtomicU64,
    failed_deliveries: AtomicU64,
}

impl FanoutStats {
    /// Events taken off the bus and broadcast.
    #[must_use]
    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    /// Successful per-client enqueues.
    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Per-client failures, each of which unregistered a client.
    #[must_use]
    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }
}

/// Delivers events from the bus to every registered client.
pub struct FanoutDispatcher {
    registry: Arc<ClientRegistry>,
    stats: Arc<FanoutStats>,
}

impl FanoutDispatcher {
    /// Create a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: Arc<ClientRegistry>, stats: Arc<FanoutStats>) -> Self {
        Self { registry, stats }
    }

    /// Deliver an encoded payload to a snapshot of the registry.
    ///
    /// Each client gets at most one attempt. Failed clients are
    /// unregistered before this returns.
    pub fn broadcast(&self, payload: Payload) -> FanoutReport {
        let mut report = FanoutReport::default();

        for client in self.registry.snapshot() {
            match client.deliver(Arc::clone(&payload)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(client = %client.id(), error = %e, "Delivery failed, unregistering");
                    self.registry.unregister(client.id());
                    report.dropped += 1;
                }
            }
        }

        self.stats.events_dispatched.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .failed_deliveries
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        report
    }

    /// Encode an event once and broadcast it.
    ///
    /// Returns `None` if the event cannot be encoded; nothing is sent.
    pub fn dispatch(&self, event: &Event) -> Option<FanoutReport> {
        let payload: Payload = match codec::encode_event(event) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                error!(kind = %event.kind(), error = %e, "Failed to encode event");
                return None;
            }
        };

        let report = self.broadcast(payload);
        trace!(
            kind = %event.kind(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Dispatched event"
        );
        Some(report)
    }

    /// Run until the bus closes or `shutdown` flips to `true`.
    pub async fn run(self, mut events: EventStream, mut shutdown: watch::Receiver<bool>) {
        info!("Fanout dispatcher started");

        loop {
            tokio::select! {
                biased;

                // Also resolves if the shutdown sender is dropped.
                _ = shutdown.wait_for(|stop| *stop) => {
                    debug!("Fanout dispatcher received shutdown");
                    break;
                }

                next = events.next() => match next {
                    Some(event) => {
                        self.dispatch(&event);
                    }
                    None => {
                        debug!("Event bus closed");
                        break;
                    }
                },
            }
        }

        info!("Fanout dispatcher stopped");
    }
}
