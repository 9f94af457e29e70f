//! The relay: command intake, event bus and fanout wired together.
//!
//! A [`Relay`] owns the client registry and the dispatcher task for its
//! whole lifetime. It is created with [`Relay::start`] and torn down with
//! [`Relay::shutdown`]; nothing about it is process-global.

use crate::bus::{event_bus, EventPublisher};
use crate::dispatcher::{FanoutDispatcher, FanoutStats};
use crate::error::RelayError;
use crate::processor;
use crate::registry::{ClientId, ClientRegistry, Outbox};
use crate::store::EntityStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tally_protocol::{codec, Command, Event};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Events buffered per client before it is considered lagging.
    pub outbox_capacity: usize,
    /// Largest inbound payload accepted by [`Relay::submit`], in bytes.
    pub max_payload_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 1024,
            max_payload_size: codec::MAX_PAYLOAD_SIZE,
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Currently registered clients.
    pub clients: usize,
    /// Events put on the bus.
    pub events_published: u64,
    /// Events the dispatcher has broadcast.
    pub events_dispatched: u64,
    /// Successful per-client enqueues.
    pub deliveries: u64,
    /// Per-client failures (each unregistered a client).
    pub failed_deliveries: u64,
    /// Commands dropped without an event.
    pub commands_rejected: u64,
}

/// The relay.
pub struct Relay {
    store: Arc<dyn EntityStore>,
    registry: Arc<ClientRegistry>,
    publisher: EventPublisher,
    fanout_stats: Arc<FanoutStats>,
    events_published: AtomicU64,
    commands_rejected: AtomicU64,
    config: RelayConfig,
    shutdown: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Relay {
    /// Check the store and start the dispatcher task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StoreUnavailable`] if the store cannot be
    /// reached.
    pub async fn start(
        store: Arc<dyn EntityStore>,
        config: RelayConfig,
    ) -> Result<Self, RelayError> {
        store.ping().await?;

        let registry = Arc::new(ClientRegistry::new());
        let fanout_stats = Arc::new(FanoutStats::default());
        let (publisher, events) = event_bus();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let dispatcher = FanoutDispatcher::new(Arc::clone(&registry), Arc::clone(&fanout_stats));
        let handle = tokio::spawn(dispatcher.run(events, shutdown_rx));

        info!("Relay started with config: {:?}", config);

        Ok(Self {
            store,
            registry,
            publisher,
            fanout_stats,
            events_published: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            config,
            shutdown,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Decode an inbound payload and execute it.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed, names an unknown
    /// command, or the command cannot be applied. No event is published in
    /// that case.
    pub async fn submit(&self, payload: &str) -> Result<Arc<Event>, RelayError> {
        let limit = self.config.max_payload_size;
        let command = match codec::decode_command_with_limit(payload, limit) {
            Ok(command) => command,
            Err(e) => {
                self.commands_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };
        self.execute(command).await
    }

    /// Apply a command and publish the resulting event.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be applied or the bus is
    /// closed. A closed bus is detected before the store is touched.
    pub async fn execute(&self, command: Command) -> Result<Arc<Event>, RelayError> {
        if self.publisher.is_closed() {
            self.commands_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(RelayError::BusClosed);
        }

        let event = match processor::process(command, self.store.as_ref()).await {
            Ok(event) => Arc::new(event),
            Err(e) => {
                self.commands_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        self.publisher.publish(Arc::clone(&event))?;
        self.events_published.fetch_add(1, Ordering::Relaxed);
        Ok(event)
    }

    /// Register a client to receive every event published from now on.
    pub fn connect(&self) -> (ClientId, Outbox) {
        self.registry.register(self.config.outbox_capacity)
    }

    /// Unregister a client. Safe to call more than once.
    pub fn disconnect(&self, id: ClientId) -> bool {
        self.registry.unregister(id)
    }

    /// Check if a client is still registered.
    #[must_use]
    pub fn is_connected(&self, id: ClientId) -> bool {
        self.registry.contains(id)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Get the entity store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Get relay statistics.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            clients: self.registry.len(),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dispatched: self.fanout_stats.events_dispatched(),
            deliveries: self.fanout_stats.deliveries(),
            failed_deliveries: self.fanout_stats.failed_deliveries(),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop the dispatcher and release every client.
    ///
    /// Events still on the bus are discarded. Clearing the registry closes
    /// every outbox, which ends the clients' connection tasks.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let handle = self.dispatcher.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!(error = %e, "Dispatcher task ended abnormally");
            }
        }

        self.registry.clear();
        info!("Relay stopped");
    }
}
