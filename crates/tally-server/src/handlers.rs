//! Connection handlers for the Tally server.
//!
//! Clients open two sockets: one on the submit path to send commands and
//! one on the receive path to get the event stream. This module handles
//! the lifecycle of both.

use crate::config::Config;
use crate::metrics;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::{EntityStore, MemoryStore, Relay, RelayError};
use tally_transport::{Connection, MessageSink, MessageStream, WsConnection};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// The relay.
    pub relay: Relay,
    /// Server configuration.
    pub config: Config,
    /// One permit per receive connection, taken before the upgrade.
    pub receive_slots: Arc<Semaphore>,
}

impl AppState {
    /// Start a relay over a fresh in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let relay = Relay::start(store, config.relay_config())
            .await
            .context("Failed to start relay")?;

        let receive_slots = Arc::new(Semaphore::new(
            config.limits.max_connections.min(Semaphore::MAX_PERMITS),
        ));

        Ok(Self {
            relay,
            config,
            receive_slots,
        })
    }
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()).await?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Tally server listening on {}", addr);
    info!(
        "Submit endpoint: ws://{}{}",
        addr, config.transport.submit_path
    );
    info!(
        "Receive endpoint: ws://{}{}",
        addr, config.transport.receive_path
    );

    let shutdown_state = Arc::clone(&state);
    serve(listener, state, async move {
        shutdown_signal().await;
        // Stopping the relay closes every outbound socket, which lets the
        // graceful shutdown complete.
        shutdown_state.relay.shutdown().await;
    })
    .await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Build the router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.submit_path, get(submit_handler))
        .route(&state.config.transport.receive_path, get(receive_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.relay.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": stats.clients,
        "events_published": stats.events_published,
        "deliveries_failed": stats.failed_deliveries,
    }))
}

/// WebSocket upgrade handler for the submit endpoint.
async fn submit_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| async move {
            serve_inbound(WsConnection::new(socket), &state.relay).await;
        })
}

/// WebSocket upgrade handler for the receive endpoint.
async fn receive_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Ok(permit) = Arc::clone(&state.receive_slots).try_acquire_owned() else {
        warn!(
            limit = state.config.limits.max_connections,
            "Refusing receive connection"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let write_timeout = state.config.write_timeout();
    ws.on_upgrade(move |socket| async move {
        serve_outbound(WsConnection::new(socket), &state.relay, write_timeout).await;
        drop(permit);
    })
}

/// Read commands from a connection until it closes.
///
/// Payloads that cannot be applied are dropped; the connection stays open.
pub async fn serve_inbound<C: Connection>(conn: C, relay: &Relay) {
    metrics::record_connection("submit");

    let connection_id = *conn.id();
    let (mut sink, mut stream) = conn.split();

    debug!(connection = %connection_id, "Submit connection opened");

    loop {
        match stream.recv().await {
            Ok(Some(payload)) => {
                let start = Instant::now();
                match relay.submit(&payload).await {
                    Ok(event) => {
                        metrics::record_command(event.kind().tag(), start.elapsed().as_secs_f64());
                        debug!(connection = %connection_id, kind = %event.kind(), "Command applied");
                    }
                    Err(RelayError::BusClosed) => {
                        debug!(connection = %connection_id, "Relay stopped");
                        break;
                    }
                    Err(e) => {
                        metrics::record_dropped(e.kind());
                        warn!(connection = %connection_id, error = %e, "Dropped command");
                    }
                }
            }
            Ok(None) => {
                debug!(connection = %connection_id, "Submit connection closed");
                break;
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Submit connection error");
                metrics::record_error("receive");
                break;
            }
        }
    }

    let _ = sink.close().await;
}

/// Register a connection and stream events to it until it goes away.
///
/// Ends when the peer closes, a write fails or times out, or the relay
/// drops the client. The client is always unregistered on exit.
pub async fn serve_outbound<C: Connection>(conn: C, relay: &Relay, write_timeout: Duration) {
    metrics::record_connection("receive");

    let connection_id = *conn.id();
    let (mut sink, mut stream) = conn.split();
    let (client_id, mut outbox) = relay.connect();
    metrics::set_registered_clients(relay.client_count());

    debug!(connection = %connection_id, client = %client_id, "Receive connection registered");

    loop {
        tokio::select! {
            biased;

            next = outbox.recv() => match next {
                Some(payload) => {
                    match tokio::time::timeout(write_timeout, sink.send(payload.to_string())).await {
                        Ok(Ok(())) => metrics::record_event_written(),
                        Ok(Err(e)) => {
                            warn!(connection = %connection_id, error = %e, "Write failed");
                            metrics::record_error("write");
                            break;
                        }
                        Err(_) => {
                            warn!(connection = %connection_id, "Write timed out");
                            metrics::record_error("timeout");
                            break;
                        }
                    }
                }
                None => {
                    debug!(connection = %connection_id, "Outbox closed by relay");
                    break;
                }
            },

            incoming = stream.recv() => match incoming {
                Ok(Some(_)) => {
                    trace!(connection = %connection_id, "Ignoring payload on receive connection");
                }
                Ok(None) => {
                    debug!(connection = %connection_id, "Receive connection closed");
                    break;
                }
                Err(e) => {
                    warn!(connection = %connection_id, error = %e, "Receive connection error");
                    metrics::record_error("receive");
                    break;
                }
            },
        }
    }

    relay.disconnect(client_id);
    metrics::set_registered_clients(relay.client_count());
    let _ = sink.close().await;

    debug!(connection = %connection_id, client = %client_id, "Receive connection finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::Value;
    use tally_protocol::Event;
    use async_trait::async_trait;
    use tally_core::RelayConfig;
    use tally_transport::{memory, ConnectionId, TransportError};
    use tokio::time::timeout;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    async fn relay() -> Arc<Relay> {
        Arc::new(
            Relay::start(Arc::new(MemoryStore::new()), RelayConfig::default())
                .await
                .unwrap(),
        )
    }

    async fn wait_for_clients(relay: &Relay, count: usize) {
        timeout(Duration::from_secs(2), async {
            while relay.client_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client count never reached");
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never reached");
    }

    /// A connection whose writes never complete and whose peer never speaks.
    struct StalledConnection {
        id: ConnectionId,
    }

    struct StalledSink;

    struct SilentStream;

    #[async_trait]
    impl MessageSink for StalledSink {
        async fn send(&mut self, _payload: String) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[async_trait]
    impl MessageStream for SilentStream {
        async fn recv(&mut self) -> Result<Option<String>, TransportError> {
            std::future::pending().await
        }
    }

    impl Connection for StalledConnection {
        type Sink = StalledSink;
        type Stream = SilentStream;

        fn id(&self) -> &ConnectionId {
            &self.id
        }

        fn split(self) -> (StalledSink, SilentStream) {
            (StalledSink, SilentStream)
        }
    }

    fn spawn_outbound(
        relay: &Arc<Relay>,
        write_timeout: Duration,
    ) -> (memory::MemoryPeer, tokio::task::JoinHandle<()>) {
        let (conn, peer) = memory::pair();
        let relay = Arc::clone(relay);
        let handle = tokio::spawn(async move {
            serve_outbound(conn, &relay, write_timeout).await;
        });
        (peer, handle)
    }

    #[tokio::test]
    async fn test_inbound_drops_bad_payloads_and_keeps_going() {
        let relay = relay().await;
        let (_id, mut outbox) = relay.connect();

        let (conn, mut peer) = memory::pair();
        let inbound_relay = Arc::clone(&relay);
        let handle = tokio::spawn(async move {
            serve_inbound(conn, &inbound_relay).await;
        });

        assert!(peer.send("{broken"));
        assert!(peer.send(r#"{"REQ":"SHUFFLE"}"#));
        assert!(peer.send(r#"{"REQ":"NEWLIST"}"#));

        let payload = timeout(Duration::from_secs(2), outbox.recv())
            .await
            .unwrap()
            .unwrap();
        let event: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(event["RESP"], "RESP_NEWLIST");
        assert_eq!(relay.stats().commands_rejected, 2);

        peer.hang_up();
        timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_outbound_streams_events_until_peer_hangs_up() {
        let relay = relay().await;
        let (mut peer, handle) = spawn_outbound(&relay, Duration::from_secs(1));
        wait_for_clients(&relay, 1).await;

        relay.submit(r#"{"REQ":"NEWLIST"}"#).await.unwrap();
        relay.submit(r#"{"REQ":"REFRESH"}"#).await.unwrap();

        let first: Value = serde_json::from_str(&peer.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&peer.recv().await.unwrap()).unwrap();
        assert_eq!(first["RESP"], "RESP_NEWLIST");
        assert_eq!(second["RESP"], "RESP_REFRESH");

        peer.hang_up();
        timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relay.client_count(), 0);

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_outbound_write_failure_unregisters() {
        let relay = relay().await;
        let (mut broken, broken_handle) = spawn_outbound(&relay, Duration::from_secs(1));
        let (mut healthy, _healthy_handle) = spawn_outbound(&relay, Duration::from_secs(1));
        wait_for_clients(&relay, 2).await;

        broken.stop_reading();
        relay.submit(r#"{"REQ":"NEWLIST"}"#).await.unwrap();

        timeout(Duration::from_secs(2), broken_handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relay.client_count(), 1);

        let event: Value = serde_json::from_str(&healthy.recv().await.unwrap()).unwrap();
        assert_eq!(event["RESP"], "RESP_NEWLIST");

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_outbound_write_timeout_unregisters() {
        let relay = relay().await;
        let stalled_relay = Arc::clone(&relay);
        let stalled = tokio::spawn(async move {
            let conn = StalledConnection {
                id: ConnectionId::generate(),
            };
            serve_outbound(conn, &stalled_relay, Duration::from_millis(50)).await;
        });
        let (mut healthy, _healthy_handle) = spawn_outbound(&relay, Duration::from_secs(1));
        wait_for_clients(&relay, 2).await;

        relay.submit(r#"{"REQ":"NEWLIST"}"#).await.unwrap();

        timeout(Duration::from_secs(2), stalled)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(relay.client_count(), 1);

        let event: Value = serde_json::from_str(&healthy.recv().await.unwrap()).unwrap();
        assert_eq!(event["RESP"], "RESP_NEWLIST");

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_shutdown_closes_outbound() {
        let relay = relay().await;
        let (mut peer, handle) = spawn_outbound(&relay, Duration::from_secs(1));
        wait_for_clients(&relay, 1).await;

        relay.shutdown().await;
        assert!(peer.recv().await.is_none());
        timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    async fn start_server(config: Config) -> (String, Arc<AppState>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::new(config).await.unwrap());

        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            serve(listener, server_state, std::future::pending())
                .await
                .unwrap();
        });

        (format!("ws://{addr}"), state)
    }

    #[tokio::test]
    async fn test_websocket_roundtrip() {
        let (base, state) = start_server(Config::default()).await;

        let (receiver, _) = connect_async(format!("{base}/receive")).await.unwrap();
        let (_receiver_tx, mut receiver_rx) = receiver.split();
        wait_for_clients(&state.relay, 1).await;

        let (mut submitter, _) = connect_async(format!("{base}/submit")).await.unwrap();
        submitter
            .send(Message::Text(r#"{"REQ":"NEWLIST"}"#.to_string()))
            .await
            .unwrap();

        let message = timeout(Duration::from_secs(2), receiver_rx.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = match message {
            Message::Text(text) => text,
            other => panic!("Expected text message, got {:?}", other),
        };
        let event: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["RESP"], "RESP_NEWLIST");
        assert_eq!(event["TEXT"], "Untitled");

        state.relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_receive_refused_over_limit() {
        let mut config = Config::default();
        config.limits.max_connections = 0;
        let (base, state) = start_server(config).await;

        assert!(connect_async(format!("{base}/receive")).await.is_err());
        assert_eq!(state.relay.client_count(), 0);

        state.relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_receives_respect_limit() {
        let mut config = Config::default();
        config.limits.max_connections = 2;
        let (base, state) = start_server(config).await;
        let url = format!("{base}/receive");

        let attempts =
            futures_util::future::join_all((0..5).map(|_| connect_async(url.as_str()))).await;
        let mut accepted: Vec<_> = attempts.into_iter().filter_map(Result::ok).collect();
        assert_eq!(accepted.len(), 2);
        wait_for_clients(&state.relay, 2).await;

        // Closing one connection frees its slot.
        let (mut first, _) = accepted.remove(0);
        first.close(None).await.unwrap();
        wait_until(|| state.receive_slots.available_permits() == 1).await;

        assert!(connect_async(url.as_str()).await.is_ok());
        wait_for_clients(&state.relay, 2).await;

        state.relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_raised_message_limit_reaches_relay() {
        let mut config = Config::default();
        config.limits.max_message_size = 256 * 1024;
        let state = AppState::new(config).await.unwrap();

        let list = state.relay.submit(r#"{"REQ":"NEWLIST"}"#).await.unwrap();
        let Event::NewList { identifier, .. } = list.as_ref() else {
            panic!("Expected NewList event, got {:?}", list);
        };
        let payload = format!(
            r#"{{"REQ":"RENAMELIST","IDENTIFIER":"{}","TEXT":"{}"}}"#,
            identifier,
            "x".repeat(100 * 1024)
        );

        assert!(payload.len() > tally_protocol::MAX_PAYLOAD_SIZE);
        assert!(state.relay.submit(&payload).await.is_ok());

        state.relay.shutdown().await;
    }
}
