//! [`RelayHub`] – WebSocket relay between the bridge and viewer clients.
//!
//! Listens on `0.0.0.0:8001` (configurable via [`RelayHub::with_port`]) and
//! routes every connection by its handshake request path:
//!
//! * `/ble` – producer; each text frame is parsed and fanned out.
//! * `/ws` – subscriber; receives one JSON payload per relayed frame.
//! * anything else – closed right after the handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use imulink_types::{LinkError, SensorPayload};
use imulink_wire::parse_frame;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async, tungstenite::Message};
use tracing::{error, info, warn};

use crate::registry::SubscriberRegistry;

/// Default TCP port for the relay hub.
pub const DEFAULT_PORT: u16 = 8001;

// ---------------------------------------------------------------------------
// RelayHub
// ---------------------------------------------------------------------------

/// Fan-out relay: one producer endpoint feeding any number of subscribers.
///
/// # Example
///
/// ```rust,no_run
/// use imulink_hub::RelayHub;
///
/// #[tokio::main]
/// async fn main() {
///     RelayHub::new()
///         .run()
///         .await
///         .expect("relay hub failed");
/// }
/// ```
pub struct RelayHub {
    port: u16,
    registry: Arc<SubscriberRegistry>,
}

impl RelayHub {
    /// Create a hub on the [`DEFAULT_PORT`].
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            registry: Arc::new(SubscriberRegistry::default()),
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start the hub.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Transport`] if the TCP listener cannot bind.
    /// This is the hub's only fatal condition; per-connection failures are
    /// logged and the accept loop keeps running.
    pub async fn run(self) -> Result<(), LinkError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LinkError::Transport(format!("bind error on {addr}: {e}")))?;

        info!(port = self.port, "relay hub listening");
        self.serve(listener).await
    }

    /// Run the accept loop on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), LinkError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, registry).await {
                            error!(peer = %peer, error = %e, "client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<SubscriberRegistry>,
) -> Result<(), LinkError> {
    // The request path decides the connection's role, so capture it during
    // the handshake.
    let mut path = String::new();
    let mut ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        Ok(resp)
    })
    .await
    .map_err(|e| LinkError::Transport(format!("ws handshake from {peer}: {e}")))?;

    match path.as_str() {
        "/ble" => {
            info!(peer = %peer, "producer connected");
            handle_producer(ws_stream, peer, &registry).await;
            info!(peer = %peer, "producer disconnected");
        }
        "/ws" => {
            info!(peer = %peer, "subscriber connected");
            handle_subscriber(ws_stream, peer, &registry).await;
            info!(peer = %peer, "subscriber disconnected");
        }
        other => {
            warn!(peer = %peer, path = %other, "unknown path, closing");
            let _ = ws_stream.close(None).await;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Producer: bridge → hub
// ---------------------------------------------------------------------------

async fn handle_producer(
    mut ws_stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
    registry: &SubscriberRegistry,
) {
    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                relay_frame(text.as_str(), registry);
            }
            Ok(Message::Binary(bytes)) => {
                // Non-UTF8 binary frames are dropped, the connection stays up.
                if let Ok(text) = std::str::from_utf8(&bytes) {
                    relay_frame(text, registry);
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "producer stream error");
                break;
            }
            _ => {}
        }
    }
}

/// Parse one producer frame and fan the JSON payload out to every
/// subscriber.  Returns how many subscribers received it.
///
/// Frames that yield no sensor mappings (malformed or empty) are dropped
/// without broadcasting.
pub(crate) fn relay_frame(text: &str, registry: &SubscriberRegistry) -> usize {
    let sensors = parse_frame(text);
    if sensors.is_empty() {
        return 0;
    }

    let payload = SensorPayload { sensors };
    match serde_json::to_string(&payload) {
        Ok(json) => registry.broadcast(&json),
        Err(e) => {
            error!(error = %e, "payload serialization failed");
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber: hub → viewer
// ---------------------------------------------------------------------------

async fn handle_subscriber(
    ws_stream: WebSocketStream<TcpStream>,
    peer: SocketAddr,
    registry: &SubscriberRegistry,
) {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = registry.attach(tx);

    loop {
        tokio::select! {
            // Relay payloads to the viewer.
            payload = rx.recv() => {
                match payload {
                    Some(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // Viewers only listen; anything they send besides a close is
            // ignored.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    registry.detach(id);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
