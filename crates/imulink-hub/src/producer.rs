//! [`ProducerClient`] – the bridge's outbound link to the hub.
//!
//! Wraps a WebSocket connection to a hub's `/ble` endpoint behind the
//! [`FrameSink`] trait.  The connection is opened lazily on first delivery
//! and dropped on any send failure, so the next delivery dials fresh
//! instead of writing into a dead socket.

use async_trait::async_trait;
use futures_util::SinkExt;
use imulink_device::FrameSink;
use imulink_types::LinkError;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{info, warn};

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lazily-connecting frame sink that feeds a [`RelayHub`](crate::RelayHub).
pub struct ProducerClient {
    url: String,
    conn: Option<HubSocket>,
}

impl ProducerClient {
    /// Point the client at a hub's producer endpoint.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            url: format!("ws://{host}:{port}/ble"),
            conn: None,
        }
    }

    /// The endpoint this client dials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a hub connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn ensure_connected(&mut self) -> Result<(), LinkError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| LinkError::Transport(format!("connect to {}: {e}", self.url)))?;
        info!(url = %self.url, "hub link established");
        self.conn = Some(socket);
        Ok(())
    }
}

#[async_trait]
impl FrameSink for ProducerClient {
    async fn deliver(&mut self, frame: &str) -> Result<(), LinkError> {
        self.ensure_connected().await?;
        let Some(socket) = self.conn.as_mut() else {
            return Err(LinkError::Transport(format!("no hub link to {}", self.url)));
        };

        if let Err(e) = socket.send(Message::Text(frame.to_string().into())).await {
            warn!(url = %self.url, error = %e, "hub send failed, dropping link");
            self.conn = None;
            return Err(LinkError::Transport(format!("send to {}: {e}", self.url)));
        }
        Ok(())
    }
}
