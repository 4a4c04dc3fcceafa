//! [`SessionManager`] – the active device set and the streaming loop.
//!
//! The manager owns at most [`MAX_DEVICES`] concurrent [`DeviceSession`]s
//! and drives the two operations the operator console exposes:
//!
//! - [`SessionManager::discover_and_connect`] – one bounded scan, then one
//!   connection attempt per allow-listed address that advertised with the
//!   configured name prefix.
//! - [`SessionManager::begin_streaming`] – the fixed-cadence polling loop:
//!   drain notifications, format the frame, hand it to the [`FrameSink`],
//!   poll liveness, observe the operator command cell once per tick.
//!
//! The command cell is a `tokio::sync::watch` channel: single slot, last
//! writer wins, and the polling loop reads it without ever awaiting the
//! input side.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use imulink_types::{DeviceSnapshot, LinkError};
use imulink_wire::format_frame;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::radio::{RadioStack, TELEMETRY_CHARACTERISTIC, normalize_addr};
use crate::session::DeviceSession;
use crate::sink::FrameSink;

/// Hard cap on concurrent device sessions.
pub const MAX_DEVICES: usize = 2;

/// Settings for discovery and streaming.
///
/// [`Default`] matches the NU7 wearable deployment, with an empty
/// allow-list the operator fills in.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Addresses eligible for connection.
    pub allowed_addresses: Vec<String>,
    /// Only advertisements whose name starts with this prefix count.
    pub name_prefix: String,
    /// Streaming tick cadence.
    pub poll_interval: Duration,
    /// Upper bound on one discovery scan.
    pub scan_timeout: Duration,
    /// Requested session cap; the effective value never exceeds
    /// [`MAX_DEVICES`].
    pub max_devices: usize,
    /// Notification characteristic to subscribe on.
    pub characteristic: Uuid,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            allowed_addresses: Vec::new(),
            name_prefix: "NU7".to_string(),
            poll_interval: Duration::from_secs(1),
            scan_timeout: Duration::from_secs(5),
            max_devices: MAX_DEVICES,
            characteristic: TELEMETRY_CHARACTERISTIC,
        }
    }
}

/// Operator command for the streaming loop, last writer wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamCommand {
    /// Keep streaming.
    #[default]
    Run,
    /// Stop streaming but keep every device connected.
    StopStreaming,
    /// Stop streaming and disconnect everything.
    ExitAndDisconnect,
}

/// Why [`SessionManager::begin_streaming`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Operator stopped streaming; sessions remain connected.
    Stopped,
    /// Operator exited; the active set is empty.
    Disconnected,
    /// The shutdown flag was observed; the active set is empty.
    Interrupted,
}

/// Owns every active device session plus the discovery and streaming logic.
pub struct SessionManager {
    radio: Arc<dyn RadioStack>,
    config: LinkConfig,
    sessions: Vec<DeviceSession>,
}

impl SessionManager {
    pub fn new(radio: Arc<dyn RadioStack>, config: LinkConfig) -> Self {
        Self {
            radio,
            config,
            sessions: Vec::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_addresses(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.address().to_string()).collect()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Whether the active set has reached its cap.
    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.capacity()
    }

    fn capacity(&self) -> usize {
        self.config.max_devices.min(MAX_DEVICES)
    }

    fn has(&self, address: &str) -> bool {
        self.sessions.iter().any(|s| s.address() == address)
    }

    fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.sessions.iter().map(DeviceSession::snapshot).collect()
    }

    /// One bounded scan followed by one connection attempt per allow-listed
    /// address that advertised with the configured prefix.
    ///
    /// Already-connected addresses and addresses absent from the scan are
    /// skipped; a failed connect is logged and the device is not added.
    /// Returns the number of newly connected devices.  Zero matches is not
    /// an error and leaves the active set untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Scan`] only when the scan transport itself
    /// fails.
    pub async fn discover_and_connect(&mut self) -> Result<usize, LinkError> {
        if self.is_full() {
            info!("active set already full, skipping scan");
            return Ok(0);
        }

        let adverts = self.radio.scan(self.config.scan_timeout).await?;
        let mut named = HashMap::new();
        for advert in adverts {
            if let Some(name) = advert.name
                && name.starts_with(&self.config.name_prefix)
            {
                named.insert(normalize_addr(&advert.address), name);
            }
        }
        info!(matches = named.len(), prefix = %self.config.name_prefix, "scan complete");

        let allowed: Vec<String> = self
            .config
            .allowed_addresses
            .iter()
            .map(|a| normalize_addr(a))
            .collect();

        let mut connected = 0;
        for address in allowed {
            if self.is_full() {
                break;
            }
            if self.has(&address) {
                info!(device = %address, "already connected, skipping");
                continue;
            }
            let Some(name) = named.get(&address) else {
                continue;
            };
            let mut session = DeviceSession::new(
                self.radio.open(&address),
                name.clone(),
                self.config.characteristic,
            );
            match session.connect().await {
                Ok(()) => {
                    info!(device = %address, name = %name, "device connected");
                    self.sessions.push(session);
                    connected += 1;
                }
                Err(e) => {
                    warn!(device = %address, error = %e, "connect failed");
                }
            }
        }
        Ok(connected)
    }

    /// Run the streaming loop until the operator says otherwise.
    ///
    /// Starts notifications on every session first; a subscribe failure is
    /// logged and that device is disconnected and excluded.  Each tick then
    /// drains every notification channel, formats the current frame, hands
    /// it to `sink` (a delivery failure drops the tick's frame and the loop
    /// continues), polls liveness (a session whose single reconnect fails is
    /// dropped), and observes `commands` exactly once.  `shutdown` is the
    /// operator-interrupt flag; observing it tears everything down.
    ///
    /// Ticks with no samples on any device deliver nothing.
    pub async fn begin_streaming<S: FrameSink>(
        &mut self,
        sink: &mut S,
        commands: &watch::Receiver<StreamCommand>,
        shutdown: &AtomicBool,
    ) -> Result<StreamEnd, LinkError> {
        let mut keep = Vec::with_capacity(self.sessions.len());
        for mut session in std::mem::take(&mut self.sessions) {
            match session.start_notifications().await {
                Ok(()) => keep.push(session),
                Err(e) => {
                    warn!(device = %session.address(), error = %e, "subscribe failed, excluding device");
                    let _ = session.disconnect().await;
                }
            }
        }
        self.sessions = keep;
        info!(devices = self.sessions.len(), "streaming started");

        loop {
            if shutdown.load(Ordering::Relaxed) {
                self.disconnect_all().await;
                return Ok(StreamEnd::Interrupted);
            }

            for session in &mut self.sessions {
                session.drain_notifications();
            }

            if self.sessions.iter().any(|s| !s.samples().is_empty()) {
                let frame = format_frame(self.snapshots());
                if let Err(e) = sink.deliver(&frame).await {
                    warn!(error = %e, "frame delivery failed, dropping tick");
                }
            }

            self.poll_liveness().await;

            let command = *commands.borrow();
            match command {
                StreamCommand::Run => {}
                StreamCommand::StopStreaming => {
                    self.stop_all_notifications().await;
                    info!("streaming stopped, devices remain connected");
                    return Ok(StreamEnd::Stopped);
                }
                StreamCommand::ExitAndDisconnect => {
                    self.disconnect_all().await;
                    info!("streaming exited, all devices disconnected");
                    return Ok(StreamEnd::Disconnected);
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn poll_liveness(&mut self) {
        let mut keep = Vec::with_capacity(self.sessions.len());
        for mut session in std::mem::take(&mut self.sessions) {
            match session.poll_liveness().await {
                Ok(()) => keep.push(session),
                Err(e) => {
                    error!(device = %session.address(), error = %e, "reconnect failed, dropping device");
                }
            }
        }
        self.sessions = keep;
    }

    /// Stop notifications on every session, keeping connections up.
    pub async fn stop_all_notifications(&mut self) {
        for session in &mut self.sessions {
            if let Err(e) = session.stop_notifications().await {
                warn!(device = %session.address(), error = %e, "stop notifications failed");
            }
        }
    }

    /// Best-effort teardown of every session; the active set ends empty.
    pub async fn disconnect_all(&mut self) {
        for mut session in std::mem::take(&mut self.sessions) {
            if let Err(e) = session.disconnect().await {
                warn!(device = %session.address(), error = %e, "disconnect failed");
            }
        }
    }
}
