//! [`DeviceSession`] – connection state machine for one wearable device.
//!
//! ```text
//! Disconnected → Connecting → Connected → NotifyActive
//!                                 ↑            │ link drop observed
//!                                 │            ▼
//!                                 └──────── Lost → Connecting (one attempt)
//! ```
//!
//! A session owns its link, its notification receiver while subscribed, and
//! the latest sample per sub-sensor.  Every inbound notification replaces
//! the entire sample map; samples are never merged incrementally.  A lost
//! link gets exactly one reconnect attempt per liveness poll; when that
//! fails the caller drops the session.

use std::collections::BTreeMap;

use imulink_types::{DeviceSnapshot, LinkError, Quaternion};
use imulink_wire::decode_notification;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::radio::RadioLink;

/// Connection lifecycle states for one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected with the notification subscription live.
    NotifyActive,
    /// The link dropped; the next liveness poll attempts one reconnect.
    Lost,
}

/// One connected (or recovering) wearable device.
pub struct DeviceSession {
    link: Box<dyn RadioLink>,
    name: String,
    characteristic: Uuid,
    state: SessionState,
    notifications: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    samples: BTreeMap<u8, Quaternion>,
}

impl DeviceSession {
    /// Wrap an unconnected `link` under `name`, subscribing on
    /// `characteristic` once streaming starts.
    pub fn new(link: Box<dyn RadioLink>, name: impl Into<String>, characteristic: Uuid) -> Self {
        Self {
            link,
            name: name.into(),
            characteristic,
            state: SessionState::Disconnected,
            notifications: None,
            samples: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> &str {
        self.link.address()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Latest samples keyed by sub-sensor id.
    pub fn samples(&self) -> &BTreeMap<u8, Quaternion> {
        &self.samples
    }

    /// Read-only view for the frame formatter.
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            address: self.link.address().to_string(),
            name: self.name.clone(),
            sensors: self.samples.clone(),
        }
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            info!(device = %self.link.address(), from = ?self.state, to = ?to, "session state");
            self.state = to;
        }
    }

    /// Attempt one connection.
    ///
    /// # Errors
    ///
    /// Propagates the link's [`LinkError::Radio`]; the session returns to
    /// [`SessionState::Disconnected`] and is not retried at this layer.
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        self.transition(SessionState::Connecting);
        match self.link.connect().await {
            Ok(()) => {
                self.transition(SessionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Subscribe to the notification stream.
    ///
    /// # Errors
    ///
    /// Propagates the link's subscribe failure; the caller excludes the
    /// device from streaming.
    pub async fn start_notifications(&mut self) -> Result<(), LinkError> {
        let rx = self.link.subscribe(self.characteristic).await?;
        self.notifications = Some(rx);
        self.transition(SessionState::NotifyActive);
        Ok(())
    }

    /// Drain every queued notification without blocking.
    ///
    /// Each payload replaces the whole sample map via the wire decode.
    /// Returns the number of payloads applied.
    pub fn drain_notifications(&mut self) -> usize {
        let Some(mut rx) = self.notifications.take() else {
            return 0;
        };
        let mut applied = 0;
        while let Ok(payload) = rx.try_recv() {
            self.samples = decode_notification(&payload).into_iter().collect();
            applied += 1;
        }
        self.notifications = Some(rx);

        if applied > 0 {
            debug!(
                device = %self.link.address(),
                packets = applied,
                sensors = self.samples.len(),
                "notifications applied"
            );
        }
        applied
    }

    /// Detect link loss and attempt a single recovery.
    ///
    /// A healthy link is a no-op.  A lost link is reconnected and
    /// resubscribed in one pass.
    ///
    /// # Errors
    ///
    /// Propagates the reconnect or resubscribe failure; the caller drops the
    /// session.
    pub async fn poll_liveness(&mut self) -> Result<(), LinkError> {
        if self.link.is_connected() {
            return Ok(());
        }
        warn!(device = %self.link.address(), "link lost, attempting reconnect");
        self.transition(SessionState::Lost);
        self.notifications = None;
        self.connect().await?;
        self.start_notifications().await
    }

    /// Stop the notification stream but stay connected.
    ///
    /// # Errors
    ///
    /// Propagates the link's unsubscribe failure.
    pub async fn stop_notifications(&mut self) -> Result<(), LinkError> {
        self.notifications = None;
        self.link.unsubscribe(self.characteristic).await?;
        self.transition(SessionState::Connected);
        Ok(())
    }

    /// Unsubscribe (best effort) and drop the connection.  Always ends
    /// [`SessionState::Disconnected`] with the sample map cleared.
    ///
    /// # Errors
    ///
    /// Propagates the link's disconnect failure after the state is already
    /// torn down locally.
    pub async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.notifications = None;
        if self.state == SessionState::NotifyActive
            && let Err(e) = self.link.unsubscribe(self.characteristic).await
        {
            warn!(device = %self.link.address(), error = %e, "unsubscribe before disconnect failed");
        }
        let result = self.link.disconnect().await;
        self.samples.clear();
        self.transition(SessionState::Disconnected);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{RadioStack, TELEMETRY_CHARACTERISTIC};
    use crate::sim::SimRadio;

    const ADDR: &str = "00:18:80:72:47:91";

    fn make_record(id: u8, x: i16, y: i16, z: i16, w: i16) -> Vec<u8> {
        let mut bytes = vec![id];
        for component in [x, y, z, w] {
            bytes.extend_from_slice(&component.to_le_bytes());
        }
        bytes
    }

    fn make_session(radio: &SimRadio) -> DeviceSession {
        DeviceSession::new(radio.open(ADDR), "NU7-L", TELEMETRY_CHARACTERISTIC)
    }

    #[tokio::test]
    async fn connect_reaches_connected_state() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.address(), ADDR);
    }

    #[tokio::test]
    async fn failed_connect_returns_to_disconnected() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        radio.set_connect_failure(ADDR, true);
        let mut session = make_session(&radio);

        assert!(session.connect().await.is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn notification_replaces_entire_sample_map() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        session.connect().await.unwrap();
        session.start_notifications().await.unwrap();

        let mut first = make_record(1, 16384, 0, 0, 0);
        first.extend(make_record(2, 0, 16384, 0, 0));
        radio.push_notification(ADDR, first);
        assert_eq!(session.drain_notifications(), 1);
        assert_eq!(session.samples().len(), 2);

        radio.push_notification(ADDR, make_record(3, 0, 0, 0, 16384));
        assert_eq!(session.drain_notifications(), 1);

        let ids: Vec<u8> = session.samples().keys().copied().collect();
        assert_eq!(ids, vec![3]);
        assert!((session.samples()[&3].w - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn drain_applies_every_queued_payload() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        session.connect().await.unwrap();
        session.start_notifications().await.unwrap();

        radio.push_notification(ADDR, make_record(1, 100, 0, 0, 0));
        radio.push_notification(ADDR, make_record(1, 200, 0, 0, 0));
        radio.push_notification(ADDR, make_record(1, 300, 0, 0, 0));

        assert_eq!(session.drain_notifications(), 3);
        assert!((session.samples()[&1].x - 300.0 / 16384.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn drain_without_subscription_is_zero() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        assert_eq!(session.drain_notifications(), 0);
    }

    #[tokio::test]
    async fn stop_notifications_keeps_connection() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        session.connect().await.unwrap();
        session.start_notifications().await.unwrap();

        session.stop_notifications().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert!(!radio.has_subscriber(ADDR));
        assert!(radio.is_connected(ADDR));
    }

    #[tokio::test]
    async fn disconnect_clears_samples_and_state() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        session.connect().await.unwrap();
        session.start_notifications().await.unwrap();
        radio.push_notification(ADDR, make_record(1, 16384, 0, 0, 0));
        session.drain_notifications();

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.samples().is_empty());
        assert!(!radio.is_connected(ADDR));
    }

    #[tokio::test]
    async fn liveness_is_noop_while_connected() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        session.connect().await.unwrap();
        session.start_notifications().await.unwrap();

        session.poll_liveness().await.unwrap();
        assert_eq!(session.state(), SessionState::NotifyActive);
        assert_eq!(radio.connect_attempts(ADDR), 1);
    }

    #[tokio::test]
    async fn liveness_reconnects_and_resubscribes_after_drop() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        session.connect().await.unwrap();
        session.start_notifications().await.unwrap();

        radio.drop_link(ADDR);
        session.poll_liveness().await.unwrap();

        assert_eq!(session.state(), SessionState::NotifyActive);
        assert_eq!(radio.connect_attempts(ADDR), 2);
        assert!(radio.push_notification(ADDR, make_record(4, 0, 0, 0, 16384)));
        assert_eq!(session.drain_notifications(), 1);
    }

    #[tokio::test]
    async fn liveness_failure_surfaces_for_caller_to_drop() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut session = make_session(&radio);
        session.connect().await.unwrap();
        session.start_notifications().await.unwrap();

        radio.drop_link(ADDR);
        radio.set_connect_failure(ADDR, true);

        assert!(session.poll_liveness().await.is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
