//! In-process simulated radio backend for tests and headless runs.
//!
//! [`SimRadio`] implements [`RadioStack`] entirely in memory: callers script
//! advertisements, push notification payloads, and inject faults, while the
//! session layer drives the same code paths it would against a platform
//! backend.  The handle is clone-able, so a test keeps one handle to poke
//! the simulation while the session manager owns another.
//!
//! # Example
//!
//! ```rust
//! use imulink_device::{RadioStack, SimRadio};
//!
//! let radio = SimRadio::new().with_device("00:18:80:72:47:91", "NU7-L");
//! let link = radio.open("00:18:80:72:47:91");
//! assert!(!link.is_connected());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use imulink_types::LinkError;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::radio::{Advertisement, RadioLink, RadioStack, normalize_addr};

// ────────────────────────────────────────────────────────────────────────────
// Per-device shared state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SimDevice {
    name: Mutex<Option<String>>,
    advertised: AtomicBool,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
    connect_attempts: AtomicUsize,
    notify_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

// ────────────────────────────────────────────────────────────────────────────
// SimRadio
// ────────────────────────────────────────────────────────────────────────────

/// Simulated radio backend.
///
/// Devices are keyed by normalized address.  Every [`SimLink`] produced by
/// [`SimRadio::open`] shares the per-device state, so the simulation can
/// drop a link or feed it notifications while a session owns it.
#[derive(Clone, Default)]
pub struct SimRadio {
    devices: Arc<Mutex<HashMap<String, Arc<SimDevice>>>>,
    scan_fails: Arc<AtomicBool>,
}

impl SimRadio {
    /// Create a backend with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a device that advertises `name` from the start.
    pub fn with_device(self, address: &str, name: &str) -> Self {
        self.advertise(address, name);
        self
    }

    /// Make `address` advertise as `name` on subsequent scans.
    pub fn advertise(&self, address: &str, name: &str) {
        let device = self.entry(address);
        if let Ok(mut slot) = device.name.lock() {
            *slot = Some(name.to_string());
        }
        device.advertised.store(true, Ordering::Relaxed);
    }

    /// Remove `address` from subsequent scans.  The device itself remains.
    pub fn vanish(&self, address: &str) {
        if let Some(device) = self.lookup(address) {
            device.advertised.store(false, Ordering::Relaxed);
        }
    }

    /// Make every connect attempt against `address` fail (or succeed again).
    pub fn set_connect_failure(&self, address: &str, fail: bool) {
        self.entry(address).fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Make every subscribe attempt against `address` fail (or succeed again).
    pub fn set_subscribe_failure(&self, address: &str, fail: bool) {
        self.entry(address).fail_subscribe.store(fail, Ordering::Relaxed);
    }

    /// Make the next scans fail at the transport level.
    pub fn set_scan_failure(&self, fail: bool) {
        self.scan_fails.store(fail, Ordering::Relaxed);
    }

    /// Simulate link loss: the device stops reporting connected and its
    /// notification stream ends.
    pub fn drop_link(&self, address: &str) {
        if let Some(device) = self.lookup(address) {
            device.connected.store(false, Ordering::Relaxed);
            if let Ok(mut slot) = device.notify_tx.lock() {
                *slot = None;
            }
        }
    }

    /// Number of connect attempts seen for `address`.
    pub fn connect_attempts(&self, address: &str) -> usize {
        self.lookup(address)
            .map(|d| d.connect_attempts.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Whether `address` currently reports connected.
    pub fn is_connected(&self, address: &str) -> bool {
        self.lookup(address)
            .map(|d| d.connected.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Whether a live notification subscription exists for `address`.
    pub fn has_subscriber(&self, address: &str) -> bool {
        self.lookup(address)
            .map(|d| d.notify_tx.lock().map(|slot| slot.is_some()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Push one notification payload to `address`.
    ///
    /// Returns `true` when a live subscriber received it.
    pub fn push_notification(&self, address: &str, payload: Vec<u8>) -> bool {
        let Some(device) = self.lookup(address) else {
            return false;
        };
        device
            .notify_tx
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|tx| tx.send(payload).is_ok()))
            .unwrap_or(false)
    }

    fn entry(&self, address: &str) -> Arc<SimDevice> {
        let key = normalize_addr(address);
        self.devices
            .lock()
            .map(|mut devices| Arc::clone(devices.entry(key).or_default()))
            .unwrap_or_default()
    }

    fn lookup(&self, address: &str) -> Option<Arc<SimDevice>> {
        let key = normalize_addr(address);
        self.devices
            .lock()
            .ok()
            .and_then(|devices| devices.get(&key).map(Arc::clone))
    }
}

#[async_trait]
impl RadioStack for SimRadio {
    async fn scan(&self, _timeout: Duration) -> Result<Vec<Advertisement>, LinkError> {
        if self.scan_fails.load(Ordering::Relaxed) {
            return Err(LinkError::Scan("simulated scan failure".to_string()));
        }
        let devices = self
            .devices
            .lock()
            .map_err(|_| LinkError::Scan("sim device table poisoned".to_string()))?;
        Ok(devices
            .iter()
            .filter(|(_, device)| device.advertised.load(Ordering::Relaxed))
            .map(|(address, device)| Advertisement {
                address: address.clone(),
                name: device.name.lock().ok().and_then(|slot| slot.clone()),
            })
            .collect())
    }

    fn open(&self, address: &str) -> Box<dyn RadioLink> {
        Box::new(SimLink {
            address: normalize_addr(address),
            device: self.entry(address),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimLink
// ────────────────────────────────────────────────────────────────────────────

/// Link handle produced by [`SimRadio::open`].
pub struct SimLink {
    address: String,
    device: Arc<SimDevice>,
}

#[async_trait]
impl RadioLink for SimLink {
    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&mut self) -> Result<(), LinkError> {
        self.device.connect_attempts.fetch_add(1, Ordering::Relaxed);
        if self.device.fail_connect.load(Ordering::Relaxed) {
            return Err(LinkError::Radio {
                device: self.address.clone(),
                details: "simulated connect failure".to_string(),
            });
        }
        self.device.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.device.connected.store(false, Ordering::Relaxed);
        if let Ok(mut slot) = self.device.notify_tx.lock() {
            *slot = None;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.device.connected.load(Ordering::Relaxed)
    }

    async fn subscribe(
        &mut self,
        _characteristic: Uuid,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::Radio {
                device: self.address.clone(),
                details: "subscribe on a disconnected link".to_string(),
            });
        }
        if self.device.fail_subscribe.load(Ordering::Relaxed) {
            return Err(LinkError::Radio {
                device: self.address.clone(),
                details: "simulated subscribe failure".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.device.notify_tx.lock() {
            *slot = Some(tx);
        }
        Ok(rx)
    }

    async fn unsubscribe(&mut self, _characteristic: Uuid) -> Result<(), LinkError> {
        if let Ok(mut slot) = self.device.notify_tx.lock() {
            *slot = None;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::TELEMETRY_CHARACTERISTIC;

    const ADDR: &str = "00:18:80:72:47:91";

    #[tokio::test]
    async fn scan_returns_advertised_devices_only() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        radio.advertise("AA:BB:CC:DD:EE:FF", "NU7-R");
        radio.vanish("AA:BB:CC:DD:EE:FF");

        let adverts = radio.scan(Duration::from_millis(1)).await.unwrap();
        assert_eq!(adverts.len(), 1);
        assert_eq!(adverts[0].address, ADDR);
        assert_eq!(adverts[0].name.as_deref(), Some("NU7-L"));
    }

    #[tokio::test]
    async fn scan_failure_propagates() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        radio.set_scan_failure(true);
        let err = radio.scan(Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, LinkError::Scan(_)));
    }

    #[tokio::test]
    async fn connect_marks_device_connected_and_counts_attempts() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut link = radio.open(ADDR);

        link.connect().await.unwrap();
        assert!(link.is_connected());
        assert!(radio.is_connected(ADDR));
        assert_eq!(radio.connect_attempts(ADDR), 1);
    }

    #[tokio::test]
    async fn injected_connect_failure_surfaces() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        radio.set_connect_failure(ADDR, true);
        let mut link = radio.open(ADDR);

        assert!(link.connect().await.is_err());
        assert!(!link.is_connected());
        assert_eq!(radio.connect_attempts(ADDR), 1);
    }

    #[tokio::test]
    async fn subscribe_delivers_pushed_payloads() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut link = radio.open(ADDR);
        link.connect().await.unwrap();

        let mut rx = link.subscribe(TELEMETRY_CHARACTERISTIC).await.unwrap();
        assert!(radio.has_subscriber(ADDR));
        assert!(radio.push_notification(ADDR, vec![1, 2, 3]));
        assert_eq!(rx.recv().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribe_requires_connection() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut link = radio.open(ADDR);
        assert!(link.subscribe(TELEMETRY_CHARACTERISTIC).await.is_err());
    }

    #[tokio::test]
    async fn push_without_subscriber_reports_false() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        assert!(!radio.push_notification(ADDR, vec![0]));
        assert!(!radio.push_notification("unknown", vec![0]));
    }

    #[tokio::test]
    async fn drop_link_ends_connection_and_subscription() {
        let radio = SimRadio::new().with_device(ADDR, "NU7-L");
        let mut link = radio.open(ADDR);
        link.connect().await.unwrap();
        let _rx = link.subscribe(TELEMETRY_CHARACTERISTIC).await.unwrap();

        radio.drop_link(ADDR);
        assert!(!link.is_connected());
        assert!(!radio.has_subscriber(ADDR));
    }
}
