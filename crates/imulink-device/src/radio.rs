//! Capability traits for the underlying radio stack.
//!
//! The bridge assumes a radio stack that can scan for advertisements,
//! connect to a device, and subscribe to characteristic notifications.
//! [`RadioStack`] covers discovery and link construction; [`RadioLink`]
//! covers one device's connection lifecycle.  Session and manager code only
//! ever talk to the traits, so a platform backend can be swapped in without
//! touching them.  [`SimRadio`][crate::sim::SimRadio] is the in-process
//! implementation used by tests and headless runs.

use std::time::Duration;

use async_trait::async_trait;
use imulink_types::LinkError;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Notification characteristic carrying quaternion records on NU7 wearables.
pub const TELEMETRY_CHARACTERISTIC: Uuid =
    match Uuid::try_parse("12345678-1234-1234-1234-1234567890ac") {
        Ok(id) => id,
        Err(_) => panic!("characteristic literal is valid"),
    };

/// One device heard during a scan.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Radio address as advertised, in whatever case the backend reports.
    pub address: String,
    /// Display name, when the advertisement carries one.
    pub name: Option<String>,
}

/// Uppercase and trim an address so allow-list entries and scan results
/// compare reliably.
pub fn normalize_addr(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

/// Discovery and link construction for one radio backend.
#[async_trait]
pub trait RadioStack: Send + Sync {
    /// Scan for up to `timeout` and return every advertisement heard.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Scan`] when the scan itself cannot run.  An
    /// empty result is not an error.
    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>, LinkError>;

    /// Construct an unconnected link to `address`.
    fn open(&self, address: &str) -> Box<dyn RadioLink>;
}

/// Connection lifecycle and notification subscription for one device.
///
/// Notification delivery is an explicit inbound channel:
/// [`RadioLink::subscribe`] hands back the receiving end and the link pushes
/// every payload into it until [`RadioLink::unsubscribe`] or disconnect.
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// The address this link is bound to, uppercase.
    fn address(&self) -> &str;

    /// Attempt one connection.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Radio`] when the device cannot be reached.  The
    /// caller decides whether to retry; this layer never does.
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Tear the connection down.  Disconnecting an already-down link is not
    /// an error.
    async fn disconnect(&mut self) -> Result<(), LinkError>;

    /// Whether the link currently reports itself connected.
    fn is_connected(&self) -> bool;

    /// Subscribe to notifications on `characteristic`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Radio`] when the subscription cannot be
    /// established, e.g. on a disconnected link.
    async fn subscribe(
        &mut self,
        characteristic: Uuid,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, LinkError>;

    /// Stop notifications on `characteristic`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Radio`] when the backend rejects the request.
    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<(), LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characteristic_matches_wearable_firmware() {
        assert_eq!(
            TELEMETRY_CHARACTERISTIC.to_string(),
            "12345678-1234-1234-1234-1234567890ac"
        );
    }

    #[test]
    fn normalize_addr_uppercases_and_trims() {
        assert_eq!(normalize_addr(" 00:18:80:af:58:63 "), "00:18:80:AF:58:63");
        assert_eq!(normalize_addr("AA:BB"), "AA:BB");
    }
}
