//! `imulink-hub` – The Relay Side
//!
//! One producer endpoint in, any number of viewers out.  The bridge
//! delivers text frames to `/ble`; every frame is parsed into a
//! [`SensorPayload`](imulink_types::SensorPayload) and fanned out as JSON
//! to every viewer attached on `/ws`.
//!
//! # Modules
//!
//! * [`registry`] – the live subscriber set with snapshot broadcast.
//! * [`server`] – the [`RelayHub`] accept loop and per-role handlers.
//! * [`producer`] – [`ProducerClient`], the bridge-side [`FrameSink`]
//!   (re-exported from `imulink-device`) that feeds a hub.

pub mod producer;
pub mod registry;
pub mod server;

pub use imulink_device::FrameSink;
pub use producer::ProducerClient;
pub use registry::SubscriberRegistry;
pub use server::{DEFAULT_PORT, RelayHub};
