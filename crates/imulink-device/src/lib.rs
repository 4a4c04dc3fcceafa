//! `imulink-device` – The Radio Side
//!
//! Discovers wearable IMU devices, owns their connection lifecycles, and
//! turns their notification streams into formatted text frames for delivery
//! to the relay hub.
//!
//! # Modules
//!
//! - [`radio`] – capability traits for the underlying radio stack
//!   ([`RadioStack`], [`RadioLink`]); the rest of the crate never talks to a
//!   platform backend directly.
//! - [`sim`] – in-process simulated backend ([`SimRadio`]) for tests and
//!   headless runs.
//! - [`session`] – per-device connection state machine ([`DeviceSession`]).
//! - [`manager`] – the active set, discovery, and the streaming loop
//!   ([`SessionManager`]).
//! - [`sink`] – the delivery seam ([`FrameSink`]) between the streaming loop
//!   and whatever transports frames to the hub.

pub mod manager;
pub mod radio;
pub mod session;
pub mod sim;
pub mod sink;

pub use manager::{LinkConfig, MAX_DEVICES, SessionManager, StreamCommand, StreamEnd};
pub use radio::{Advertisement, RadioLink, RadioStack, TELEMETRY_CHARACTERISTIC, normalize_addr};
pub use session::{DeviceSession, SessionState};
pub use sim::SimRadio;
pub use sink::FrameSink;
