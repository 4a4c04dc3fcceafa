//! `imulink-wire` – The Wire Codec
//!
//! Shared vocabulary between sensor bridges and the relay hub: binary
//! notification payloads on the radio side, line-oriented text frames on the
//! WebSocket side.
//!
//! # Modules
//!
//! - [`notification`] – fixed 9-byte record decoding for inbound radio
//!   notifications.
//! - [`frame`] – text frame formatting (bridge side) and tolerant parsing
//!   (hub side).

pub mod frame;
pub mod notification;

pub use frame::{SENSOR_KEY_PREFIX, format_frame, parse_frame};
pub use notification::{QUAT_SCALE, RECORD_LEN, decode_notification};
