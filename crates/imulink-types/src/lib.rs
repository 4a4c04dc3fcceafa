use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Orientation sample reported by one sub-sensor, unit-scaled.
///
/// Components are serialized in `x, y, z, w` order, which is also the order
/// they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Read-only view of one device at a point in time: who it is and the latest
/// sample per sub-sensor id. The frame formatter consumes a sorted slice of
/// these.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    /// Radio address, uppercase.
    pub address: String,
    /// Display name taken from the advertisement.
    pub name: String,
    pub sensors: BTreeMap<u8, Quaternion>,
}

/// The JSON document the hub broadcasts to every subscriber:
/// `{"sensors": {"IMU3": {"x": …, "y": …, "z": …, "w": …}}}`.
///
/// Keys carry no device identity; two devices exposing the same sub-sensor
/// id collide and the last parsed line wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    pub sensors: BTreeMap<String, Quaternion>,
}

/// Global error type spanning radio faults, relay transport failures, and
/// configuration problems.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Radio Fault on {device}: {details}")]
    Radio { device: String, details: String },

    #[error("Scan Failed: {0}")]
    Scan(String),

    #[error("Relay Transport Error: {0}")]
    Transport(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_serialization_roundtrip() {
        let q = Quaternion {
            x: 0.1234,
            y: -0.5678,
            z: 0.0001,
            w: 0.9999,
        };
        let json = serde_json::to_string(&q).unwrap();
        let back: Quaternion = serde_json::from_str(&json).unwrap();
        assert!((q.x - back.x).abs() < f32::EPSILON);
        assert!((q.y - back.y).abs() < f32::EPSILON);
        assert!((q.z - back.z).abs() < f32::EPSILON);
        assert!((q.w - back.w).abs() < f32::EPSILON);
    }

    #[test]
    fn quaternion_field_order_is_x_y_z_w() {
        let q = Quaternion {
            x: 0.25,
            y: -0.5,
            z: 0.0,
            w: 1.0,
        };
        let json = serde_json::to_string(&q).unwrap();
        assert_eq!(json, r#"{"x":0.25,"y":-0.5,"z":0.0,"w":1.0}"#);
    }

    #[test]
    fn sensor_payload_shape() {
        let mut payload = SensorPayload::default();
        payload.sensors.insert(
            "IMU3".to_string(),
            Quaternion {
                x: 0.25,
                y: -0.5,
                z: 0.0,
                w: 1.0,
            },
        );
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"sensors":{"IMU3":{"x":0.25,"y":-0.5,"z":0.0,"w":1.0}}}"#
        );
        let back: SensorPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
    }

    #[test]
    fn link_error_display() {
        let err = LinkError::Radio {
            device: "00:18:80:72:47:91".to_string(),
            details: "connect timed out".to_string(),
        };
        assert!(err.to_string().contains("00:18:80:72:47:91"));

        let err2 = LinkError::Transport("connection refused".to_string());
        assert!(err2.to_string().contains("Relay Transport Error"));
    }
}
