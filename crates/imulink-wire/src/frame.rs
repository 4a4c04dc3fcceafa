//! Text frame formatting and parsing.
//!
//! A frame is the multi-line text unit a bridge sends per tick:
//!
//! ```text
//! Data from 00:18:80:72:47:91 (NU7-L):
//! IMU1 qx = 0.1234 qy = -0.5678 qz = 0.0001 qw = 0.9999
//! IMU2 qx = 0.0000 qy = 0.0000 qz = 0.0000 qw = 1.0000
//! Data from 00:18:80:AF:58:63 (NU7-R):
//! IMU1 qx = 0.7071 qy = 0.0000 qz = 0.0000 qw = 0.7071
//! ```
//!
//! Devices appear sorted by address, sub-sensors in ascending id order, and
//! every component is printed to exactly four decimal places.
//!
//! Parsing is line-oriented and tolerant: lines that do not match the sensor
//! pattern (headers included) are skipped without error, and the hub keeps
//! no state between frames.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::LazyLock;

use imulink_types::{DeviceSnapshot, Quaternion};
use regex::Regex;

/// Key prefix for sub-sensor entries in parsed frames and hub payloads.
pub const SENSOR_KEY_PREFIX: &str = "IMU";

static SENSOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"IMU\s*(\d+)\s+qx\s*=\s*([-0-9.eE]+)\s+qy\s*=\s*([-0-9.eE]+)\s+qz\s*=\s*([-0-9.eE]+)\s+qw\s*=\s*([-0-9.eE]+)",
    )
    .expect("sensor line pattern is valid")
});

/// Render the per-tick text frame for a set of device snapshots.
///
/// Devices are sorted by address here so the output order never depends on
/// the caller's iteration order.
pub fn format_frame(mut devices: Vec<DeviceSnapshot>) -> String {
    devices.sort_by(|a, b| a.address.cmp(&b.address));

    let mut out = String::new();
    for device in &devices {
        let _ = writeln!(out, "Data from {} ({}):", device.address, device.name);
        for (id, q) in &device.sensors {
            let _ = writeln!(
                out,
                "{SENSOR_KEY_PREFIX}{id} qx = {:.4} qy = {:.4} qz = {:.4} qw = {:.4}",
                q.x, q.y, q.z, q.w
            );
        }
    }
    out
}

/// Extract sub-sensor samples from a producer frame.
///
/// Each matching line yields key `"IMU" + id`; later duplicates overwrite
/// earlier entries. Lines whose float atoms fail numeric parse are skipped,
/// as is everything else that does not match.
pub fn parse_frame(text: &str) -> BTreeMap<String, Quaternion> {
    let mut sensors = BTreeMap::new();
    for line in text.lines() {
        let Some(caps) = SENSOR_LINE.captures(line) else {
            continue;
        };
        let Ok(id) = caps[1].parse::<u32>() else {
            continue;
        };
        let parsed = (
            caps[2].parse::<f32>(),
            caps[3].parse::<f32>(),
            caps[4].parse::<f32>(),
            caps[5].parse::<f32>(),
        );
        let (Ok(x), Ok(y), Ok(z), Ok(w)) = parsed else {
            continue;
        };
        sensors.insert(
            format!("{SENSOR_KEY_PREFIX}{id}"),
            Quaternion { x, y, z, w },
        );
    }
    sensors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_snapshot(address: &str, name: &str, sensors: &[(u8, Quaternion)]) -> DeviceSnapshot {
        DeviceSnapshot {
            address: address.to_string(),
            name: name.to_string(),
            sensors: sensors.iter().copied().collect(),
        }
    }

    fn q(x: f32, y: f32, z: f32, w: f32) -> Quaternion {
        Quaternion { x, y, z, w }
    }

    // ── Formatting ────────────────────────────────────────────────────────────

    #[test]
    fn formats_header_and_sensor_lines() {
        let snapshot = make_snapshot(
            "00:18:80:72:47:91",
            "NU7-L",
            &[
                (1, q(0.1234, -0.5678, 0.0001, 0.9999)),
                (2, q(0.0, 0.0, 0.0, 1.0)),
            ],
        );
        let frame = format_frame(vec![snapshot]);
        assert_eq!(
            frame,
            "Data from 00:18:80:72:47:91 (NU7-L):\n\
             IMU1 qx = 0.1234 qy = -0.5678 qz = 0.0001 qw = 0.9999\n\
             IMU2 qx = 0.0000 qy = 0.0000 qz = 0.0000 qw = 1.0000\n"
        );
    }

    #[test]
    fn formats_devices_sorted_by_address() {
        let later = make_snapshot("00:18:80:AF:58:63", "NU7-R", &[(1, q(0.0, 0.0, 0.0, 1.0))]);
        let earlier = make_snapshot("00:18:80:72:47:91", "NU7-L", &[(1, q(0.0, 0.0, 0.0, 1.0))]);

        let frame = format_frame(vec![later, earlier]);
        let first = frame.find("00:18:80:72:47:91").unwrap();
        let second = frame.find("00:18:80:AF:58:63").unwrap();
        assert!(first < second);
    }

    #[test]
    fn formats_empty_input_as_empty_frame() {
        assert_eq!(format_frame(Vec::new()), "");
    }

    #[test]
    fn formats_device_without_samples_as_header_only() {
        let snapshot = make_snapshot("AA:BB", "NU7-X", &[]);
        assert_eq!(format_frame(vec![snapshot]), "Data from AA:BB (NU7-X):\n");
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn parses_sensor_line() {
        let sensors = parse_frame("IMU1 qx = 0.5000 qy = -0.2500 qz = 0.0000 qw = 1.0000");
        assert_eq!(sensors.len(), 1);
        let q = sensors["IMU1"];
        assert!((q.x - 0.5).abs() < f32::EPSILON);
        assert!((q.y + 0.25).abs() < f32::EPSILON);
        assert!((q.w - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_skips_headers_and_junk_lines() {
        let frame = "Data from 00:18:80:72:47:91 (NU7-L):\n\
                     IMU1 qx = 0.1000 qy = 0.2000 qz = 0.3000 qw = 0.4000\n\
                     some unrelated chatter\n\
                     Data from 00:18:80:AF:58:63 (NU7-R):\n\
                     IMU2 qx = 0.5000 qy = 0.6000 qz = 0.7000 qw = 0.8000\n";
        let sensors = parse_frame(frame);
        assert_eq!(
            sensors.keys().collect::<Vec<_>>(),
            vec!["IMU1", "IMU2"]
        );
    }

    #[test]
    fn parse_later_duplicate_id_wins() {
        let frame = "IMU1 qx = 0.0000 qy = 0.0000 qz = 0.0000 qw = 0.1000\n\
                     IMU1 qx = 0.0000 qy = 0.0000 qz = 0.0000 qw = 0.9000\n";
        let sensors = parse_frame(frame);
        assert_eq!(sensors.len(), 1);
        assert!((sensors["IMU1"].w - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_tolerates_flexible_spacing() {
        let sensors = parse_frame("IMU 4 qx=0.5 qy =0.5 qz= 0.5 qw  =  0.5");
        assert!((sensors["IMU4"].x - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_accepts_exponent_notation() {
        let sensors = parse_frame("IMU6 qx = 1e-1 qy = -2.5E-2 qz = 0 qw = 1");
        let q = sensors["IMU6"];
        assert!((q.x - 0.1).abs() < 1e-6);
        assert!((q.y + 0.025).abs() < 1e-6);
    }

    #[test]
    fn parse_skips_unparseable_float_atoms() {
        let sensors = parse_frame("IMU5 qx = .-. qy = 0 qz = 0 qw = 0");
        assert!(sensors.is_empty());
    }

    #[test]
    fn parse_non_matching_text_yields_empty_map() {
        assert!(parse_frame("hello world").is_empty());
        assert!(parse_frame("").is_empty());
        assert!(parse_frame("Data from AA:BB (NU7-X):\n").is_empty());
    }

    // ── Round trip ────────────────────────────────────────────────────────────

    #[test]
    fn format_then_parse_preserves_four_decimals() {
        let snapshot = make_snapshot(
            "00:18:80:72:47:91",
            "NU7-L",
            &[(3, q(0.1234, -0.5678, 0.0001, 0.9999))],
        );
        let sensors = parse_frame(&format_frame(vec![snapshot]));

        let got = sensors["IMU3"];
        assert!((got.x - 0.1234).abs() < 1e-4);
        assert!((got.y + 0.5678).abs() < 1e-4);
        assert!((got.z - 0.0001).abs() < 1e-4);
        assert!((got.w - 0.9999).abs() < 1e-4);
    }
}
