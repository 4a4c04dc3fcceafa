//! Synthetic telemetry feeds for the simulated radio.
//!
//! Each allow-listed address gets a background task that pushes one
//! notification per tick whenever a session is subscribed.  Payloads carry
//! one record per sub-sensor, sweeping a slow rotation about the z axis so
//! downstream viewers show motion instead of a frozen pose.

use std::time::Duration;

use imulink_device::SimRadio;
use imulink_wire::{QUAT_SCALE, RECORD_LEN};

/// Pace of the synthetic notifications.
const FEED_INTERVAL: Duration = Duration::from_millis(250);

/// Sub-sensor ids carried in every synthetic notification.
const SUB_SENSORS: [u8; 3] = [1, 2, 3];

/// Radians swept per tick.
const STEP_ANGLE: f32 = 0.05;

/// Angular spread between the sub-sensors of one device.
const LANE_OFFSET: f32 = 0.7;

/// Spawn one feed task per address.  Tasks live for the rest of the process
/// and idle while nothing is subscribed.
pub fn spawn_feeds(radio: &SimRadio, addresses: &[String]) {
    for (seat, address) in addresses.iter().enumerate() {
        tokio::spawn(run_feed(radio.clone(), address.clone(), seat as f32));
    }
}

async fn run_feed(radio: SimRadio, address: String, phase: f32) {
    let mut step: u32 = 0;
    loop {
        if radio.has_subscriber(&address) {
            radio.push_notification(&address, notification_at(step, phase));
            step = step.wrapping_add(1);
        }
        tokio::time::sleep(FEED_INTERVAL).await;
    }
}

/// One payload: a record per sub-sensor, each a unit quaternion rotated
/// about z by a per-lane angle.
fn notification_at(step: u32, phase: f32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(SUB_SENSORS.len() * RECORD_LEN);
    for (lane, id) in SUB_SENSORS.iter().enumerate() {
        let angle = step as f32 * STEP_ANGLE + phase + lane as f32 * LANE_OFFSET;
        let (sin, cos) = (angle / 2.0).sin_cos();
        payload.extend_from_slice(&encode_record(*id, 0.0, 0.0, sin, cos));
    }
    payload
}

/// Encode one record the way the wearable firmware does: sub-sensor id
/// followed by four scaled little-endian `i16` components.
fn encode_record(id: u8, x: f32, y: f32, z: f32, w: f32) -> [u8; RECORD_LEN] {
    let mut record = [0u8; RECORD_LEN];
    record[0] = id;
    for (slot, value) in [x, y, z, w].into_iter().enumerate() {
        let raw = (value / QUAT_SCALE) as i16;
        record[1 + slot * 2..3 + slot * 2].copy_from_slice(&raw.to_le_bytes());
    }
    record
}
