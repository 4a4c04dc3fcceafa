//! Binary notification decoding.
//!
//! A notification payload is a concatenation of fixed-size 9-byte records,
//! one per sub-sensor:
//!
//! ```text
//! +----+-------+-------+-------+-------+
//! | id | x i16 | y i16 | z i16 | w i16 |
//! +----+-------+-------+-------+-------+
//! ```
//!
//! Components are little-endian and fixed-point with 16384 counts per unit.
//! The buffer is walked greedily until fewer than [`RECORD_LEN`] bytes
//! remain; a trailing partial record is silently discarded.

use imulink_types::Quaternion;

/// Length in bytes of one sub-sensor record.
pub const RECORD_LEN: usize = 9;

/// Scale applied to each raw `i16` component, exactly `1 / 16384`.
pub const QUAT_SCALE: f32 = 1.0 / 16384.0;

/// Decode a raw notification payload into `(sub_sensor_id, quaternion)`
/// pairs, in record order.
///
/// Returns exactly `data.len() / 9` records. Duplicate ids are all returned;
/// a caller building a map lets later records overwrite earlier ones.
pub fn decode_notification(data: &[u8]) -> Vec<(u8, Quaternion)> {
    let mut records = Vec::with_capacity(data.len() / RECORD_LEN);
    for chunk in data.chunks_exact(RECORD_LEN) {
        let q = Quaternion {
            x: component(chunk, 1),
            y: component(chunk, 3),
            z: component(chunk, 5),
            w: component(chunk, 7),
        };
        records.push((chunk[0], q));
    }
    records
}

fn component(chunk: &[u8], at: usize) -> f32 {
    i16::from_le_bytes([chunk[at], chunk[at + 1]]) as f32 * QUAT_SCALE
}
