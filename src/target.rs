//! Difficulty arithmetic over 256-bit proof-of-work digests.
//!
//! Digests are interpreted as big-endian 256-bit integers and normalized
//! into a difficulty scale relative to a fixed unit target: higher
//! difficulty means a rarer digest. Comparisons against a job's block
//! acceptance target stay in exact 256-bit integer space; only the final
//! per-share difficulty is projected to `f64`.

use core::fmt::Write;
use primitive_types::U256;

// Difficulty-1 target, big endian:
// 0x00000000ffff0000000000000000000000000000000000000000000000000000
const UNIT_TARGET_BYTES: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

// Fixed-point scale applied before the integer division so sub-unit
// difficulties survive the projection to f64.
const DIFFICULTY_SCALE: u64 = 1024;

/// Returns the difficulty-1 unit target that share difficulty is
/// normalized against.
pub fn unit_target() -> U256 {
    U256::from_big_endian(&UNIT_TARGET_BYTES)
}

/// Interprets a proof-of-work digest as a big-endian 256-bit integer.
pub fn digest_to_u256(digest: &[u8; 32]) -> U256 {
    U256::from_big_endian(digest)
}

/// Normalized difficulty of a digest value: `unit_target / digest`,
/// carried out as `unit_target * 1024 / digest` in 256-bit integer space
/// with the final division by 1024 in floating point.
pub fn difficulty(digest_value: U256) -> f64 {
    if digest_value.is_zero() {
        return f64::INFINITY;
    }
    let scaled = unit_target() * U256::from(DIFFICULTY_SCALE) / digest_value;
    u256_to_f64(scaled) / DIFFICULTY_SCALE as f64
}

/// Converts a [`U256`] to `f64` by combining its two 128-bit halves.
pub fn u256_to_f64(value: U256) -> f64 {
    let high = (value >> 128).low_u128() as f64;
    let low = value.low_u128() as f64;
    high * 2.0f64.powi(128) + low
}

/// Formats bytes as a lowercase hex string.
///
/// Useful for visualizing digests and targets in logs.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        write!(&mut s, "{b:02x}")
            .expect("Writing hex bytes to pre-allocated string should never fail");
    }
    s
}
