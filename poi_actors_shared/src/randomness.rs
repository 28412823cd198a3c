// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use sha2::{Digest, Sha256};

use crate::math::Decimal;

/// Mantissa scale of a unit-interval draw: 18 fractional digits.
const UNIT_SCALE: u128 = 1_000_000_000_000_000_000;

/// Deterministic draw from [0, 1), identical on every replica.
///
/// The byte sequence `base10(seed) ':' identifier` (signed seeds keep the
/// `-` prefix) is hashed with SHA-256; the first 8 bytes, read big-endian,
/// divided by 2^64 give the draw. The exact byte encoding is part of the
/// consensus contract and must not change.
pub fn deterministic_unit(seed: i64, identifier: &str) -> Decimal {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(identifier.as_bytes());
    let digest = hasher.finalize();

    let draw = first_8_bytes_be(&digest);
    // Floor of draw * 10^18 / 2^64, integer-exact.
    let value = ((draw as u128 * UNIT_SCALE) >> 64) as i64;
    Decimal::new(value, -18)
}

/// First 8 bytes of a 32-byte digest as a big-endian u64.
pub(crate) fn first_8_bytes_be(digest: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(word)
}
