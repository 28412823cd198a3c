// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::decay::decay;
pub use self::decimal::Decimal;

mod decay;
mod decimal;

use crate::{actor_error, ActorError};

/// Full 128-bit product of two unsigned 64-bit integers, split into
/// high and low words.
pub fn mul_u64(a: u64, b: u64) -> (u64, u64) {
    let wide = (a as u128) * (b as u128);
    ((wide >> 64) as u64, wide as u64)
}

/// Sum of two unsigned 64-bit integers with carry.
pub fn add_u64(a: u64, b: u64) -> (u64, bool) {
    a.overflowing_add(b)
}

/// Adds two token counts, failing when the sum carries out of 64 bits.
pub fn checked_token_add(a: u64, b: u64) -> Result<u64, ActorError> {
    let (sum, carry) = add_u64(a, b);
    if carry {
        return Err(actor_error!(
            token_count_out_of_range,
            "token count addition overflow: {} + {}",
            a,
            b
        ));
    }
    Ok(sum)
}

/// Multiplies a token count by a price, failing when the product exceeds
/// the signed 64-bit coin range.
pub fn checked_coin_mul(tokens: u64, price: u64) -> Result<i64, ActorError> {
    let (hi, lo) = mul_u64(tokens, price);
    if hi != 0 || lo > i64::MAX as u64 {
        return Err(actor_error!(
            arithmetic_overflow,
            "coin amount overflow: {} * {}",
            tokens,
            price
        ));
    }
    Ok(lo as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_u64_splits_product() {
        assert_eq!(mul_u64(0, u64::MAX), (0, 0));
        assert_eq!(mul_u64(1, u64::MAX), (0, u64::MAX));
        assert_eq!(mul_u64(u64::MAX, u64::MAX), (u64::MAX - 1, 1));
        assert_eq!(mul_u64(1 << 32, 1 << 32), (1, 0));
    }

    #[test]
    fn add_u64_carries() {
        assert_eq!(add_u64(u64::MAX, 1), (0, true));
        assert_eq!(add_u64(u64::MAX - 1, 1), (u64::MAX, false));
    }

    #[test]
    fn coin_mul_rejects_products_beyond_int64() {
        assert_eq!(checked_coin_mul(5_000, 1_000).unwrap(), 5_000_000);
        assert_eq!(checked_coin_mul(i64::MAX as u64, 1).unwrap(), i64::MAX);
        assert!(checked_coin_mul(i64::MAX as u64 + 1, 1).is_err());
        assert!(checked_coin_mul(u64::MAX, 2).is_err());
    }

    #[test]
    fn token_add_rejects_carry() {
        assert_eq!(checked_token_add(3, 4).unwrap(), 7);
        assert!(checked_token_add(u64::MAX, 1).is_err());
    }
}
