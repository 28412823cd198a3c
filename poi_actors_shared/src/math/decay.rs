// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::Decimal;

/// Exponentially decayed (or grown) quantity `initial * exp(rate * epochs)`,
/// floored to an integer.
///
/// The exponential itself runs in float64; the result is sandwiched by
/// integer rounding and non-finite guards, so the function is total and
/// produces identical results on any IEEE-754 platform for the parameter
/// range in use. A missing rate leaves the quantity undecayed.
pub fn decay(initial: u64, rate: Option<&Decimal>, epochs: u64) -> u64 {
    if initial == 0 {
        return 0;
    }
    let rate = match rate {
        Some(rate) => rate,
        None => return initial,
    };
    if epochs == 0 {
        return initial;
    }

    let epochs = i64::try_from(epochs).unwrap_or(i64::MAX);
    let x = rate.mul_int(epochs);
    let factor = x.to_f64().exp();
    if factor.is_nan() || factor.is_infinite() {
        return 0;
    }
    let scaled = initial as f64 * factor;
    if scaled < 1.0 {
        return 0;
    }
    if scaled >= u64::MAX as f64 {
        return u64::MAX;
    }
    scaled.floor() as u64
}
