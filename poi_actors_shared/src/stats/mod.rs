// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! One-sided binomial test for downtime punishment decisions.

pub use self::tables::{CriticalTable, CRITICAL_TABLES, MAX_TABLED_TOTAL};

mod tables;

use num_bigint::BigInt;

use crate::math::Decimal;
use crate::{actor_error, ActorError};

/// Significance level of the downtime test.
const ALPHA: f64 = 0.05;

/// Decides whether an observed miss count is statistically acceptable under
/// the null hypothesis that requests are missed at rate `p0`.
///
/// Supported permille rates take the precomputed critical-value tables (a
/// binary search per call); any other rate falls back to the exact
/// upper-tail binomial p-value. Errors only on malformed counts.
pub fn missed_requests_acceptable(
    missed: i64,
    total: i64,
    p0: &Decimal,
) -> Result<bool, ActorError> {
    if total == 0 {
        return Ok(true);
    }
    if missed < 0 || total < 0 || missed > total {
        return Err(actor_error!(
            illegal_argument,
            "invalid miss counts: {} of {}",
            missed,
            total
        ));
    }

    if let Some(table) = p0
        .as_integer_scaled(3)
        .and_then(|permille| u64::try_from(permille).ok())
        .and_then(lookup_table)
    {
        let missed = missed as u64;
        let total = total as u64;
        if total > MAX_TABLED_TOTAL {
            return Ok(large_n_acceptable(missed, total, table.permille));
        }
        return Ok(missed <= critical_value(table, total));
    }

    let p = p0.to_f64();
    if p <= 0.0 {
        return Ok(missed == 0);
    }
    if p >= 1.0 {
        return Ok(true);
    }
    Ok(upper_tail_p_value(missed as u64, total as u64, p) >= ALPHA)
}

fn lookup_table(permille: u64) -> Option<&'static CriticalTable> {
    CRITICAL_TABLES.iter().find(|t| t.permille == permille)
}

/// Largest tabled critical value for `total`, or the unconditional 1 when
/// `total` falls below the smallest tabled n.
fn critical_value(table: &CriticalTable, total: u64) -> u64 {
    let idx = table.entries.partition_point(|&(n, _)| n <= total);
    if idx == 0 {
        return 1;
    }
    table.entries[idx - 1].1
}

/// Linear acceptance rule beyond the tabled range:
/// `missed * 1000 <= total * permille`, compared overflow-safe.
fn large_n_acceptable(missed: u64, total: u64, permille: u64) -> bool {
    BigInt::from(missed) * 1000u32 <= BigInt::from(total) * permille
}

/// Exact upper-tail binomial probability `P(X >= k)` for `X ~ B(n, p)`.
///
/// The k-th probability mass is accumulated in log space, then the tail is
/// extended term by term with the PMF ratio `((n-i)/(i+1)) * (p/(1-p))`.
fn upper_tail_p_value(k: u64, n: u64, p: f64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    let q = 1.0 - p;

    // ln C(n,k) + k ln p + (n-k) ln q
    let mut log_pmf = (n - k) as f64 * q.ln();
    for j in 1..=k {
        log_pmf += ((n - k + j) as f64).ln() - (j as f64).ln() + p.ln();
    }
    let pmf = log_pmf.exp();

    let ratio_base = p / q;
    let mut term = 1.0;
    let mut series = 1.0;
    for i in k..n {
        term *= (n - i) as f64 / (i + 1) as f64 * ratio_base;
        series += term;
    }
    (pmf * series).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    const P0_DEFAULT: Decimal = Decimal::new(10, -2);

    fn acceptable(missed: i64, total: i64, p0: &Decimal) -> bool {
        missed_requests_acceptable(missed, total, p0).unwrap()
    }

    #[test]
    fn zero_total_is_always_acceptable() {
        assert!(acceptable(0, 0, &P0_DEFAULT));
    }

    #[test]
    fn malformed_counts_are_rejected() {
        assert!(missed_requests_acceptable(-1, 10, &P0_DEFAULT).is_err());
        assert!(missed_requests_acceptable(0, -1, &P0_DEFAULT).is_err());
        assert!(missed_requests_acceptable(11, 10, &P0_DEFAULT).is_err());
    }

    #[test]
    fn default_rate_table_boundaries() {
        // (total, largest acceptable missed) under p0 = 0.10.
        for (total, critical) in [(10, 2), (20, 4), (100, 14), (500, 61), (1000, 100)] {
            assert!(acceptable(critical, total, &P0_DEFAULT), "n={}", total);
            assert!(!acceptable(critical + 1, total, &P0_DEFAULT), "n={}", total);
        }
    }

    #[test]
    fn below_table_floor_is_unconditional() {
        // total = 1 has no tabled entry; critical degrades to 1.
        assert!(acceptable(1, 1, &P0_DEFAULT));
        assert!(acceptable(0, 1, &P0_DEFAULT));
    }

    #[test]
    fn large_n_rule_is_overflow_safe() {
        let total = i64::MAX;
        assert!(acceptable(total / 10, total, &P0_DEFAULT));
        assert!(!acceptable(total / 10 + 1, total, &P0_DEFAULT));
    }

    #[test]
    fn half_rate_uses_its_own_table() {
        let p0 = Decimal::new(5, -1);
        assert!(acceptable(7, 10, &p0));
        assert!(!acceptable(8, 10, &p0));
    }

    #[test]
    fn untabled_rate_takes_exact_path() {
        // p0 = 0.25 has no table.
        let p0 = Decimal::new(25, -2);
        // P(X >= 4 | n=4, p=0.25) = 0.0039 < 0.05
        assert!(!acceptable(4, 4, &p0));
        // P(X >= 2 | n=4, p=0.25) = 0.2617
        assert!(acceptable(2, 4, &p0));
        // P(X >= 0) = 1
        assert!(acceptable(0, 4, &p0));
    }

    #[test]
    fn degenerate_rates() {
        assert!(acceptable(0, 10, &Decimal::zero()));
        assert!(!acceptable(1, 10, &Decimal::zero()));
        assert!(acceptable(10, 10, &Decimal::one()));
    }

    #[quickcheck]
    fn acceptance_is_monotone_in_missed(total: u16, boundary: u16) -> bool {
        let total = (total % 1500) as i64;
        if total == 0 {
            return true;
        }
        let boundary = (boundary as i64) % (total + 1);
        // Once the test fails at some count, it fails for every larger one.
        if acceptable(boundary, total, &P0_DEFAULT) {
            (0..boundary).all(|m| acceptable(m, total, &P0_DEFAULT))
        } else {
            (boundary..=total).all(|m| !acceptable(m, total, &P0_DEFAULT))
        }
    }

    #[quickcheck]
    fn tables_agree_with_exact_test_direction(total: u16) -> bool {
        // The tabled critical value stays within one unit of the exact
        // binomial decision for small n (normal-approximation slack).
        let total = 2 + (total % 99) as i64;
        let table = lookup_table(100).unwrap();
        let critical = critical_value(table, total as u64) as i64;
        let p = 0.10;
        // Exact test must accept at the critical value's p-value level for
        // at least critical - 1.
        let relaxed = critical - 1;
        relaxed < 0 || upper_tail_p_value(relaxed as u64, total as u64, p) >= ALPHA
    }
}
