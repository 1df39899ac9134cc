//! Interest Rate Oracle
//!
//! Exponential moving average of the money market's per-second yield,
//! sampled from its income index. The pool multiplies this average by the
//! UIR multiplier to price guaranteed interest, so a single spike in the
//! floating rate cannot inflate what new depositors are promised.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::math::{self, MathError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleParams {
    /// Minimum seconds between EMA updates
    pub update_interval: u64,

    /// EMA smoothing factor (2 = standard EMA)
    pub smoothing_factor: u64,

    /// Averaging window, in update intervals
    pub average_window_in_intervals: u64,

    /// Starting per-second rate (WAD)
    pub initial_rate_per_second: U256,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            update_interval: 24 * 60 * 60,
            smoothing_factor: 2,
            average_window_in_intervals: 30,
            initial_rate_per_second: math::apy_to_rate_per_second(0.1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmaOracle {
    params: OracleParams,
    ema_stored: U256,
    last_income_index: U256,
    last_update_timestamp: u64,
}

impl EmaOracle {
    pub fn new(params: OracleParams, income_index: U256, now: u64) -> Self {
        Self {
            ema_stored: params.initial_rate_per_second,
            params,
            last_income_index: income_index,
            last_update_timestamp: now,
        }
    }

    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    /// Current average without sampling
    pub fn query(&self) -> U256 {
        self.ema_stored
    }

    pub fn last_update_timestamp(&self) -> u64 {
        self.last_update_timestamp
    }

    /// Fold in a new income index sample (at most once per update interval)
    /// and return the average per-second rate
    pub fn update_and_query(&mut self, now: u64, income_index: U256) -> Result<U256, MathError> {
        let elapsed = now.saturating_sub(self.last_update_timestamp);
        if elapsed < self.params.update_interval || elapsed == 0 {
            return Ok(self.ema_stored);
        }
        if self.last_income_index.is_zero() {
            // Market had no index yet; start sampling from here
            self.last_income_index = income_index;
            self.last_update_timestamp = now;
            return Ok(self.ema_stored);
        }

        // A falling index (market loss) contributes a zero rate
        let growth = income_index.saturating_sub(self.last_income_index);
        let incoming = math::decdiv(growth, self.last_income_index)? / U256::from(elapsed);

        let window = U256::from(self.params.average_window_in_intervals + 1);
        let smoothing = U256::from(self.params.smoothing_factor).min(window);
        let weighted_new = incoming.checked_mul(smoothing).ok_or(MathError::Overflow)?;
        let weighted_old = self
            .ema_stored
            .checked_mul(window - smoothing)
            .ok_or(MathError::Overflow)?;
        let value = math::add(weighted_new, weighted_old)? / window;

        debug!(
            "EMA oracle update: incoming={} previous={} new={} (elapsed {}s)",
            incoming, self.ema_stored, value, elapsed
        );

        self.ema_stored = value;
        self.last_income_index = income_index;
        self.last_update_timestamp = now;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PRECISION;

    const DAY: u64 = 24 * 60 * 60;

    #[test]
    fn test_no_update_within_interval() {
        let params = OracleParams::default();
        let initial = params.initial_rate_per_second;
        let mut oracle = EmaOracle::new(params, PRECISION, 0);

        let rate = oracle.update_and_query(DAY - 1, PRECISION * U256::from(2u64)).unwrap();
        assert_eq!(rate, initial);
        assert_eq!(oracle.last_update_timestamp(), 0);
    }

    #[test]
    fn test_converges_to_observed_rate() {
        let params = OracleParams {
            initial_rate_per_second: U256::ZERO,
            ..OracleParams::default()
        };
        let mut oracle = EmaOracle::new(params, PRECISION, 0);

        // Index grows 0.1% per day
        let daily_growth = PRECISION / U256::from(1000u64);
        let observed = daily_growth / U256::from(DAY);
        let mut index = PRECISION;
        let mut now = 0;
        let mut last = U256::ZERO;
        for _ in 0..200 {
            now += DAY;
            index = index + math::decmul(index, daily_growth).unwrap();
            let rate = oracle.update_and_query(now, index).unwrap();
            assert!(rate >= last, "EMA should rise monotonically toward the observed rate");
            last = rate;
        }

        let diff = if last > observed { last - observed } else { observed - last };
        assert!(diff * U256::from(100u64) < observed, "EMA {} far from observed {}", last, observed);
    }

    #[test]
    fn test_falling_index_counts_as_zero() {
        let params = OracleParams::default();
        let initial = params.initial_rate_per_second;
        let mut oracle = EmaOracle::new(params, PRECISION, 0);

        let rate = oracle.update_and_query(DAY, PRECISION / U256::from(2u64)).unwrap();
        assert!(rate < initial);
        assert_eq!(rate, initial * U256::from(29u64) / U256::from(31u64));
    }
}
