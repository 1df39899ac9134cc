//! Fee Model
//!
//! Pure fee math. The interest fee is captured as a rate on each deposit at
//! issuance, so changing the schedule later never touches existing deposits.
//! Early withdrawals pay a principal penalty scaled by the remaining term.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{self, MathError, PRECISION};

/// Default protocol cut of gross interest (10%)
pub const DEFAULT_INTEREST_FEE: U256 = U256::from_limbs([100_000_000_000_000_000, 0, 0, 0]);

/// Default early withdrawal penalty for a full remaining term (1%)
pub const DEFAULT_EARLY_WITHDRAW_FEE: U256 = U256::from_limbs([10_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeModelError {
    #[error("fee rate {0} exceeds 100%")]
    RateAboveOne(U256),

    #[error("tiered schedule must start at zero interest and be sorted ascending")]
    MalformedTiers,
}

/// One step of a tiered schedule: deposits whose gross interest is at least
/// `min_interest` pay `rate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTier {
    pub min_interest: U256,
    pub rate: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestFee {
    /// Same rate for every deposit
    Flat(U256),

    /// Rate chosen by the deposit's gross interest
    Tiered(Vec<FeeTier>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeModel {
    pub interest_fee: InterestFee,

    /// Penalty rate applied to principal when the full term remains
    pub early_withdraw_fee: U256,

    /// Receives interest fees and early withdrawal penalties
    pub beneficiary: Address,
}

impl FeeModel {
    pub fn new(interest_fee: InterestFee, early_withdraw_fee: U256, beneficiary: Address) -> Self {
        Self {
            interest_fee,
            early_withdraw_fee,
            beneficiary,
        }
    }

    pub fn validate(&self) -> Result<(), FeeModelError> {
        if self.early_withdraw_fee > PRECISION {
            return Err(FeeModelError::RateAboveOne(self.early_withdraw_fee));
        }
        match &self.interest_fee {
            InterestFee::Flat(rate) if *rate > PRECISION => Err(FeeModelError::RateAboveOne(*rate)),
            InterestFee::Flat(_) => Ok(()),
            InterestFee::Tiered(tiers) => {
                let starts_at_zero = tiers.first().map(|t| t.min_interest.is_zero()).unwrap_or(false);
                let sorted = tiers.windows(2).all(|w| w[0].min_interest < w[1].min_interest);
                if !starts_at_zero || !sorted {
                    return Err(FeeModelError::MalformedTiers);
                }
                match tiers.iter().find(|t| t.rate > PRECISION) {
                    Some(tier) => Err(FeeModelError::RateAboveOne(tier.rate)),
                    None => Ok(()),
                }
            }
        }
    }

    /// Fee rate to capture on a new deposit with `gross_interest`
    pub fn interest_fee_rate(&self, gross_interest: U256) -> U256 {
        let rate = match &self.interest_fee {
            InterestFee::Flat(rate) => *rate,
            InterestFee::Tiered(tiers) => tiers
                .iter()
                .take_while(|t| t.min_interest <= gross_interest)
                .last()
                .map(|t| t.rate)
                .unwrap_or(U256::ZERO),
        };
        rate.min(PRECISION)
    }

    /// Split gross interest into `(net, fee)` using the current schedule
    pub fn compute_fee(&self, gross_interest: U256) -> Result<(U256, U256), MathError> {
        let fee = fee_for_rate(gross_interest, self.interest_fee_rate(gross_interest))?;
        Ok((gross_interest - fee, fee))
    }

    /// Principal penalty for leaving early with `time_remaining` of `total_term` seconds left
    pub fn early_withdraw_penalty(
        &self,
        principal: U256,
        time_remaining: u64,
        total_term: u64,
    ) -> Result<U256, MathError> {
        if total_term == 0 || time_remaining == 0 {
            return Ok(U256::ZERO);
        }
        let remaining = time_remaining.min(total_term);
        let full_penalty = math::decmul(principal, self.early_withdraw_fee.min(PRECISION))?;
        let penalty = math::mul_div(full_penalty, U256::from(remaining), U256::from(total_term))?;
        Ok(penalty.min(principal))
    }
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            interest_fee: InterestFee::Flat(DEFAULT_INTEREST_FEE),
            early_withdraw_fee: DEFAULT_EARLY_WITHDRAW_FEE,
            beneficiary: Address::repeat_byte(0xfe),
        }
    }
}

/// Fee owed on `gross_interest` at a captured `rate`. Always `0 <= fee <= gross_interest`.
pub fn fee_for_rate(gross_interest: U256, rate: U256) -> Result<U256, MathError> {
    Ok(math::decmul(gross_interest, rate.min(PRECISION))?.min(gross_interest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn pct(p: u64) -> U256 {
        PRECISION * U256::from(p) / U256::from(100u64)
    }

    #[test]
    fn test_flat_fee_split() {
        let model = FeeModel::default();
        let (net, fee) = model.compute_fee(U256::from(1_000u64)).unwrap();
        assert_eq!(fee, U256::from(100u64));
        assert_eq!(net, U256::from(900u64));
    }

    #[test]
    fn test_tiered_rate_selection() {
        let model = FeeModel::new(
            InterestFee::Tiered(vec![
                FeeTier { min_interest: U256::ZERO, rate: pct(20) },
                FeeTier { min_interest: U256::from(1_000u64), rate: pct(10) },
                FeeTier { min_interest: U256::from(10_000u64), rate: pct(5) },
            ]),
            DEFAULT_EARLY_WITHDRAW_FEE,
            Address::ZERO,
        );
        model.validate().unwrap();

        assert_eq!(model.interest_fee_rate(U256::from(999u64)), pct(20));
        assert_eq!(model.interest_fee_rate(U256::from(1_000u64)), pct(10));
        assert_eq!(model.interest_fee_rate(U256::from(50_000u64)), pct(5));
    }

    #[test]
    fn test_validation() {
        let mut model = FeeModel::default();
        model.interest_fee = InterestFee::Flat(pct(101));
        assert!(matches!(model.validate(), Err(FeeModelError::RateAboveOne(_))));

        model.interest_fee = InterestFee::Tiered(vec![FeeTier {
            min_interest: U256::from(5u64),
            rate: pct(10),
        }]);
        assert_eq!(model.validate(), Err(FeeModelError::MalformedTiers));
    }

    #[test]
    fn test_fee_never_exceeds_interest() {
        let mut rng = StdRng::seed_from_u64(88);
        let model = FeeModel::default();

        for _ in 0..500 {
            let gross = U256::from(rng.gen::<u64>());
            let rate = U256::from(rng.gen_range(0u64..=2_000_000_000_000_000_000));
            let fee = fee_for_rate(gross, rate).unwrap();
            assert!(fee <= gross);

            let (net, fee) = model.compute_fee(gross).unwrap();
            assert_eq!(net + fee, gross);
        }
    }

    #[test]
    fn test_early_penalty_scales_with_remaining_term() {
        let model = FeeModel::default();
        let principal = PRECISION;
        let year = 31_556_952u64;

        let full = model.early_withdraw_penalty(principal, year, year).unwrap();
        let half = model.early_withdraw_penalty(principal, year / 2, year).unwrap();
        let none = model.early_withdraw_penalty(principal, 0, year).unwrap();

        assert_eq!(full, pct(1));
        assert_eq!(half, pct(1) / U256::from(2u64));
        assert_eq!(none, U256::ZERO);
        assert!(full <= principal);
    }
}
