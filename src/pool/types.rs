//! Pool data model: parameters, deposits, fundings, surplus

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use super::PoolError;
use crate::math::{self, MathError, PRECISION};

// ============================================
// PARAMETERS
// ============================================

/// Immutable pool configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    /// Fraction (< 1, WAD) of the average market rate promised to depositors
    pub uir_multiplier: U256,

    /// Shortest allowed lock, in seconds
    pub min_deposit_period: u64,

    /// Longest allowed lock, in seconds
    pub max_deposit_period: u64,

    /// Smallest deposit accepted (never zero)
    pub min_deposit_amount: U256,

    /// Per-transaction deposit cap
    pub max_deposit_amount: U256,
}

impl PoolParams {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.uir_multiplier.is_zero() || self.uir_multiplier >= PRECISION {
            return Err(PoolError::InvalidParams(format!(
                "uir_multiplier must be in (0, 1), got {}",
                math::to_decimal(self.uir_multiplier, 18)
            )));
        }
        if self.min_deposit_amount.is_zero() {
            return Err(PoolError::InvalidParams(
                "min_deposit_amount must be positive".to_string(),
            ));
        }
        if self.min_deposit_amount > self.max_deposit_amount {
            return Err(PoolError::InvalidParams(
                "min_deposit_amount exceeds max_deposit_amount".to_string(),
            ));
        }
        if self.min_deposit_period == 0 || self.min_deposit_period > self.max_deposit_period {
            return Err(PoolError::InvalidParams(format!(
                "deposit period range [{}, {}] is empty",
                self.min_deposit_period, self.max_deposit_period
            )));
        }
        Ok(())
    }
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            uir_multiplier: PRECISION * U256::from(3u64) / U256::from(4u64),
            min_deposit_period: 90 * 24 * 60 * 60,
            max_deposit_period: 10 * math::YEAR_IN_SECONDS,
            min_deposit_amount: PRECISION / U256::from(100u64),
            max_deposit_amount: PRECISION * U256::from(1_000u64),
        }
    }
}

// ============================================
// DEPOSIT
// ============================================

/// Lifecycle position of a deposit at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositStatus {
    Immature,
    Mature,
    Withdrawn { penalized: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: u64,

    /// Remaining principal
    pub amount: U256,

    /// Remaining gross guaranteed interest (fee included)
    pub interest_owed: U256,

    /// Guaranteed interest as a fraction of principal over the whole term
    pub interest_rate: U256,

    /// Fraction of interest kept as protocol fee, captured at issuance
    pub fee_rate: U256,

    pub deposit_timestamp: u64,
    pub maturation_timestamp: u64,

    /// Money market income index when the deposit was made
    pub initial_income_index: U256,

    /// Funding covering this deposit's interest, if any
    pub funding_id: Option<u64>,

    pub active: bool,

    /// Closed through the early (penalized) path
    pub closed_early: bool,
}

impl Deposit {
    /// Principal plus remaining interest, the unit `withdraw` is denominated in
    pub fn virtual_token_total_supply(&self) -> Result<U256, MathError> {
        math::add(self.amount, self.interest_owed)
    }

    pub fn term(&self) -> u64 {
        self.maturation_timestamp - self.deposit_timestamp
    }

    pub fn is_mature(&self, now: u64) -> bool {
        now >= self.maturation_timestamp
    }

    pub fn status(&self, now: u64) -> DepositStatus {
        if !self.active {
            DepositStatus::Withdrawn {
                penalized: self.closed_early,
            }
        } else if self.is_mature(now) {
            DepositStatus::Mature
        } else {
            DepositStatus::Immature
        }
    }
}

// ============================================
// FUNDING
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funding {
    pub id: u64,

    /// Deposits whose interest this funding covers
    pub deposit_ids: Vec<u64>,

    pub creation_timestamp: u64,

    /// Deficit paid in at issuance
    pub initial_principal_covered: U256,

    /// Coverage still attributed to active covered deposits
    pub principal_covered: U256,

    /// Remaining principal of covered deposits; its yield belongs to the funder
    pub funded_deposit_amount: U256,

    /// Income index at the last funder payout
    pub recorded_income_index: U256,

    /// Everything paid to the funding receipt holder so far
    pub recipient_credit: U256,

    /// Every covered deposit has been fully withdrawn
    pub refunded: bool,
}

impl Funding {
    /// Yield earned by the funded principal since the last payout
    pub fn accrued_yield(&self, income_index: U256) -> Result<U256, MathError> {
        if self.funded_deposit_amount.is_zero()
            || self.recorded_income_index.is_zero()
            || income_index <= self.recorded_income_index
        {
            return Ok(U256::ZERO);
        }
        let grown = math::mul_div(self.funded_deposit_amount, income_index, self.recorded_income_index)?;
        math::sub(grown, self.funded_deposit_amount)
    }
}

// ============================================
// SURPLUS
// ============================================

/// Signed difference between what the market holds and what the pool owes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surplus {
    pub is_negative: bool,
    pub amount: U256,
}

impl Surplus {
    pub fn between(value: U256, owed: U256) -> Self {
        if value >= owed {
            Self {
                is_negative: false,
                amount: value - owed,
            }
        } else {
            Self {
                is_negative: true,
                amount: owed - value,
            }
        }
    }

    /// Amount that would need funding (zero when in surplus)
    pub fn deficit(&self) -> U256 {
        if self.is_negative {
            self.amount
        } else {
            U256::ZERO
        }
    }
}

impl std::fmt::Display for Surplus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.is_negative { "-" } else { "+" };
        write!(f, "{}{:.6}", sign, math::to_decimal(self.amount, 18))
    }
}
