use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::fee_model::FeeModelError;
use crate::ledger::TokenError;
use crate::math::MathError;
use crate::money_market::MarketError;
use crate::registry::RegistryError;

/// Every way a pool operation can be rejected. A rejected operation leaves
/// the pool exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("term of {period}s is shorter than the minimum {minimum}s")]
    TermTooShort { period: u64, minimum: u64 },

    #[error("term of {period}s is longer than the maximum {maximum}s")]
    TermTooLong { period: u64, maximum: u64 },

    #[error("deposit #{id} matures at {maturation_timestamp}, now is {now}")]
    NotMatured {
        id: u64,
        maturation_timestamp: u64,
        now: u64,
    },

    #[error("deposit #{0} has matured, withdraw it without penalty")]
    DepositMatured(u64),

    #[error("{caller} does not hold and is not approved for {registry} receipt #{id}")]
    NotOwner {
        registry: &'static str,
        id: u64,
        caller: Address,
    },

    #[error("no deficit to fund")]
    NoDeficit,

    #[error("money market failure: {0}")]
    ExternalMarketFailure(#[from] MarketError),

    #[error("batch length mismatch: {left} entries vs {right} entries")]
    BatchLengthMismatch { left: usize, right: usize },

    #[error("deposit #{0} does not exist")]
    InvalidDepositId(u64),

    #[error("funding #{0} does not exist")]
    InvalidFundingId(u64),

    #[error("deposit #{0} is already withdrawn")]
    AlreadyWithdrawn(u64),

    #[error("deposit #{0} is already funded")]
    AlreadyFunded(u64),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(#[from] TokenError),

    #[error("receipt error: {0}")]
    Registry(#[from] RegistryError),

    #[error("math error: {0}")]
    Math(#[from] MathError),

    #[error("invalid pool parameters: {0}")]
    InvalidParams(String),
}

impl From<FeeModelError> for PoolError {
    fn from(err: FeeModelError) -> Self {
        PoolError::InvalidParams(err.to_string())
    }
}

impl PoolError {
    pub(crate) fn amount(reason: &str, amount: U256) -> Self {
        PoolError::InvalidAmount(format!("{} ({})", reason, amount))
    }
}
