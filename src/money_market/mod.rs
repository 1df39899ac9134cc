//! Money Market Adapters
//!
//! Each adapter wraps one external yield source and gives the pool the same
//! accounting contract regardless of how the source represents growth:
//!
//! - **CompoundMarket**: share tokens priced by an exchange rate (WAD)
//! - **AaveMarket**: scaled balances grown by a normalized income index (RAY)
//!
//! ## Contract
//!
//! - `deposit` moves underlying from the pool into the source
//! - `withdraw` redeems approximately the requested underlying (within
//!   [`WITHDRAW_TOLERANCE`]) and returns what was actually realized
//! - `total_value` is rounded down, so it never claims more than can be redeemed
//! - `deposit_amount_for_value` is the smallest deposit that raises
//!   `total_value` by at least the given amount
//! - `income_index` grows with the source's yield; only ratios of it are
//!   meaningful

mod aave;
mod compound;

pub use aave::{AaveMarket, LendingReserve};
pub use compound::{CToken, CompoundMarket};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

use crate::ledger::{Erc20Ledger, TokenError};
use crate::math::MathError;

/// Largest shortfall (in wei) between a requested and a redeemable amount
/// that a withdrawal absorbs by paying out the redeemable amount instead
pub const WITHDRAW_TOLERANCE: U256 = U256::from_limbs([1_000, 0, 0, 0]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    #[error("amount is zero")]
    ZeroAmount,

    #[error("deposit of {0} is too small to mint any shares")]
    DustDeposit(U256),

    #[error("requested {requested} but position is only worth {available}")]
    InsufficientValue { requested: U256, available: U256 },

    #[error("external market has {cash} cash, cannot redeem {requested}")]
    InsufficientLiquidity { requested: U256, cash: U256 },

    #[error("token transfer failed: {0}")]
    Token(#[from] TokenError),

    #[error("market math failed: {0}")]
    Math(#[from] MathError),
}

/// Uniform interface over external yield sources
pub trait MoneyMarket: Clone + Debug {
    /// Human-readable name for logs
    fn name(&self) -> &'static str;

    /// Address that holds the adapter's position
    fn address(&self) -> Address;

    /// Move `amount` of underlying held by `from` into the yield source
    fn deposit(&mut self, ledger: &mut Erc20Ledger, from: Address, amount: U256) -> Result<(), MarketError>;

    /// Redeem approximately `amount` of underlying and deliver it to `to`.
    /// Returns the amount actually delivered.
    fn withdraw(&mut self, ledger: &mut Erc20Ledger, to: Address, amount: U256) -> Result<U256, MarketError>;

    /// Current redeemable value of everything the adapter holds
    fn total_value(&self) -> Result<U256, MarketError>;

    /// Underlying to deposit so the position gains at least `value` after
    /// share rounding
    fn deposit_amount_for_value(&self, value: U256) -> Result<U256, MarketError>;

    /// Monotonic growth index of the yield source
    fn income_index(&self) -> U256;
}

/// Clamp a withdrawal request against the redeemable value
pub(crate) fn clamp_withdrawal(requested: U256, available: U256) -> Result<U256, MarketError> {
    if requested.is_zero() {
        return Err(MarketError::ZeroAmount);
    }
    if requested <= available {
        return Ok(requested);
    }
    if requested - available <= WITHDRAW_TOLERANCE {
        return Ok(available);
    }
    Err(MarketError::InsufficientValue {
        requested,
        available,
    })
}

// ============================================
// MARKET SELECTION
// ============================================

/// Supported yield sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketKind {
    /// Exchange-rate based (cToken style)
    Compound,

    /// Index based (aToken style)
    Aave,
}

impl Default for MarketKind {
    fn default() -> Self {
        MarketKind::Compound
    }
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketKind::Compound => write!(f, "Compound (exchange rate)"),
            MarketKind::Aave => write!(f, "Aave (income index)"),
        }
    }
}

/// Closed set of adapters, chosen once from configuration
#[derive(Debug, Clone)]
pub enum AnyMarket {
    Compound(CompoundMarket),
    Aave(AaveMarket),
}

impl AnyMarket {
    pub fn kind(&self) -> MarketKind {
        match self {
            AnyMarket::Compound(_) => MarketKind::Compound,
            AnyMarket::Aave(_) => MarketKind::Aave,
        }
    }

    /// Simulate the external source growing by `rate` (WAD) of its current index
    pub fn simulate_growth(&mut self, rate: U256) -> Result<(), MarketError> {
        match self {
            AnyMarket::Compound(m) => m.ctoken_mut().grow_exchange_rate(rate),
            AnyMarket::Aave(m) => m.reserve_mut().grow_income(rate),
        }
    }

    /// Address holding the external source's cash
    pub fn cash_address(&self) -> Address {
        match self {
            AnyMarket::Compound(m) => m.ctoken().address,
            AnyMarket::Aave(m) => m.reserve().address,
        }
    }
}

impl MoneyMarket for AnyMarket {
    fn name(&self) -> &'static str {
        match self {
            AnyMarket::Compound(m) => m.name(),
            AnyMarket::Aave(m) => m.name(),
        }
    }

    fn address(&self) -> Address {
        match self {
            AnyMarket::Compound(m) => m.address(),
            AnyMarket::Aave(m) => m.address(),
        }
    }

    fn deposit(&mut self, ledger: &mut Erc20Ledger, from: Address, amount: U256) -> Result<(), MarketError> {
        match self {
            AnyMarket::Compound(m) => m.deposit(ledger, from, amount),
            AnyMarket::Aave(m) => m.deposit(ledger, from, amount),
        }
    }

    fn withdraw(&mut self, ledger: &mut Erc20Ledger, to: Address, amount: U256) -> Result<U256, MarketError> {
        match self {
            AnyMarket::Compound(m) => m.withdraw(ledger, to, amount),
            AnyMarket::Aave(m) => m.withdraw(ledger, to, amount),
        }
    }

    fn total_value(&self) -> Result<U256, MarketError> {
        match self {
            AnyMarket::Compound(m) => m.total_value(),
            AnyMarket::Aave(m) => m.total_value(),
        }
    }

    fn deposit_amount_for_value(&self, value: U256) -> Result<U256, MarketError> {
        match self {
            AnyMarket::Compound(m) => m.deposit_amount_for_value(value),
            AnyMarket::Aave(m) => m.deposit_amount_for_value(value),
        }
    }

    fn income_index(&self) -> U256 {
        match self {
            AnyMarket::Compound(m) => m.income_index(),
            AnyMarket::Aave(m) => m.income_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PRECISION;

    #[test]
    fn test_clamp_withdrawal() {
        let available = U256::from(10_000u64);
        assert_eq!(clamp_withdrawal(U256::from(5u64), available).unwrap(), U256::from(5u64));
        assert_eq!(clamp_withdrawal(available + U256::from(3u64), available).unwrap(), available);
        assert!(matches!(
            clamp_withdrawal(available * U256::from(2u64), available),
            Err(MarketError::InsufficientValue { .. })
        ));
        assert_eq!(clamp_withdrawal(U256::ZERO, available), Err(MarketError::ZeroAmount));
    }

    /// Both adapters must satisfy the same accounting contract
    fn check_contract<M: MoneyMarket>(mut market: M, cash_holder: Address) {
        let pool = Address::repeat_byte(0x77);
        let mut ledger = Erc20Ledger::new("DAI", 18);
        let amount = PRECISION * U256::from(100u64);
        ledger.mint(pool, amount).unwrap();
        // Extra cash in the external source so accrued yield is redeemable
        ledger.mint(cash_holder, amount).unwrap();

        let index_before = market.income_index();
        market.deposit(&mut ledger, pool, amount).unwrap();
        let value = market.total_value().unwrap();
        assert!(value <= amount && amount - value <= WITHDRAW_TOLERANCE);
        assert_eq!(ledger.balance_of(pool), U256::ZERO);

        let withdrawn = market.withdraw(&mut ledger, pool, amount).unwrap();
        assert!(amount - withdrawn <= WITHDRAW_TOLERANCE);
        assert_eq!(ledger.balance_of(pool), withdrawn);
        assert!(market.income_index() >= index_before);
    }

    /// Topping up with `deposit_amount_for_value` and paying out in many small
    /// pieces must not lose more than the tolerance overall
    fn check_no_rounding_leak<M: MoneyMarket>(mut market: M, cash_holder: Address) {
        let pool = Address::repeat_byte(0x77);
        let mut ledger = Erc20Ledger::new("DAI", 18);
        ledger.mint(pool, PRECISION * U256::from(1_000u64)).unwrap();
        ledger.mint(cash_holder, PRECISION).unwrap();

        // Odd amount that is not a whole number of shares
        let value = U256::from(749_999_999_838_789_001u64);
        let amount = market.deposit_amount_for_value(value).unwrap();
        assert!(amount >= value);
        market.deposit(&mut ledger, pool, amount).unwrap();
        assert!(market.total_value().unwrap() >= value);

        let piece = U256::from(7_499_999_998_387_891u64);
        let mut paid = U256::ZERO;
        for _ in 0..100 {
            paid += market.withdraw(&mut ledger, pool, piece).unwrap();
        }
        assert_eq!(paid, piece * U256::from(100u64));
        assert!(market.total_value().unwrap() >= value - paid);
    }

    #[test]
    fn test_adapters_do_not_leak_rounding() {
        let compound = CompoundMarket::new(
            Address::repeat_byte(0xc1),
            CToken::new(Address::repeat_byte(0xc2), U256::from(200_000_000_000_000_000_000_000_000u128)),
        );
        check_no_rounding_leak(compound, Address::repeat_byte(0xc2));

        let mut reserve = LendingReserve::new(Address::repeat_byte(0xa2));
        reserve.grow_income(PRECISION / U256::from(3u64)).unwrap();
        let aave = AaveMarket::new(Address::repeat_byte(0xa1), reserve);
        check_no_rounding_leak(aave, Address::repeat_byte(0xa2));
    }

    #[test]
    fn test_adapters_share_contract() {
        let compound = CompoundMarket::new(
            Address::repeat_byte(0xc1),
            CToken::new(Address::repeat_byte(0xc2), U256::from(200_000_000_000_000_000_000_000_000u128)),
        );
        check_contract(compound, Address::repeat_byte(0xc2));

        let aave = AaveMarket::new(Address::repeat_byte(0xa1), LendingReserve::new(Address::repeat_byte(0xa2)));
        check_contract(aave, Address::repeat_byte(0xa2));
    }

    #[test]
    fn test_any_market_growth() {
        let mut market = AnyMarket::Aave(AaveMarket::new(
            Address::repeat_byte(0xa1),
            LendingReserve::new(Address::repeat_byte(0xa2)),
        ));
        let before = market.income_index();
        market.simulate_growth(PRECISION / U256::from(20u64)).unwrap();
        assert_eq!(market.kind(), MarketKind::Aave);
        assert_eq!(market.income_index(), before + before / U256::from(20u64));
    }
}
