//! Aave-style market (index based)
//!
//! Balances are stored scaled by the reserve's normalized income (RAY):
//! `scaled = amount * RAY / income`, `balance = scaled * income / RAY`.
//! Supplies, balances and withdrawals all round scaled amounts down, so a
//! withdrawal never costs the position more than the amount it delivers.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use tracing::{debug, trace};

use super::{clamp_withdrawal, MarketError, MoneyMarket};
use crate::ledger::Erc20Ledger;
use crate::math::{self, RAY};

// ============================================
// EXTERNAL SOURCE MODEL
// ============================================

/// Lending reserve: scaled aToken balances plus cash at `address`
#[derive(Debug, Clone)]
pub struct LendingReserve {
    pub address: Address,
    normalized_income: U256,
    scaled_balances: HashMap<Address, U256>,
    total_scaled: U256,
}

impl LendingReserve {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            normalized_income: RAY,
            scaled_balances: HashMap::new(),
            total_scaled: U256::ZERO,
        }
    }

    pub fn normalized_income(&self) -> U256 {
        self.normalized_income
    }

    /// Raise the income index by `rate` (WAD fraction) of its current value
    pub fn grow_income(&mut self, rate: U256) -> Result<(), MarketError> {
        let growth = math::decmul(self.normalized_income, rate)?;
        self.normalized_income = math::add(self.normalized_income, growth)?;
        Ok(())
    }

    /// Accrue linear interest at `rate_per_second` (WAD) for `seconds`
    pub fn accrue(&mut self, rate_per_second: U256, seconds: u64) -> Result<(), MarketError> {
        let period_rate = rate_per_second
            .checked_mul(U256::from(seconds))
            .ok_or(math::MathError::Overflow)?;
        self.grow_income(period_rate)
    }

    pub fn scaled_balance_of(&self, account: Address) -> U256 {
        self.scaled_balances.get(&account).copied().unwrap_or_default()
    }

    pub fn total_scaled(&self) -> U256 {
        self.total_scaled
    }

    pub fn balance_of(&self, account: Address) -> Result<U256, MarketError> {
        Ok(math::mul_div(self.scaled_balance_of(account), self.normalized_income, RAY)?)
    }

    pub fn supply(&mut self, ledger: &mut Erc20Ledger, from: Address, amount: U256) -> Result<U256, MarketError> {
        let scaled = math::mul_div(amount, RAY, self.normalized_income)?;
        if scaled.is_zero() {
            return Err(MarketError::DustDeposit(amount));
        }
        ledger.transfer(from, self.address, amount)?;
        self.total_scaled = math::add(self.total_scaled, scaled)?;
        *self.scaled_balances.entry(from).or_default() += scaled;
        Ok(scaled)
    }

    /// Withdraw `amount` of `account`'s balance and send it to `to`
    pub fn withdraw(
        &mut self,
        ledger: &mut Erc20Ledger,
        account: Address,
        to: Address,
        amount: U256,
    ) -> Result<U256, MarketError> {
        let scaled_balance = self.scaled_balance_of(account);
        let scaled = math::mul_div(amount, RAY, self.normalized_income)?;
        if scaled > scaled_balance {
            return Err(MarketError::InsufficientValue {
                requested: amount,
                available: math::mul_div(scaled_balance, self.normalized_income, RAY)?,
            });
        }

        let cash = ledger.balance_of(self.address);
        if cash < amount {
            return Err(MarketError::InsufficientLiquidity {
                requested: amount,
                cash,
            });
        }

        ledger.transfer(self.address, to, amount)?;
        self.scaled_balances.insert(account, scaled_balance - scaled);
        self.total_scaled = math::sub(self.total_scaled, scaled)?;
        Ok(scaled)
    }
}

// ============================================
// ADAPTER
// ============================================

#[derive(Debug, Clone)]
pub struct AaveMarket {
    address: Address,
    reserve: LendingReserve,
}

impl AaveMarket {
    pub fn new(address: Address, reserve: LendingReserve) -> Self {
        Self { address, reserve }
    }

    pub fn reserve(&self) -> &LendingReserve {
        &self.reserve
    }

    pub fn reserve_mut(&mut self) -> &mut LendingReserve {
        &mut self.reserve
    }
}

impl MoneyMarket for AaveMarket {
    fn name(&self) -> &'static str {
        "Aave"
    }

    fn address(&self) -> Address {
        self.address
    }

    fn deposit(&mut self, ledger: &mut Erc20Ledger, from: Address, amount: U256) -> Result<(), MarketError> {
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        ledger.transfer(from, self.address, amount)?;
        let scaled = self.reserve.supply(ledger, self.address, amount)?;
        trace!("Aave: supplied {} ({} scaled)", amount, scaled);
        Ok(())
    }

    fn withdraw(&mut self, ledger: &mut Erc20Ledger, to: Address, amount: U256) -> Result<U256, MarketError> {
        let amount = clamp_withdrawal(amount, self.total_value()?)?;
        let scaled = self.reserve.withdraw(ledger, self.address, to, amount)?;
        debug!("Aave: withdrew {} underlying ({} scaled burned)", amount, scaled);
        Ok(amount)
    }

    fn total_value(&self) -> Result<U256, MarketError> {
        self.reserve.balance_of(self.address)
    }

    fn deposit_amount_for_value(&self, value: U256) -> Result<U256, MarketError> {
        let income = self.reserve.normalized_income();
        let scaled = math::mul_div_up(value, RAY, income)?;
        Ok(math::mul_div_up(scaled, income, RAY)?)
    }

    fn income_index(&self) -> U256 {
        self.reserve.normalized_income()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{PRECISION, YEAR_IN_SECONDS};

    fn setup() -> (AaveMarket, Erc20Ledger, Address) {
        let pool = Address::repeat_byte(0x77);
        let market = AaveMarket::new(Address::repeat_byte(0xa1), LendingReserve::new(Address::repeat_byte(0xa2)));
        let mut ledger = Erc20Ledger::new("USDC", 18);
        ledger.mint(pool, PRECISION * U256::from(1_000u64)).unwrap();
        (market, ledger, pool)
    }

    #[test]
    fn test_accrual_grows_balance() {
        let (mut market, mut ledger, pool) = setup();
        market.deposit(&mut ledger, pool, PRECISION * U256::from(100u64)).unwrap();

        // 10% APY for half a year, linear
        let rate = math::apy_to_rate_per_second(0.1);
        market.reserve_mut().accrue(rate, YEAR_IN_SECONDS / 2).unwrap();

        let value = market.total_value().unwrap();
        let expected = PRECISION * U256::from(105u64);
        let diff = if value > expected { value - expected } else { expected - value };
        assert!(diff < PRECISION / U256::from(1_000_000u64), "value {} vs {}", value, expected);
        assert!(market.income_index() > RAY);
    }

    #[test]
    fn test_withdraw_realizes_value() {
        let (mut market, mut ledger, pool) = setup();
        let reserve_cash = market.reserve().address;
        ledger.mint(reserve_cash, PRECISION * U256::from(10u64)).unwrap();

        market.deposit(&mut ledger, pool, PRECISION * U256::from(100u64)).unwrap();
        market.reserve_mut().grow_income(PRECISION / U256::from(10u64)).unwrap();

        let value = market.total_value().unwrap();
        let out = market.withdraw(&mut ledger, pool, value).unwrap();
        assert_eq!(out, value);
        assert!(market.total_value().unwrap() <= U256::from(1u64));
        assert_eq!(ledger.balance_of(pool), PRECISION * U256::from(900u64) + value);
    }
}
