//! Compound-style market (exchange-rate based)
//!
//! Deposits mint cTokens at `amount * 1e18 / exchange_rate`; a position is
//! worth `shares * exchange_rate / 1e18`. Yield shows up as a rising
//! exchange rate, which doubles as the income index.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use tracing::{debug, trace};

use super::{clamp_withdrawal, MarketError, MoneyMarket};
use crate::ledger::Erc20Ledger;
use crate::math::{self, PRECISION};

// ============================================
// EXTERNAL SOURCE MODEL
// ============================================

/// cToken: share ledger plus cash held at `address` on the underlying ledger
#[derive(Debug, Clone)]
pub struct CToken {
    pub address: Address,
    exchange_rate: U256,
    total_supply: U256,
    balances: HashMap<Address, U256>,
}

impl CToken {
    pub fn new(address: Address, initial_exchange_rate: U256) -> Self {
        Self {
            address,
            exchange_rate: initial_exchange_rate,
            total_supply: U256::ZERO,
            balances: HashMap::new(),
        }
    }

    pub fn exchange_rate_stored(&self) -> U256 {
        self.exchange_rate
    }

    /// Simulate interest accrual (or a loss) by moving the exchange rate
    pub fn set_exchange_rate(&mut self, rate: U256) {
        self.exchange_rate = rate;
    }

    /// Raise the exchange rate by `rate` (WAD fraction) of its current value
    pub fn grow_exchange_rate(&mut self, rate: U256) -> Result<(), MarketError> {
        let growth = math::decmul(self.exchange_rate, rate)?;
        self.exchange_rate = math::add(self.exchange_rate, growth)?;
        Ok(())
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    /// Underlying value of `account`'s shares, rounded down
    pub fn balance_of_underlying(&self, account: Address) -> Result<U256, MarketError> {
        Ok(math::mul_div(self.balance_of(account), self.exchange_rate, PRECISION)?)
    }

    /// Supply `amount` of underlying from `minter`; returns shares minted
    pub fn mint(&mut self, ledger: &mut Erc20Ledger, minter: Address, amount: U256) -> Result<U256, MarketError> {
        let shares = math::mul_div(amount, PRECISION, self.exchange_rate)?;
        if shares.is_zero() {
            return Err(MarketError::DustDeposit(amount));
        }
        ledger.transfer(minter, self.address, amount)?;
        self.total_supply = math::add(self.total_supply, shares)?;
        *self.balances.entry(minter).or_default() += shares;
        Ok(shares)
    }

    /// Redeem exactly `amount` of underlying for `redeemer`. Shares burned are
    /// `amount / exchange_rate` truncated, like cToken `redeemUnderlying`.
    pub fn redeem_underlying(
        &mut self,
        ledger: &mut Erc20Ledger,
        redeemer: Address,
        amount: U256,
    ) -> Result<U256, MarketError> {
        let balance = self.balance_of(redeemer);
        let shares = math::mul_div(amount, PRECISION, self.exchange_rate)?;
        if shares > balance {
            return Err(MarketError::InsufficientValue {
                requested: amount,
                available: math::mul_div(balance, self.exchange_rate, PRECISION)?,
            });
        }

        let cash = ledger.balance_of(self.address);
        if cash < amount {
            return Err(MarketError::InsufficientLiquidity {
                requested: amount,
                cash,
            });
        }

        ledger.transfer(self.address, redeemer, amount)?;
        self.balances.insert(redeemer, balance - shares);
        self.total_supply = math::sub(self.total_supply, shares)?;
        Ok(shares)
    }
}

// ============================================
// ADAPTER
// ============================================

#[derive(Debug, Clone)]
pub struct CompoundMarket {
    address: Address,
    ctoken: CToken,
}

impl CompoundMarket {
    pub fn new(address: Address, ctoken: CToken) -> Self {
        Self { address, ctoken }
    }

    pub fn ctoken(&self) -> &CToken {
        &self.ctoken
    }

    pub fn ctoken_mut(&mut self) -> &mut CToken {
        &mut self.ctoken
    }
}

impl MoneyMarket for CompoundMarket {
    fn name(&self) -> &'static str {
        "Compound"
    }

    fn address(&self) -> Address {
        self.address
    }

    fn deposit(&mut self, ledger: &mut Erc20Ledger, from: Address, amount: U256) -> Result<(), MarketError> {
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        ledger.transfer(from, self.address, amount)?;
        let shares = self.ctoken.mint(ledger, self.address, amount)?;
        trace!("Compound: supplied {} for {} cTokens", amount, shares);
        Ok(())
    }

    fn withdraw(&mut self, ledger: &mut Erc20Ledger, to: Address, amount: U256) -> Result<U256, MarketError> {
        let amount = clamp_withdrawal(amount, self.total_value()?)?;
        let shares = self.ctoken.redeem_underlying(ledger, self.address, amount)?;
        ledger.transfer(self.address, to, amount)?;
        debug!("Compound: redeemed {} underlying ({} cTokens burned)", amount, shares);
        Ok(amount)
    }

    fn total_value(&self) -> Result<U256, MarketError> {
        self.ctoken.balance_of_underlying(self.address)
    }

    /// Rounds up to whole cTokens
    fn deposit_amount_for_value(&self, value: U256) -> Result<U256, MarketError> {
        let rate = self.ctoken.exchange_rate_stored();
        let shares = math::mul_div_up(value, PRECISION, rate)?;
        Ok(math::mul_div_up(shares, rate, PRECISION)?)
    }

    fn income_index(&self) -> U256 {
        self.ctoken.exchange_rate_stored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 cToken = 0.02 underlying
    const INIT_EXRATE: u128 = 200_000_000_000_000_000_000_000_000;

    fn setup() -> (CompoundMarket, Erc20Ledger, Address) {
        let pool = Address::repeat_byte(0x77);
        let ctoken = CToken::new(Address::repeat_byte(0xc2), U256::from(INIT_EXRATE));
        let market = CompoundMarket::new(Address::repeat_byte(0xc1), ctoken);
        let mut ledger = Erc20Ledger::new("DAI", 18);
        ledger.mint(pool, PRECISION * U256::from(1_000u64)).unwrap();
        (market, ledger, pool)
    }

    #[test]
    fn test_deposit_mints_shares_at_exchange_rate() {
        let (mut market, mut ledger, pool) = setup();
        market.deposit(&mut ledger, pool, PRECISION).unwrap();

        // 1 underlying / 0.02 = 50 cTokens (8 decimals)
        assert_eq!(market.ctoken().balance_of(market.address()), U256::from(5_000_000_000u64));
        assert_eq!(market.total_value().unwrap(), PRECISION);
        assert_eq!(ledger.balance_of(market.ctoken().address), PRECISION);
    }

    #[test]
    fn test_exchange_rate_growth_increases_value() {
        let (mut market, mut ledger, pool) = setup();
        market.deposit(&mut ledger, pool, PRECISION * U256::from(100u64)).unwrap();

        // +5%
        market.ctoken_mut().set_exchange_rate(U256::from(INIT_EXRATE / 100 * 105));
        assert_eq!(market.total_value().unwrap(), PRECISION * U256::from(105u64));
    }

    #[test]
    fn test_withdraw_without_cash_fails() {
        let (mut market, mut ledger, pool) = setup();
        market.deposit(&mut ledger, pool, PRECISION * U256::from(100u64)).unwrap();
        market.ctoken_mut().set_exchange_rate(U256::from(INIT_EXRATE * 2));

        // Position is worth 200 but the cToken only holds 100 cash
        let err = market
            .withdraw(&mut ledger, pool, PRECISION * U256::from(150u64))
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientLiquidity { .. }));
        assert_eq!(market.total_value().unwrap(), PRECISION * U256::from(200u64));
    }

    #[test]
    fn test_withdraw_more_than_value_fails() {
        let (mut market, mut ledger, pool) = setup();
        market.deposit(&mut ledger, pool, PRECISION).unwrap();
        let err = market
            .withdraw(&mut ledger, pool, PRECISION * U256::from(2u64))
            .unwrap_err();
        assert!(matches!(err, MarketError::InsufficientValue { .. }));
    }

    #[test]
    fn test_deposit_amount_for_value_rounds_to_whole_shares() {
        let (mut market, mut ledger, pool) = setup();
        // 0.02 underlying per cToken with 8 decimals: one share is 2e8 wei
        let value = U256::from(749_999_999_838_789_000u64);
        let amount = market.deposit_amount_for_value(value).unwrap();
        assert_eq!(amount, U256::from(750_000_000_000_000_000u64));

        market.deposit(&mut ledger, pool, amount).unwrap();
        assert!(market.total_value().unwrap() >= value);

        // Whole-share values pass through unchanged
        assert_eq!(market.deposit_amount_for_value(PRECISION).unwrap(), PRECISION);
    }

    #[test]
    fn test_redeem_burns_truncated_shares() {
        let (mut market, mut ledger, pool) = setup();
        market.deposit(&mut ledger, pool, PRECISION).unwrap();

        // Half a share's worth burns nothing and costs the position nothing extra
        let before = market.total_value().unwrap();
        market.withdraw(&mut ledger, pool, U256::from(100_000_000u64)).unwrap();
        assert_eq!(market.ctoken().balance_of(market.address()), U256::from(5_000_000_000u64));
        assert!(before - market.total_value().unwrap() <= U256::from(100_000_000u64));
    }

    #[test]
    fn test_dust_deposit_rejected() {
        let (mut market, mut ledger, pool) = setup();
        let err = market.deposit(&mut ledger, pool, U256::from(1u64)).unwrap_err();
        assert!(matches!(err, MarketError::DustDeposit(_)));
    }
}
