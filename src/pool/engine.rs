//! Pool state, construction, views and the deposit path

use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Deposit, Funding, PoolError, PoolEvent, PoolParams, Surplus};
use crate::clock::{format_timestamp, Clock};
use crate::fee_model::FeeModel;
use crate::ledger::Erc20Ledger;
use crate::math::{self, MathError};
use crate::money_market::MoneyMarket;
use crate::oracle::{EmaOracle, OracleParams};
use crate::registry::PositionRegistry;

pub const DEPOSIT_RECEIPT: &str = "Deposit";
pub const FUNDING_RECEIPT: &str = "Funding";

// ============================================
// POOL
// ============================================

/// Fixed-rate deposit pool over a single money market.
///
/// The pool exclusively owns the market adapter, the stablecoin ledger, the
/// oracle and both receipt registries. Deposit and funding ids equal their
/// receipt ids and index `deposits` / `fundings` at `id - 1`.
#[derive(Debug, Clone)]
pub struct Pool<M: MoneyMarket> {
    pub(super) address: Address,
    pub(super) params: PoolParams,
    pub(super) market: M,
    pub(super) fee_model: FeeModel,
    pub(super) oracle: EmaOracle,
    pub(super) stablecoin: Erc20Ledger,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) deposit_receipts: PositionRegistry,
    pub(super) funding_receipts: PositionRegistry,
    pub(super) deposits: Vec<Deposit>,
    pub(super) fundings: Vec<Funding>,
    pub(super) total_deposit: U256,
    pub(super) total_interest_owed: U256,
    pub(super) unfunded_deposit_amount: U256,
    pub(super) events: Vec<PoolEvent>,
}

impl<M: MoneyMarket> Pool<M> {
    pub fn new(
        address: Address,
        params: PoolParams,
        market: M,
        fee_model: FeeModel,
        oracle_params: OracleParams,
        stablecoin: Erc20Ledger,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PoolError> {
        if address == Address::ZERO {
            return Err(PoolError::InvalidParams("pool address is zero".to_string()));
        }
        params.validate()?;
        fee_model.validate()?;

        let oracle = EmaOracle::new(oracle_params, market.income_index(), clock.now());
        info!(
            "Pool {} created on {} ({} underlying), multiplier {:.2}",
            address,
            market.name(),
            stablecoin.symbol,
            math::to_decimal(params.uir_multiplier, 18)
        );

        Ok(Self {
            address,
            params,
            market,
            fee_model,
            oracle,
            stablecoin,
            clock,
            deposit_receipts: PositionRegistry::new(DEPOSIT_RECEIPT),
            funding_receipts: PositionRegistry::new(FUNDING_RECEIPT),
            deposits: Vec::new(),
            fundings: Vec::new(),
            total_deposit: U256::ZERO,
            total_interest_owed: U256::ZERO,
            unfunded_deposit_amount: U256::ZERO,
            events: Vec::new(),
        })
    }

    /// Run `apply` on a staged copy of the pool and commit it only on success.
    /// The clock is read once and handed to `apply`.
    pub(super) fn transact<T>(
        &mut self,
        operation: &str,
        apply: impl FnOnce(&mut Self, u64) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let now = self.clock.now();
        let mut staged = self.clone();
        match apply(&mut staged, now) {
            Ok(value) => {
                *self = staged;
                Ok(value)
            }
            Err(e) => {
                warn!("{} rejected: {}", operation, e);
                Err(e)
            }
        }
    }

    // ============================================
    // DEPOSITS
    // ============================================

    /// Lock `amount` until `maturation_timestamp` at the currently guaranteed rate
    pub fn deposit(&mut self, sender: Address, amount: U256, maturation_timestamp: u64) -> Result<u64, PoolError> {
        self.transact("deposit", |pool, now| {
            pool.deposit_at(sender, amount, maturation_timestamp, now)
        })
    }

    /// All-or-nothing batch of deposits
    pub fn multi_deposit(
        &mut self,
        sender: Address,
        amounts: &[U256],
        maturation_timestamps: &[u64],
    ) -> Result<Vec<u64>, PoolError> {
        if amounts.len() != maturation_timestamps.len() {
            return Err(PoolError::BatchLengthMismatch {
                left: amounts.len(),
                right: maturation_timestamps.len(),
            });
        }

        self.transact("multi_deposit", |pool, now| {
            for (&amount, &maturation) in amounts.iter().zip(maturation_timestamps) {
                pool.validate_deposit(amount, maturation, now)?;
            }

            let mut ids = Vec::with_capacity(amounts.len());
            for (&amount, &maturation) in amounts.iter().zip(maturation_timestamps) {
                let id = pool.deposit_at(sender, amount, maturation, now)?;
                debug!("multi_deposit: entry {} -> deposit #{}", ids.len(), id);
                ids.push(id);
            }
            info!("multi_deposit: {} deposits from {}", ids.len(), sender);
            Ok(ids)
        })
    }

    pub(super) fn validate_deposit(&self, amount: U256, maturation_timestamp: u64, now: u64) -> Result<(), PoolError> {
        if amount.is_zero() || amount < self.params.min_deposit_amount {
            return Err(PoolError::amount("deposit below minimum", amount));
        }
        if amount > self.params.max_deposit_amount {
            return Err(PoolError::amount("deposit above maximum", amount));
        }

        let period = maturation_timestamp.saturating_sub(now);
        if period == 0 || period < self.params.min_deposit_period {
            return Err(PoolError::TermTooShort {
                period,
                minimum: self.params.min_deposit_period,
            });
        }
        if period > self.params.max_deposit_period {
            return Err(PoolError::TermTooLong {
                period,
                maximum: self.params.max_deposit_period,
            });
        }
        Ok(())
    }

    fn deposit_at(
        &mut self,
        sender: Address,
        amount: U256,
        maturation_timestamp: u64,
        now: u64,
    ) -> Result<u64, PoolError> {
        self.validate_deposit(amount, maturation_timestamp, now)?;

        let period = maturation_timestamp - now;
        let income_index = self.market.income_index();
        let rate_per_second = self.oracle.update_and_query(now, income_index)?;
        let interest_rate = self.interest_rate_for(rate_per_second, period)?;
        let interest_owed = math::decmul(amount, interest_rate)?;
        if interest_owed.is_zero() {
            return Err(PoolError::amount("deposit would earn no interest", amount));
        }
        let fee_rate = self.fee_model.interest_fee_rate(interest_owed);
        let (net_interest, fee_amount) = self.fee_model.compute_fee(interest_owed)?;

        let pool_address = self.address;
        self.stablecoin.transfer_from(pool_address, sender, pool_address, amount)?;
        self.market.deposit(&mut self.stablecoin, pool_address, amount)?;
        let id = self.deposit_receipts.mint(sender)?;

        self.deposits.push(Deposit {
            id,
            amount,
            interest_owed,
            interest_rate,
            fee_rate,
            deposit_timestamp: now,
            maturation_timestamp,
            initial_income_index: income_index,
            funding_id: None,
            active: true,
            closed_early: false,
        });
        self.total_deposit = math::add(self.total_deposit, amount)?;
        self.total_interest_owed = math::add(self.total_interest_owed, interest_owed)?;
        self.unfunded_deposit_amount = math::add(self.unfunded_deposit_amount, amount)?;

        self.events.push(PoolEvent::Deposit {
            sender,
            deposit_id: id,
            amount,
            maturation_timestamp,
            interest_amount: interest_owed,
            fee_rate,
            fee_amount,
            timestamp: now,
        });
        info!(
            "Deposit #{}: {:.4} locked until {}, {:.6} interest guaranteed ({:.6} after fees)",
            id,
            math::to_decimal(amount, self.stablecoin.decimals),
            format_timestamp(maturation_timestamp),
            math::to_decimal(interest_owed, self.stablecoin.decimals),
            math::to_decimal(net_interest, self.stablecoin.decimals)
        );
        Ok(id)
    }

    /// Replace the fee schedule. Deposits keep the fee rate they captured.
    pub fn set_fee_model(&mut self, fee_model: FeeModel) -> Result<(), PoolError> {
        fee_model.validate()?;
        info!("Fee model updated, beneficiary {}", fee_model.beneficiary);
        self.fee_model = fee_model;
        Ok(())
    }

    /// Term rate promised for `period` seconds at `rate_per_second`
    pub(super) fn interest_rate_for(&self, rate_per_second: U256, period: u64) -> Result<U256, MathError> {
        let term_rate = rate_per_second
            .checked_mul(U256::from(period))
            .ok_or(MathError::Overflow)?;
        math::decmul(term_rate, self.params.uir_multiplier)
    }

    /// Interest a deposit of `amount` for `period` seconds would be promised
    /// right now. Reads the oracle without sampling it.
    pub fn calculate_interest_amount(&self, amount: U256, period: u64) -> Result<U256, PoolError> {
        let interest_rate = self.interest_rate_for(self.oracle.query(), period)?;
        Ok(math::decmul(amount, interest_rate)?)
    }

    // ============================================
    // RECEIPTS
    // ============================================

    pub fn transfer_deposit_receipt(
        &mut self,
        sender: Address,
        from: Address,
        to: Address,
        deposit_id: u64,
    ) -> Result<(), PoolError> {
        self.transact("transfer_deposit_receipt", |pool, _| {
            pool.deposit_receipts.transfer_from(sender, from, to, deposit_id)?;
            info!("Deposit receipt #{} moved {} -> {}", deposit_id, from, to);
            Ok(())
        })
    }

    pub fn transfer_funding_receipt(
        &mut self,
        sender: Address,
        from: Address,
        to: Address,
        funding_id: u64,
    ) -> Result<(), PoolError> {
        self.transact("transfer_funding_receipt", |pool, _| {
            pool.funding_receipts.transfer_from(sender, from, to, funding_id)?;
            info!("Funding receipt #{} moved {} -> {}", funding_id, from, to);
            Ok(())
        })
    }

    /// Let `spender` withdraw (or move) deposit `deposit_id` on the holder's behalf
    pub fn approve_deposit_receipt(&mut self, sender: Address, spender: Address, deposit_id: u64) -> Result<(), PoolError> {
        self.transact("approve_deposit_receipt", |pool, _| {
            pool.deposit_receipts.approve(sender, spender, deposit_id)?;
            Ok(())
        })
    }

    pub fn approve_funding_receipt(&mut self, sender: Address, spender: Address, funding_id: u64) -> Result<(), PoolError> {
        self.transact("approve_funding_receipt", |pool, _| {
            pool.funding_receipts.approve(sender, spender, funding_id)?;
            Ok(())
        })
    }

    /// Let `operator` manage every deposit receipt `sender` holds, now and later
    pub fn set_deposit_receipt_operator(&mut self, sender: Address, operator: Address, approved: bool) -> Result<(), PoolError> {
        self.transact("set_deposit_receipt_operator", |pool, _| {
            pool.deposit_receipts.set_approval_for_all(sender, operator, approved);
            info!("{} {} as deposit operator for {}", if approved { "Added" } else { "Removed" }, operator, sender);
            Ok(())
        })
    }

    pub fn set_funding_receipt_operator(&mut self, sender: Address, operator: Address, approved: bool) -> Result<(), PoolError> {
        self.transact("set_funding_receipt_operator", |pool, _| {
            pool.funding_receipts.set_approval_for_all(sender, operator, approved);
            info!("{} {} as funding operator for {}", if approved { "Added" } else { "Removed" }, operator, sender);
            Ok(())
        })
    }

    pub fn deposit_owner(&self, deposit_id: u64) -> Result<Address, PoolError> {
        Ok(self.deposit_receipts.owner_of(deposit_id)?)
    }

    pub fn funding_owner(&self, funding_id: u64) -> Result<Address, PoolError> {
        Ok(self.funding_receipts.owner_of(funding_id)?)
    }

    // ============================================
    // VIEWS
    // ============================================

    /// Market value minus everything owed to depositors
    pub fn surplus(&self) -> Result<Surplus, PoolError> {
        let value = self.market.total_value()?;
        let owed = math::add(self.total_deposit, self.total_interest_owed)?;
        Ok(Surplus::between(value, owed))
    }

    pub fn surplus_of_deposit(&self, deposit_id: u64) -> Result<Surplus, PoolError> {
        let deposit = &self.deposits[self.deposit_index(deposit_id)?];
        deposit_surplus(deposit, self.market.income_index())
    }

    pub fn get_deposit(&self, deposit_id: u64) -> Option<&Deposit> {
        let index = usize::try_from(deposit_id).ok()?.checked_sub(1)?;
        self.deposits.get(index)
    }

    pub fn get_funding(&self, funding_id: u64) -> Option<&Funding> {
        let index = usize::try_from(funding_id).ok()?.checked_sub(1)?;
        self.fundings.get(index)
    }

    pub fn deposits(&self) -> &[Deposit] {
        &self.deposits
    }

    pub fn fundings(&self) -> &[Funding] {
        &self.fundings
    }

    pub fn deposits_len(&self) -> usize {
        self.deposits.len()
    }

    pub fn fundings_len(&self) -> usize {
        self.fundings.len()
    }

    pub fn total_deposit(&self) -> U256 {
        self.total_deposit
    }

    pub fn total_interest_owed(&self) -> U256 {
        self.total_interest_owed
    }

    /// Principal of active deposits no funding covers yet
    pub fn unfunded_deposit_amount(&self) -> U256 {
        self.unfunded_deposit_amount
    }

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn fee_model(&self) -> &FeeModel {
        &self.fee_model
    }

    pub fn oracle(&self) -> &EmaOracle {
        &self.oracle
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn money_market(&self) -> &M {
        &self.market
    }

    /// Direct access to the external source, for simulating rate moves
    pub fn money_market_mut(&mut self) -> &mut M {
        &mut self.market
    }

    pub fn stablecoin(&self) -> &Erc20Ledger {
        &self.stablecoin
    }

    /// Direct access to the underlying ledger, for minting and approvals
    pub fn stablecoin_mut(&mut self) -> &mut Erc20Ledger {
        &mut self.stablecoin
    }

    // ============================================
    // LOOKUPS
    // ============================================

    pub(super) fn deposit_index(&self, deposit_id: u64) -> Result<usize, PoolError> {
        usize::try_from(deposit_id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .filter(|&index| index < self.deposits.len())
            .ok_or(PoolError::InvalidDepositId(deposit_id))
    }

    pub(super) fn funding_index(&self, funding_id: u64) -> Result<usize, PoolError> {
        usize::try_from(funding_id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .filter(|&index| index < self.fundings.len())
            .ok_or(PoolError::InvalidFundingId(funding_id))
    }
}

/// Current value of a deposit's principal against what it is owed
pub(super) fn deposit_surplus(deposit: &Deposit, income_index: U256) -> Result<Surplus, PoolError> {
    if !deposit.active {
        return Ok(Surplus::between(U256::ZERO, U256::ZERO));
    }
    let value = math::mul_div(deposit.amount, income_index, deposit.initial_income_index)?;
    let owed = deposit.virtual_token_total_supply()?;
    Ok(Surplus::between(value, owed))
}
