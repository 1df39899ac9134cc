//! Deficit funding
//!
//! A funder pays in the gap between what the pool owes its depositors and
//! what the market position is worth. In return the funder earns the yield
//! of the covered principal, and gets coverage back when a covered deposit
//! exits early (its interest is never paid).

use alloy_primitives::{Address, U256};
use std::collections::HashSet;
use tracing::info;

use super::engine::{deposit_surplus, FUNDING_RECEIPT};
use super::{Funding, Pool, PoolError, PoolEvent};
use crate::math;
use crate::money_market::MoneyMarket;

/// Amounts owed to a funder by one settlement
#[derive(Debug, Clone, Copy)]
pub(super) struct FunderSettlement {
    pub funding_id: u64,
    pub interest: U256,
    pub refund: U256,
}

impl<M: MoneyMarket> Pool<M> {
    /// Cover the deficit of a specific set of active, unfunded deposits
    pub fn fund(&mut self, sender: Address, deposit_ids: &[u64]) -> Result<u64, PoolError> {
        self.transact("fund", |pool, now| {
            if deposit_ids.is_empty() {
                return Err(PoolError::InvalidAmount("no deposits selected".to_string()));
            }
            let mut seen = HashSet::new();
            for &id in deposit_ids {
                let deposit = &pool.deposits[pool.deposit_index(id)?];
                if !deposit.active {
                    return Err(PoolError::AlreadyWithdrawn(id));
                }
                if deposit.funding_id.is_some() || !seen.insert(id) {
                    return Err(PoolError::AlreadyFunded(id));
                }
            }

            let pool_surplus = pool.surplus()?;
            if !pool_surplus.is_negative {
                return Err(PoolError::NoDeficit);
            }

            let income_index = pool.market.income_index();
            let mut deficit = U256::ZERO;
            let mut surplus = U256::ZERO;
            for &id in deposit_ids {
                let deposit = &pool.deposits[pool.deposit_index(id)?];
                let s = deposit_surplus(deposit, income_index)?;
                if s.is_negative {
                    deficit = math::add(deficit, s.amount)?;
                } else {
                    surplus = math::add(surplus, s.amount)?;
                }
            }
            if surplus >= deficit {
                return Err(PoolError::NoDeficit);
            }

            let covered = (deficit - surplus).min(pool_surplus.amount);
            pool.issue_funding(sender, deposit_ids.to_vec(), covered, income_index, now)
        })
    }

    /// Cover the pool-wide deficit with every active unfunded deposit
    pub fn fund_all(&mut self, sender: Address) -> Result<u64, PoolError> {
        self.transact("fund_all", |pool, now| {
            let pool_surplus = pool.surplus()?;
            if !pool_surplus.is_negative {
                return Err(PoolError::NoDeficit);
            }
            let deposit_ids: Vec<u64> = pool
                .deposits
                .iter()
                .filter(|d| d.active && d.funding_id.is_none())
                .map(|d| d.id)
                .collect();
            if deposit_ids.is_empty() {
                return Err(PoolError::NoDeficit);
            }

            let income_index = pool.market.income_index();
            pool.issue_funding(sender, deposit_ids, pool_surplus.amount, income_index, now)
        })
    }

    /// Pay out the yield the funded principal has earned so far
    pub fn collect_funding_interest(&mut self, sender: Address, funding_id: u64) -> Result<U256, PoolError> {
        self.transact("collect_funding_interest", |pool, now| {
            let index = pool.funding_index(funding_id)?;
            if !pool.funding_receipts.is_approved_or_owner(sender, funding_id) {
                return Err(PoolError::NotOwner {
                    registry: FUNDING_RECEIPT,
                    id: funding_id,
                    caller: sender,
                });
            }
            let income_index = pool.market.income_index();

            let funding = &mut pool.fundings[index];
            let interest = funding.accrued_yield(income_index)?;
            if interest.is_zero() {
                return Ok(U256::ZERO);
            }
            funding.recorded_income_index = funding.recorded_income_index.max(income_index);

            pool.pay_funder(FunderSettlement {
                funding_id,
                interest,
                refund: U256::ZERO,
            }, now)
        })
    }

    /// Withdraw a settlement from the market to the funding receipt's holder,
    /// crediting the funding with what was actually delivered
    pub(super) fn pay_funder(&mut self, settlement: FunderSettlement, now: u64) -> Result<U256, PoolError> {
        let owed = math::add(settlement.interest, settlement.refund)?;
        if owed.is_zero() {
            return Ok(U256::ZERO);
        }
        let index = self.funding_index(settlement.funding_id)?;
        let recipient = self.funding_receipts.owner_of(settlement.funding_id)?;
        let paid = self.market.withdraw(&mut self.stablecoin, recipient, owed)?;

        // A rounding shortfall comes out of the refund first
        let refund = settlement.refund.saturating_sub(owed - paid);
        let interest = paid - refund;
        let funding = &mut self.fundings[index];
        funding.recipient_credit = math::add(funding.recipient_credit, paid)?;

        self.events.push(PoolEvent::FunderPayout {
            funding_id: settlement.funding_id,
            recipient,
            interest,
            refund,
            timestamp: now,
        });
        info!(
            "Funding #{}: {:.6} paid to {} ({:.6} interest, {:.6} refund)",
            settlement.funding_id,
            math::to_decimal(paid, self.stablecoin.decimals),
            recipient,
            math::to_decimal(interest, self.stablecoin.decimals),
            math::to_decimal(refund, self.stablecoin.decimals)
        );
        Ok(paid)
    }

    /// Collect `deficit` (rounded up to what the market can credit) from
    /// `sender` and cover `deposit_ids` with it
    fn issue_funding(
        &mut self,
        sender: Address,
        deposit_ids: Vec<u64>,
        deficit: U256,
        income_index: U256,
        now: u64,
    ) -> Result<u64, PoolError> {
        let amount = self.market.deposit_amount_for_value(deficit)?;
        let pool_address = self.address;
        self.stablecoin.transfer_from(pool_address, sender, pool_address, amount)?;
        self.market.deposit(&mut self.stablecoin, pool_address, amount)?;
        let funding_id = self.funding_receipts.mint(sender)?;

        let mut funded_deposit_amount = U256::ZERO;
        for &id in &deposit_ids {
            let index = self.deposit_index(id)?;
            let deposit = &mut self.deposits[index];
            deposit.funding_id = Some(funding_id);
            funded_deposit_amount = math::add(funded_deposit_amount, deposit.amount)?;
        }
        self.unfunded_deposit_amount = math::sub(self.unfunded_deposit_amount, funded_deposit_amount)?;

        self.events.push(PoolEvent::Fund {
            sender,
            funding_id,
            deposit_ids: deposit_ids.clone(),
            deficit_amount: deficit,
            amount,
            timestamp: now,
        });
        info!(
            "Funding #{}: {:.6} paid in for a {:.6} deficit over {} deposits ({:.4} principal)",
            funding_id,
            math::to_decimal(amount, self.stablecoin.decimals),
            math::to_decimal(deficit, self.stablecoin.decimals),
            deposit_ids.len(),
            math::to_decimal(funded_deposit_amount, self.stablecoin.decimals)
        );

        self.fundings.push(Funding {
            id: funding_id,
            deposit_ids,
            creation_timestamp: now,
            initial_principal_covered: amount,
            principal_covered: amount,
            funded_deposit_amount,
            recorded_income_index: income_index,
            recipient_credit: U256::ZERO,
            refunded: false,
        });
        Ok(funding_id)
    }
}
