//! Withdrawal paths: mature, early, partial and batched

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use super::engine::{DEPOSIT_RECEIPT, FUNDING_RECEIPT};
use super::funding::FunderSettlement;
use super::{Deposit, Pool, PoolError, PoolEvent};
use crate::fee_model::fee_for_rate;
use crate::math::{self, PRECISION};
use crate::money_market::MoneyMarket;

impl<M: MoneyMarket> Pool<M> {
    /// Redeem `virtual_token_amount` of a deposit. `early` selects the
    /// penalized path, which is only open before maturity.
    /// Returns what the receipt holder received.
    pub fn withdraw(
        &mut self,
        sender: Address,
        deposit_id: u64,
        virtual_token_amount: U256,
        early: bool,
    ) -> Result<U256, PoolError> {
        let operation = if early { "early_withdraw" } else { "withdraw" };
        self.transact(operation, |pool, now| {
            pool.withdraw_at(sender, deposit_id, virtual_token_amount, early, now)
        })
    }

    pub fn early_withdraw(&mut self, sender: Address, deposit_id: u64, virtual_token_amount: U256) -> Result<U256, PoolError> {
        self.withdraw(sender, deposit_id, virtual_token_amount, true)
    }

    pub fn withdraw_matured(&mut self, sender: Address, deposit_id: u64, virtual_token_amount: U256) -> Result<U256, PoolError> {
        self.withdraw(sender, deposit_id, virtual_token_amount, false)
    }

    /// All-or-nothing batch of early withdrawals
    pub fn multi_early_withdraw(
        &mut self,
        sender: Address,
        deposit_ids: &[u64],
        virtual_token_amounts: &[U256],
    ) -> Result<Vec<U256>, PoolError> {
        self.withdraw_batch(sender, deposit_ids, virtual_token_amounts, true)
    }

    /// All-or-nothing batch of mature withdrawals
    pub fn multi_withdraw(
        &mut self,
        sender: Address,
        deposit_ids: &[u64],
        virtual_token_amounts: &[U256],
    ) -> Result<Vec<U256>, PoolError> {
        self.withdraw_batch(sender, deposit_ids, virtual_token_amounts, false)
    }

    fn withdraw_batch(
        &mut self,
        sender: Address,
        deposit_ids: &[u64],
        virtual_token_amounts: &[U256],
        early: bool,
    ) -> Result<Vec<U256>, PoolError> {
        if deposit_ids.len() != virtual_token_amounts.len() {
            return Err(PoolError::BatchLengthMismatch {
                left: deposit_ids.len(),
                right: virtual_token_amounts.len(),
            });
        }

        let operation = if early { "multi_early_withdraw" } else { "multi_withdraw" };
        self.transact(operation, |pool, now| {
            let mut payouts = Vec::with_capacity(deposit_ids.len());
            for (&deposit_id, &amount) in deposit_ids.iter().zip(virtual_token_amounts) {
                let payout = pool.withdraw_at(sender, deposit_id, amount, early, now)?;
                debug!("{}: deposit #{} paid {}", operation, deposit_id, payout);
                payouts.push(payout);
            }
            info!("{}: {} deposits withdrawn by {}", operation, payouts.len(), sender);
            Ok(payouts)
        })
    }

    fn withdraw_at(
        &mut self,
        sender: Address,
        deposit_id: u64,
        virtual_token_amount: U256,
        early: bool,
        now: u64,
    ) -> Result<U256, PoolError> {
        let index = self.deposit_index(deposit_id)?;
        let deposit = self.deposits[index].clone();
        if !deposit.active {
            return Err(PoolError::AlreadyWithdrawn(deposit_id));
        }
        if !self.deposit_receipts.is_approved_or_owner(sender, deposit_id) {
            return Err(PoolError::NotOwner {
                registry: DEPOSIT_RECEIPT,
                id: deposit_id,
                caller: sender,
            });
        }
        if virtual_token_amount.is_zero() {
            return Err(PoolError::amount("nothing to withdraw", virtual_token_amount));
        }
        if early && deposit.is_mature(now) {
            return Err(PoolError::DepositMatured(deposit_id));
        }
        if !early && !deposit.is_mature(now) {
            return Err(PoolError::NotMatured {
                id: deposit_id,
                maturation_timestamp: deposit.maturation_timestamp,
                now,
            });
        }

        let (principal, interest) = withdrawn_share(&deposit, virtual_token_amount)?;
        if principal.is_zero() {
            return Err(PoolError::amount("withdrawal releases no principal", virtual_token_amount));
        }
        let full = principal == deposit.amount;
        let recipient = self.deposit_receipts.owner_of(deposit_id)?;

        // Early exits forfeit interest and pay a principal penalty
        let (payout, fee) = if early {
            let penalty = self.fee_model.early_withdraw_penalty(
                principal,
                deposit.maturation_timestamp - now,
                deposit.term(),
            )?;
            (principal - penalty, penalty)
        } else {
            let fee = fee_for_rate(interest, deposit.fee_rate)?;
            (math::add(principal, interest)? - fee, fee)
        };

        self.total_deposit = math::sub(self.total_deposit, principal)?;
        self.total_interest_owed = math::sub(self.total_interest_owed, interest)?;
        let funder_payout = match deposit.funding_id {
            Some(funding_id) => Some(self.settle_funding(funding_id, principal, early)?),
            None => {
                self.unfunded_deposit_amount = math::sub(self.unfunded_deposit_amount, principal)?;
                None
            }
        };

        let entry = &mut self.deposits[index];
        entry.amount = deposit.amount - principal;
        entry.interest_owed = deposit.interest_owed - interest;
        if full {
            entry.active = false;
            entry.closed_early = early;
            self.deposit_receipts.burn(deposit_id)?;
        }

        let paid = if payout.is_zero() {
            U256::ZERO
        } else {
            self.market.withdraw(&mut self.stablecoin, recipient, payout)?
        };
        let fee = if fee.is_zero() {
            U256::ZERO
        } else {
            let beneficiary = self.fee_model.beneficiary;
            self.market.withdraw(&mut self.stablecoin, beneficiary, fee)?
        };
        if let Some(settlement) = funder_payout {
            self.pay_funder(settlement, now)?;
        }

        self.events.push(PoolEvent::Withdraw {
            sender,
            recipient,
            deposit_id,
            early,
            principal,
            interest: if early { U256::ZERO } else { interest },
            fee,
            payout: paid,
            timestamp: now,
        });
        info!(
            "Withdraw #{} ({}): principal {:.4}, paid {:.6}, fee {:.6}{}",
            deposit_id,
            if early { "early" } else { "mature" },
            math::to_decimal(principal, self.stablecoin.decimals),
            math::to_decimal(paid, self.stablecoin.decimals),
            math::to_decimal(fee, self.stablecoin.decimals),
            if full { "" } else { " (partial)" }
        );
        Ok(paid)
    }

    /// Release the coverage of `funding_id` for a withdrawal of `principal`
    /// from one of its deposits and work out what its funder is owed
    fn settle_funding(
        &mut self,
        funding_id: u64,
        principal: U256,
        early: bool,
    ) -> Result<FunderSettlement, PoolError> {
        let index = self.funding_index(funding_id)?;
        let income_index = self.market.income_index();

        let funding = &mut self.fundings[index];
        let interest = funding.accrued_yield(income_index)?;

        // Coverage is released in proportion to the principal leaving
        let released = if principal >= funding.funded_deposit_amount {
            funding.principal_covered
        } else {
            math::mul_div(funding.principal_covered, principal, funding.funded_deposit_amount)?
        };
        let refund = if early { released } else { U256::ZERO };

        funding.principal_covered -= released;
        funding.funded_deposit_amount = funding.funded_deposit_amount.saturating_sub(principal);
        funding.recorded_income_index = funding.recorded_income_index.max(income_index);
        if funding.funded_deposit_amount.is_zero() {
            funding.refunded = true;
        }

        debug!(
            "{} #{}: {} interest, {} refund owed ({} coverage released)",
            FUNDING_RECEIPT, funding_id, interest, refund, released
        );
        Ok(FunderSettlement {
            funding_id,
            interest,
            refund,
        })
    }
}

/// Principal and interest released by redeeming `virtual_token_amount`.
/// The whole remaining position is released once the request covers it.
fn withdrawn_share(deposit: &Deposit, virtual_token_amount: U256) -> Result<(U256, U256), PoolError> {
    let supply = deposit.virtual_token_total_supply()?;
    if virtual_token_amount >= supply {
        return Ok((deposit.amount, deposit.interest_owed));
    }
    let principal = math::decdiv(virtual_token_amount, math::add(PRECISION, deposit.interest_rate)?)?
        .min(deposit.amount);
    let interest = math::mul_div(deposit.interest_owed, principal, deposit.amount)?;
    Ok((principal, interest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(amount: u64, interest_rate: U256) -> Deposit {
        let amount = PRECISION * U256::from(amount);
        Deposit {
            id: 1,
            amount,
            interest_owed: math::decmul(amount, interest_rate).unwrap(),
            interest_rate,
            fee_rate: U256::ZERO,
            deposit_timestamp: 0,
            maturation_timestamp: 100,
            initial_income_index: PRECISION,
            funding_id: None,
            active: true,
            closed_early: false,
        }
    }

    #[test]
    fn test_withdrawn_share_full_and_clamped() {
        let d = deposit(100, PRECISION / U256::from(10u64));
        assert_eq!(withdrawn_share(&d, U256::MAX).unwrap(), (d.amount, d.interest_owed));

        let supply = d.virtual_token_total_supply().unwrap();
        assert_eq!(withdrawn_share(&d, supply).unwrap(), (d.amount, d.interest_owed));
    }

    #[test]
    fn test_withdrawn_share_half() {
        let d = deposit(100, PRECISION / U256::from(10u64));
        let half = d.virtual_token_total_supply().unwrap() / U256::from(2u64);

        let (principal, interest) = withdrawn_share(&d, half).unwrap();
        assert_eq!(principal, PRECISION * U256::from(50u64));
        assert_eq!(interest, PRECISION * U256::from(5u64));
    }
}
