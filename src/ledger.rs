//! Underlying Stablecoin Ledger
//!
//! In-process fungible-token ledger with ERC-20 semantics. The pool pulls
//! principal with `transfer_from` (the depositor approves the pool first)
//! and pays out with `transfer`; money markets keep their cash here too.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: {account} has {balance}, needs {needed}")]
    InsufficientBalance {
        account: Address,
        balance: U256,
        needed: U256,
    },

    #[error("insufficient allowance: {spender} may spend {allowance} of {owner}, needs {needed}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: U256,
        needed: U256,
    },

    #[error("total supply overflow")]
    SupplyOverflow,
}

/// Fungible token balances keyed by account address
#[derive(Debug, Clone, Default)]
pub struct Erc20Ledger {
    pub symbol: String,
    pub decimals: u8,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl Erc20Ledger {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            ..Default::default()
        }
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Create new tokens (test faucets, simulated external yield)
    pub fn mint(&mut self, to: Address, amount: U256) -> Result<(), TokenError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow)?;
        self.total_supply = supply;
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    pub fn approve(&mut self, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((owner, spender), amount);
    }

    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), TokenError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: from,
                balance,
                needed: amount,
            });
        }
        if from == to || amount.is_zero() {
            return Ok(());
        }
        self.balances.insert(from, balance - amount);
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    /// Move `amount` from `owner` to `to` on behalf of `spender`.
    /// An allowance of `U256::MAX` is treated as infinite.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        owner: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TokenError> {
        let allowance = self.allowance(owner, spender);
        if spender != owner && allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                owner,
                spender,
                allowance,
                needed: amount,
            });
        }
        self.transfer(owner, to, amount)?;
        if spender != owner && allowance != U256::MAX {
            self.allowances.insert((owner, spender), allowance - amount);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut token = Erc20Ledger::new("DAI", 18);
        token.mint(alice(), U256::from(100u64)).unwrap();

        token.transfer(alice(), bob(), U256::from(40u64)).unwrap();
        assert_eq!(token.balance_of(alice()), U256::from(60u64));
        assert_eq!(token.balance_of(bob()), U256::from(40u64));
        assert_eq!(token.total_supply(), U256::from(100u64));

        let err = token.transfer(bob(), alice(), U256::from(41u64)).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut token = Erc20Ledger::new("DAI", 18);
        let pool = Address::repeat_byte(0x77);
        token.mint(alice(), U256::from(100u64)).unwrap();
        token.approve(alice(), pool, U256::from(30u64));

        token.transfer_from(pool, alice(), pool, U256::from(20u64)).unwrap();
        assert_eq!(token.allowance(alice(), pool), U256::from(10u64));

        let err = token
            .transfer_from(pool, alice(), pool, U256::from(11u64))
            .unwrap_err();
        assert!(matches!(err, TokenError::InsufficientAllowance { .. }));
        assert_eq!(token.balance_of(pool), U256::from(20u64));
    }

    #[test]
    fn test_infinite_allowance() {
        let mut token = Erc20Ledger::new("DAI", 18);
        let pool = Address::repeat_byte(0x77);
        token.mint(alice(), U256::from(100u64)).unwrap();
        token.approve(alice(), pool, U256::MAX);

        token.transfer_from(pool, alice(), bob(), U256::from(100u64)).unwrap();
        assert_eq!(token.allowance(alice(), pool), U256::MAX);
    }
}
