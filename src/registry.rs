//! Position Registry
//!
//! Non-fungible receipts for deposits and fundings. Whoever holds a receipt
//! owns the economic claim behind it; the pool checks `is_approved_or_owner`
//! before paying anything out.

use alloy_primitives::Address;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{registry} receipt #{id} does not exist")]
    NonexistentToken { registry: String, id: u64 },

    #[error("{caller} is not allowed to move {registry} receipt #{id}")]
    NotAuthorized {
        registry: String,
        id: u64,
        caller: Address,
    },

    #[error("{registry} receipt #{id} is held by {owner}, not {from}")]
    WrongOwner {
        registry: String,
        id: u64,
        owner: Address,
        from: Address,
    },

    #[error("cannot transfer {registry} receipt to the zero address")]
    ZeroAddress { registry: String },
}

/// Registry of unique, sequentially numbered receipts
#[derive(Debug, Clone)]
pub struct PositionRegistry {
    name: String,
    last_id: u64,
    owners: HashMap<u64, Address>,
    approvals: HashMap<u64, Address>,
    operators: HashSet<(Address, Address)>,
}

impl PositionRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_id: 0,
            owners: HashMap::new(),
            approvals: HashMap::new(),
            operators: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of receipts ever minted (burned ones included)
    pub fn minted(&self) -> u64 {
        self.last_id
    }

    /// Mint the next receipt to `owner`. Ids start at 1.
    pub fn mint(&mut self, owner: Address) -> Result<u64, RegistryError> {
        if owner == Address::ZERO {
            return Err(RegistryError::ZeroAddress {
                registry: self.name.clone(),
            });
        }
        self.last_id += 1;
        self.owners.insert(self.last_id, owner);
        Ok(self.last_id)
    }

    /// Destroy a receipt. Burning twice fails.
    pub fn burn(&mut self, id: u64) -> Result<(), RegistryError> {
        if self.owners.remove(&id).is_none() {
            return Err(self.nonexistent(id));
        }
        self.approvals.remove(&id);
        Ok(())
    }

    pub fn exists(&self, id: u64) -> bool {
        self.owners.contains_key(&id)
    }

    pub fn owner_of(&self, id: u64) -> Result<Address, RegistryError> {
        self.owners
            .get(&id)
            .copied()
            .ok_or_else(|| self.nonexistent(id))
    }

    /// Approve `spender` for a single receipt. Only the owner or an operator may approve.
    pub fn approve(&mut self, caller: Address, spender: Address, id: u64) -> Result<(), RegistryError> {
        let owner = self.owner_of(id)?;
        if caller != owner && !self.is_approved_for_all(owner, caller) {
            return Err(RegistryError::NotAuthorized {
                registry: self.name.clone(),
                id,
                caller,
            });
        }
        self.approvals.insert(id, spender);
        Ok(())
    }

    pub fn get_approved(&self, id: u64) -> Option<Address> {
        self.approvals.get(&id).copied()
    }

    pub fn set_approval_for_all(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.operators.insert((owner, operator));
        } else {
            self.operators.remove(&(owner, operator));
        }
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operators.contains(&(owner, operator))
    }

    /// True if `spender` is the holder of `id` or has been authorized by the holder
    pub fn is_approved_or_owner(&self, spender: Address, id: u64) -> bool {
        match self.owners.get(&id) {
            Some(&owner) => {
                spender == owner
                    || self.get_approved(id) == Some(spender)
                    || self.is_approved_for_all(owner, spender)
            }
            None => false,
        }
    }

    /// Move a receipt (and the claim it represents) from `from` to `to`
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        id: u64,
    ) -> Result<(), RegistryError> {
        let owner = self.owner_of(id)?;
        if owner != from {
            return Err(RegistryError::WrongOwner {
                registry: self.name.clone(),
                id,
                owner,
                from,
            });
        }
        if to == Address::ZERO {
            return Err(RegistryError::ZeroAddress {
                registry: self.name.clone(),
            });
        }
        if !self.is_approved_or_owner(caller, id) {
            return Err(RegistryError::NotAuthorized {
                registry: self.name.clone(),
                id,
                caller,
            });
        }
        self.approvals.remove(&id);
        self.owners.insert(id, to);
        Ok(())
    }

    fn nonexistent(&self, id: u64) -> RegistryError {
        RegistryError::NonexistentToken {
            registry: self.name.clone(),
            id,
        }
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
    fn test_sequential_ids() {
        let mut registry = PositionRegistry::new("Deposit");
        assert_eq!(registry.mint(alice()).unwrap(), 1);
        assert_eq!(registry.mint(bob()).unwrap(), 2);
        registry.burn(1).unwrap();

        // Burned ids are never reused
        assert_eq!(registry.mint(alice()).unwrap(), 3);
        assert_eq!(registry.minted(), 3);
    }

    #[test]
    fn test_double_burn_fails() {
        let mut registry = PositionRegistry::new("Deposit");
        let id = registry.mint(alice()).unwrap();
        registry.burn(id).unwrap();

        assert!(matches!(
            registry.burn(id),
            Err(RegistryError::NonexistentToken { .. })
        ));
        assert!(registry.owner_of(id).is_err());
        assert!(!registry.is_approved_or_owner(alice(), id));
    }

    #[test]
    fn test_transfer_requires_authorization() {
        let mut registry = PositionRegistry::new("Funding");
        let id = registry.mint(alice()).unwrap();

        assert!(matches!(
            registry.transfer_from(bob(), alice(), bob(), id),
            Err(RegistryError::NotAuthorized { .. })
        ));

        registry.approve(alice(), bob(), id).unwrap();
        assert!(registry.is_approved_or_owner(bob(), id));
        registry.transfer_from(bob(), alice(), bob(), id).unwrap();

        assert_eq!(registry.owner_of(id).unwrap(), bob());
        // Approval is cleared by the transfer
        assert_eq!(registry.get_approved(id), None);
        assert!(!registry.is_approved_or_owner(alice(), id));
    }

    #[test]
    fn test_operator_approval() {
        let mut registry = PositionRegistry::new("Deposit");
        let id = registry.mint(alice()).unwrap();
        registry.set_approval_for_all(alice(), bob(), true);
        assert!(registry.is_approved_or_owner(bob(), id));

        registry.set_approval_for_all(alice(), bob(), false);
        assert!(!registry.is_approved_or_owner(bob(), id));
    }

    #[test]
    fn test_wrong_from_rejected() {
        let mut registry = PositionRegistry::new("Deposit");
        let id = registry.mint(alice()).unwrap();
        assert!(matches!(
            registry.transfer_from(bob(), bob(), alice(), id),
            Err(RegistryError::WrongOwner { .. })
        ));
    }
}
