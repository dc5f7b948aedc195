//! Economy contract: who owns each deployed contract.
//!
//! Owners are registered by the coinstake of the block that deploys the
//! contract, and can later hand ownership to another address.

use std::collections::BTreeMap;

use hydra_core::Address;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyContract {
    owners: BTreeMap<Address, Address>,
}

impl EconomyContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner of `contract`, or the zero address when unregistered.
    pub fn contract_owner(&self, contract: &Address) -> Address {
        self.owners.get(contract).copied().unwrap_or_else(Address::zero)
    }

    pub fn registered(&self) -> usize {
        self.owners.len()
    }

    /// Registers owners for freshly deployed contracts. Coinstake only.
    pub fn add_contracts<F>(&mut self, from_coinstake: bool, contracts: &[Address], owners: &[Address], is_deployed: F) -> ContractResult<()>
    where
        F: Fn(&Address) -> bool,
    {
        if !from_coinstake {
            return Err(ContractError::CoinstakeOnly);
        }
        if contracts.len() != owners.len() || contracts.is_empty() {
            return Err(ContractError::InvalidArgument(format!(
                "{} contracts for {} owners",
                contracts.len(),
                owners.len()
            )));
        }
        for (contract, owner) in contracts.iter().zip(owners) {
            if !is_deployed(contract) {
                return Err(ContractError::UnknownContract(*contract));
            }
            if self.owners.contains_key(contract) {
                return Err(ContractError::InvalidArgument(format!("contract {} already has an owner", contract)));
            }
            if owner.is_zero() {
                return Err(ContractError::InvalidArgument("owner must not be zero".to_string()));
            }
        }
        for (contract, owner) in contracts.iter().zip(owners) {
            self.owners.insert(*contract, *owner);
            debug!("Contract {} owned by {}", contract, owner);
        }
        Ok(())
    }

    /// Transfers ownership. Only the current owner may call it.
    pub fn update_contract(&mut self, caller: &Address, contract: &Address, new_owner: Address) -> ContractResult<()> {
        let owner = self.owners.get_mut(contract).ok_or(ContractError::UnknownContract(*contract))?;
        if *owner != *caller {
            return Err(ContractError::Unauthorized(*caller));
        }
        if new_owner.is_zero() {
            return Err(ContractError::InvalidArgument("owner must not be zero".to_string()));
        }
        *owner = new_owner;
        info!("Contract {} transferred from {} to {}", contract, caller, new_owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_add_contracts_only_from_coinstake() {
        let mut economy = EconomyContract::new();
        assert_eq!(
            economy.add_contracts(false, &[addr(1)], &[addr(2)], |_| true),
            Err(ContractError::CoinstakeOnly)
        );
        economy.add_contracts(true, &[addr(1)], &[addr(2)], |_| true).unwrap();
        assert_eq!(economy.contract_owner(&addr(1)), addr(2));
        assert_eq!(economy.contract_owner(&addr(3)), Address::zero());
    }

    #[test]
    fn test_add_contracts_is_all_or_nothing() {
        let mut economy = EconomyContract::new();
        let result = economy.add_contracts(true, &[addr(1), addr(5)], &[addr(2), addr(2)], |c| *c == addr(1));
        assert_eq!(result, Err(ContractError::UnknownContract(addr(5))));
        assert_eq!(economy.registered(), 0);
    }

    #[test]
    fn test_update_contract_by_owner_only() {
        let mut economy = EconomyContract::new();
        economy.add_contracts(true, &[addr(1)], &[addr(2)], |_| true).unwrap();
        assert_eq!(
            economy.update_contract(&addr(3), &addr(1), addr(4)),
            Err(ContractError::Unauthorized(addr(3)))
        );
        economy.update_contract(&addr(2), &addr(1), addr(4)).unwrap();
        assert_eq!(economy.contract_owner(&addr(1)), addr(4));
    }
}
