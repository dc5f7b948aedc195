//! Admin registry shared by the DGP and the price oracle.

use std::collections::BTreeSet;

use hydra_core::Address;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};

/// The main/backup admin pair set at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminPair {
    pub main: Address,
    pub backup: Address,
}

/// Identities allowed to perform privileged calls on one contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRegistry {
    pair: Option<AdminPair>,
    /// Admins added by successful admin votes.
    voted: BTreeSet<Address>,
}

impl AdminRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first admin pair. Later calls fail with
    /// [`ContractError::AlreadyInitialized`].
    pub fn initialize(&mut self, main: Address, backup: Address) -> ContractResult<()> {
        if self.pair.is_some() {
            return Err(ContractError::AlreadyInitialized);
        }
        Self::check_pair(&main, &backup)?;
        self.pair = Some(AdminPair { main, backup });
        info!("Initialized admins: main {} backup {}", main, backup);
        Ok(())
    }

    /// Replaces the admin pair. Only the main admin may do so, or the backup
    /// admin when `backup_may_set` is enabled.
    pub fn set_admins(&mut self, caller: &Address, main: Address, backup: Address, backup_may_set: bool) -> ContractResult<()> {
        let current = self.pair.ok_or(ContractError::NotInitialized)?;
        let allowed = *caller == current.main || (backup_may_set && *caller == current.backup);
        if !allowed {
            return Err(ContractError::Unauthorized(*caller));
        }
        Self::check_pair(&main, &backup)?;
        self.pair = Some(AdminPair { main, backup });
        info!("Admins replaced by {}: main {} backup {}", caller, main, backup);
        Ok(())
    }

    fn check_pair(main: &Address, backup: &Address) -> ContractResult<()> {
        if main.is_zero() || backup.is_zero() {
            return Err(ContractError::InvalidArgument("admin address must not be zero".to_string()));
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pair.is_some()
    }

    pub fn pair(&self) -> Option<AdminPair> {
        self.pair
    }

    pub fn main(&self) -> Option<Address> {
        self.pair.map(|pair| pair.main)
    }

    pub fn backup(&self) -> Option<Address> {
        self.pair.map(|pair| pair.backup)
    }

    /// Main, backup or voted admin.
    pub fn is_admin(&self, address: &Address) -> bool {
        let in_pair = self
            .pair
            .map(|pair| pair.main == *address || pair.backup == *address)
            .unwrap_or(false);
        in_pair || self.voted.contains(address)
    }

    /// Every admin, pair first.
    pub fn admins(&self) -> Vec<Address> {
        let mut all: Vec<Address> = self.pair.iter().flat_map(|pair| [pair.main, pair.backup]).collect();
        all.extend(self.voted.iter().copied());
        all
    }

    pub(crate) fn add_voted_admin(&mut self, address: Address) -> bool {
        if self.is_admin(&address) {
            debug!("{} is already an admin", address);
            return false;
        }
        self.voted.insert(address)
    }

    /// The pair itself can only change through [`AdminRegistry::set_admins`].
    pub(crate) fn remove_voted_admin(&mut self, address: &Address) -> bool {
        self.voted.remove(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_initialize_once() {
        let mut registry = AdminRegistry::new();
        registry.initialize(addr(1), addr(2)).unwrap();
        assert_eq!(registry.initialize(addr(3), addr(4)), Err(ContractError::AlreadyInitialized));
        assert_eq!(registry.main(), Some(addr(1)));
    }

    #[test]
    fn test_only_main_sets_admins_by_default() {
        let mut registry = AdminRegistry::new();
        registry.initialize(addr(1), addr(2)).unwrap();

        assert_eq!(
            registry.set_admins(&addr(2), addr(5), addr(6), false),
            Err(ContractError::Unauthorized(addr(2)))
        );
        registry.set_admins(&addr(2), addr(5), addr(6), true).unwrap();
        assert!(registry.is_admin(&addr(5)));
        assert!(!registry.is_admin(&addr(1)));
    }

    #[test]
    fn test_voted_admins_cannot_remove_pair() {
        let mut registry = AdminRegistry::new();
        registry.initialize(addr(1), addr(2)).unwrap();
        assert!(registry.add_voted_admin(addr(7)));
        assert!(!registry.add_voted_admin(addr(1)));
        assert!(registry.is_admin(&addr(7)));
        assert!(!registry.remove_voted_admin(&addr(1)));
        assert!(registry.remove_voted_admin(&addr(7)));
        assert_eq!(registry.admins(), vec![addr(1), addr(2)]);
    }

    #[test]
    fn test_set_admins_before_init() {
        let mut registry = AdminRegistry::new();
        assert_eq!(
            registry.set_admins(&addr(1), addr(1), addr(2), false),
            Err(ContractError::NotInitialized)
        );
    }
}
