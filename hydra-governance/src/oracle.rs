//! Price oracle and its linkage to the DGP.
//!
//! The oracle converts the fiat gas and byte prices voted in the DGP into
//! satoshi using an admin-maintained coin price. It only trusts the DGP
//! when both contracts point at each other's reserved address.

use hydra_core::{Address, COIN};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::admin::AdminRegistry;
use crate::config::GovernanceConfig;
use crate::error::{ContractError, ContractResult};
use crate::parameters::ParameterStore;

/// Gas price used when the oracle cannot derive one.
pub const DEFAULT_GAS_PRICE: u64 = 40;
/// Byte price used when the oracle cannot derive one.
pub const DEFAULT_BYTE_PRICE: u64 = 10;
/// Fiat parameters are expressed in millionths of a cent.
pub const ONE_CENT_EQUAL: u64 = 1_000_000;

/// Addresses the DGP and the oracle hold for each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleBridge {
    /// Set on the DGP by `setOracleAddress`.
    oracle_address: Option<Address>,
    /// Set on the oracle by `setDgpAddress`.
    dgp_address: Option<Address>,
}

impl OracleBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the DGP at an oracle. Gated by the DGP admins.
    pub fn set_oracle_address(&mut self, dgp_admins: &AdminRegistry, caller: &Address, oracle: Address) -> ContractResult<()> {
        if !dgp_admins.is_admin(caller) {
            return Err(ContractError::Unauthorized(*caller));
        }
        self.oracle_address = Some(oracle);
        info!("DGP oracle address set to {} by {}", oracle, caller);
        Ok(())
    }

    /// Points the oracle at a DGP. Gated by the oracle admins.
    pub fn set_dgp_address(&mut self, oracle_admins: &AdminRegistry, caller: &Address, dgp: Address) -> ContractResult<()> {
        if !oracle_admins.is_admin(caller) {
            return Err(ContractError::Unauthorized(*caller));
        }
        self.dgp_address = Some(dgp);
        info!("Oracle DGP address set to {} by {}", dgp, caller);
        Ok(())
    }

    pub fn oracle_address(&self) -> Option<Address> {
        self.oracle_address
    }

    pub fn dgp_address(&self) -> Option<Address> {
        self.dgp_address
    }

    /// True only when both sides point at the reserved pair.
    pub fn is_trusted(&self, config: &GovernanceConfig) -> bool {
        self.oracle_address == Some(config.oracle_address) && self.dgp_address == Some(config.dgp_address)
    }
}

/// Admin-maintained coin price and the conversions built on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOracle {
    /// Price of one coin in cents; zero until an admin sets it.
    coin_price_cents: u64,
}

impl PriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_coin_price(&mut self, admins: &AdminRegistry, caller: &Address, cents: u64) -> ContractResult<()> {
        if !admins.is_admin(caller) {
            return Err(ContractError::Unauthorized(*caller));
        }
        if cents == 0 {
            return Err(ContractError::InvalidArgument("coin price must be positive".to_string()));
        }
        self.coin_price_cents = cents;
        debug!("Coin price set to {} cents by {}", cents, caller);
        Ok(())
    }

    pub fn coin_price_cents(&self) -> u64 {
        self.coin_price_cents
    }

    /// Converts a fiat amount (millionths of a cent) into satoshi, or `None`
    /// without a coin price or when the result rounds to zero.
    fn to_satoshi(&self, fiat: u64) -> Option<u64> {
        if self.coin_price_cents == 0 {
            return None;
        }
        let numerator = u128::from(fiat) * u128::from(COIN);
        let denominator = u128::from(self.coin_price_cents) * u128::from(ONE_CENT_EQUAL);
        let satoshi = numerator / denominator;
        match u64::try_from(satoshi) {
            Ok(0) => None,
            Ok(value) => Some(value),
            Err(_) => Some(u64::MAX),
        }
    }

    /// Minimum gas price in satoshi.
    pub fn gas_price(&self, bridge: &OracleBridge, config: &GovernanceConfig, parameters: &ParameterStore) -> u64 {
        if !bridge.is_trusted(config) {
            return DEFAULT_GAS_PRICE;
        }
        self.to_satoshi(parameters.fiat_gas_price()).unwrap_or(DEFAULT_GAS_PRICE)
    }

    /// Minimum price per transaction byte in satoshi.
    pub fn byte_price(&self, bridge: &OracleBridge, config: &GovernanceConfig, parameters: &ParameterStore) -> u64 {
        if !bridge.is_trusted(config) {
            return DEFAULT_BYTE_PRICE;
        }
        self.to_satoshi(parameters.fiat_byte_price()).unwrap_or(DEFAULT_BYTE_PRICE)
    }
}
