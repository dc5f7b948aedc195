//! Governance configuration: reserved contract addresses and policy switches.

use std::path::Path;

use hydra_core::Address;
use serde::{Deserialize, Serialize};

/// Reserved address of the economy contract.
pub const ECONOMY_CONTRACT: u64 = 0x90;
/// Reserved address of the DGP contract.
pub const DGP_CONTRACT: u64 = 0x91;
/// Reserved address of the price oracle contract.
pub const ORACLE_CONTRACT: u64 = 0x92;

/// Configuration shared by all governance contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Address the economy contract lives at.
    pub economy_address: Address,
    /// Address the DGP contract lives at.
    pub dgp_address: Address,
    /// Address the price oracle lives at.
    pub oracle_address: Address,
    /// Lets the backup admin replace the admin pair as well as the main admin.
    pub backup_may_set_admins: bool,
    /// Lets oracle admins push fiat gas/byte prices straight into the DGP.
    pub oracle_parameter_override: bool,
    /// Longest voting window a proposal may request, in blocks.
    pub max_vote_duration: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            economy_address: Address::from_low_u64_be(ECONOMY_CONTRACT),
            dgp_address: Address::from_low_u64_be(DGP_CONTRACT),
            oracle_address: Address::from_low_u64_be(ORACLE_CONTRACT),
            backup_may_set_admins: false,
            oracle_parameter_override: false,
            max_vote_duration: 1_000_000,
        }
    }
}

impl GovernanceConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Loads a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw).map_err(std::io::Error::from)
    }

    /// Returns true if `address` is one of the system contracts.
    pub fn is_system_contract(&self, address: &Address) -> bool {
        *address == self.economy_address || *address == self.dgp_address || *address == self.oracle_address
    }
}
