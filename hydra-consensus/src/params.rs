//! Chain parameters.

use std::path::Path;

use hydra_core::COIN;
use hydra_governance::GovernanceConfig;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, Result};
use crate::target::compact_to_target;

/// Consensus constants of one network. `Default` is the regression-test
/// network used by the in-process chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    /// Blocks a coinbase or coinstake output must be buried under before it
    /// can be spent, and the minimum depth of a stake.
    pub coinbase_maturity: u64,
    /// Last height produced by proof-of-work; later blocks must be staked.
    pub last_pow_block: u64,
    /// Subsidy of the first blocks, in satoshi.
    pub initial_block_reward: u64,
    /// Blocks between subsidy halvings; zero disables halving.
    pub subsidy_halving_interval: u64,
    /// Compact proof-of-work limit.
    pub pow_limit_bits: u32,
    /// Compact proof-of-stake target.
    pub pos_limit_bits: u32,
    /// Low bits that must be zero in a staked block time.
    pub stake_timestamp_mask: u32,
    /// Seconds ahead of the search start a staker will try.
    pub max_stake_lookahead: u32,
    /// Seconds a block time may run ahead of the node clock.
    pub max_future_drift: u32,
    /// Smallest gas limit a contract output may declare.
    pub min_gas_limit: u64,
    /// Flat fee paid by transactions built by the node, in satoshi.
    pub relay_fee: u64,
    /// Timestamp of the genesis block.
    pub genesis_time: u32,
    /// Governance contract addresses and policy.
    pub governance: GovernanceConfig,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::regtest()
    }
}

impl ChainParams {
    /// Regression-test parameters: trivial targets, short maturity.
    pub fn regtest() -> Self {
        Self {
            coinbase_maturity: 10,
            last_pow_block: 20,
            initial_block_reward: 20_000 * COIN,
            subsidy_halving_interval: 0,
            pow_limit_bits: 0x207f_ffff,
            pos_limit_bits: 0x207f_ffff,
            stake_timestamp_mask: 0xf,
            max_stake_lookahead: 160,
            max_future_drift: 15,
            min_gas_limit: 10_000,
            relay_fee: 100_000,
            genesis_time: 1_600_000_000,
            governance: GovernanceConfig::default(),
        }
    }

    /// Parses parameters from JSON; missing fields take regtest values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Loads parameters from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConsensusError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if !(self.stake_timestamp_mask.wrapping_add(1)).is_power_of_two() {
            return Err(ConsensusError::Config(format!(
                "stake timestamp mask {:#x} must be one less than a power of two",
                self.stake_timestamp_mask
            )));
        }
        if self.pos_target().is_zero() || self.pow_target().is_zero() {
            return Err(ConsensusError::Config("targets must be positive".to_string()));
        }
        Ok(())
    }

    /// Subsidy paid at `height`.
    pub fn block_subsidy(&self, height: u64) -> u64 {
        if self.subsidy_halving_interval == 0 {
            return self.initial_block_reward;
        }
        let halvings = height / self.subsidy_halving_interval;
        if halvings >= 64 {
            0
        } else {
            self.initial_block_reward >> halvings
        }
    }

    /// Returns true for heights that must be staked.
    pub fn is_pos_height(&self, height: u64) -> bool {
        height > self.last_pow_block
    }

    pub fn pow_target(&self) -> U256 {
        compact_to_target(self.pow_limit_bits)
    }

    pub fn pos_target(&self) -> U256 {
        compact_to_target(self.pos_limit_bits)
    }

    /// Granularity of staked block times.
    pub fn stake_step(&self) -> u32 {
        self.stake_timestamp_mask + 1
    }

    /// Returns true if `time` is a valid staked block time.
    pub fn is_stake_timestamp(&self, time: u32) -> bool {
        time & self.stake_timestamp_mask == 0
    }
}
