//! Governance parameters with defaults, voted flags and bounded effective values.
//!
//! Voted values are stored exactly as applied. Consensus reads them through
//! the effective getters, which replace out-of-range values so that a bad
//! vote can never push the chain outside its safe operating range.

use std::collections::BTreeMap;
use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ContractError, ContractResult};

/// Identifier of a governance parameter, as passed to `getDgpParam`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterId(pub u64);

impl ParameterId {
    /// Adds an admin when the vote passes.
    pub const ADMIN_VOTE: ParameterId = ParameterId(0);
    /// Removes a voted admin when the vote passes.
    pub const REMOVE_ADMIN_VOTE: ParameterId = ParameterId(1);
    /// Gas price in millionths of a cent.
    pub const FIAT_GAS_PRICE: ParameterId = ParameterId(2);
    /// Percentage of block fees burned.
    pub const BURN_RATE: ParameterId = ParameterId(3);
    /// Percentage of fees paid as economy dividend.
    pub const ECONOMY_DIVIDEND: ParameterId = ParameterId(4);
    /// Maximum serialized block size in bytes.
    pub const BLOCK_SIZE: ParameterId = ParameterId(5);
    /// Maximum gas per block.
    pub const BLOCK_GAS_LIMIT: ParameterId = ParameterId(6);
    /// Price per transaction byte in millionths of a cent.
    pub const FIAT_BYTE_PRICE: ParameterId = ParameterId(7);
    /// Reserved slot with a fixed default and no consensus effect.
    pub const RESERVED_8: ParameterId = ParameterId(8);

    /// Registry entry, or `None` for ids the DGP does not know.
    pub fn metadata(&self) -> Option<&'static ParameterMetadata> {
        PARAMETERS.iter().find(|meta| meta.id == *self)
    }

    /// Returns true for the ids whose proposals carry an address.
    pub fn is_admin_vote(&self) -> bool {
        *self == Self::ADMIN_VOTE || *self == Self::REMOVE_ADMIN_VOTE
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.metadata() {
            Some(meta) => write!(f, "{} ({})", self.0, meta.name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Categories of parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterCategory {
    Admin,
    Economic,
    Block,
    Reserved,
}

/// What the effective getter does with a stored value outside the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfRange {
    /// Use the default value.
    UseDefault,
    /// Clamp to the nearest bound.
    Clamp,
}

/// Parameter metadata including validation rules
#[derive(Debug, Clone)]
pub struct ParameterMetadata {
    pub id: ParameterId,
    pub name: &'static str,
    pub description: &'static str,
    pub category: ParameterCategory,
    /// `None` for admin votes, which store no value.
    pub default: Option<u64>,
    pub min: u64,
    pub max: u64,
    pub out_of_range: OutOfRange,
}

impl ParameterMetadata {
    /// Maps a stored value into the accepted range.
    pub fn bound(&self, value: u64) -> u64 {
        if (self.min..=self.max).contains(&value) {
            return value;
        }
        match self.out_of_range {
            OutOfRange::UseDefault => self.default.unwrap_or(self.min),
            OutOfRange::Clamp => value.clamp(self.min, self.max),
        }
    }
}

/// Every parameter known to the DGP.
pub static PARAMETERS: [ParameterMetadata; 9] = [
    ParameterMetadata {
        id: ParameterId::ADMIN_VOTE,
        name: "admin_vote",
        description: "Grant admin rights to an address",
        category: ParameterCategory::Admin,
        default: None,
        min: 0,
        max: u64::MAX,
        out_of_range: OutOfRange::UseDefault,
    },
    ParameterMetadata {
        id: ParameterId::REMOVE_ADMIN_VOTE,
        name: "remove_admin_vote",
        description: "Revoke admin rights granted by a previous vote",
        category: ParameterCategory::Admin,
        default: None,
        min: 0,
        max: u64::MAX,
        out_of_range: OutOfRange::UseDefault,
    },
    ParameterMetadata {
        id: ParameterId::FIAT_GAS_PRICE,
        name: "fiat_gas_price",
        description: "Gas price in millionths of a cent",
        category: ParameterCategory::Economic,
        default: Some(1_000),
        min: 1,
        max: u64::MAX,
        out_of_range: OutOfRange::Clamp,
    },
    ParameterMetadata {
        id: ParameterId::BURN_RATE,
        name: "burn_rate",
        description: "Percentage of transaction fees burned by the coinstake",
        category: ParameterCategory::Economic,
        default: Some(0),
        min: 0,
        max: 50,
        out_of_range: OutOfRange::UseDefault,
    },
    ParameterMetadata {
        id: ParameterId::ECONOMY_DIVIDEND,
        name: "economy_dividend",
        description: "Percentage of fees owed to contract owners",
        category: ParameterCategory::Economic,
        default: Some(50),
        min: 0,
        max: 50,
        out_of_range: OutOfRange::UseDefault,
    },
    ParameterMetadata {
        id: ParameterId::BLOCK_SIZE,
        name: "block_size",
        description: "Maximum serialized block size in bytes",
        category: ParameterCategory::Block,
        default: Some(2_000_000),
        min: 500_000,
        max: 32_000_000,
        out_of_range: OutOfRange::UseDefault,
    },
    ParameterMetadata {
        id: ParameterId::BLOCK_GAS_LIMIT,
        name: "block_gas_limit",
        description: "Maximum gas consumed by one block",
        category: ParameterCategory::Block,
        default: Some(40_000_000),
        min: 1_000_000,
        max: 1_000_000_000,
        out_of_range: OutOfRange::UseDefault,
    },
    ParameterMetadata {
        id: ParameterId::FIAT_BYTE_PRICE,
        name: "fiat_byte_price",
        description: "Price per transaction byte in millionths of a cent",
        category: ParameterCategory::Economic,
        default: Some(1_000),
        min: 1,
        max: u64::MAX,
        out_of_range: OutOfRange::Clamp,
    },
    ParameterMetadata {
        id: ParameterId::RESERVED_8,
        name: "reserved_8",
        description: "Reserved",
        category: ParameterCategory::Reserved,
        default: Some(32),
        min: 0,
        max: u64::MAX,
        out_of_range: OutOfRange::UseDefault,
    },
];

/// Current values of the governance parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterStore {
    /// Values applied by votes; a key's presence is its "voted" flag.
    values: BTreeMap<ParameterId, u64>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn metadata(id: ParameterId) -> ContractResult<&'static ParameterMetadata> {
        id.metadata().ok_or(ContractError::UnknownParameter(id.0))
    }

    /// Stored value, or the default when the parameter was never voted.
    /// Admin votes read as zero.
    pub fn get(&self, id: ParameterId) -> ContractResult<u64> {
        let meta = Self::metadata(id)?;
        Ok(self.values.get(&id).copied().or(meta.default).unwrap_or(0))
    }

    /// Returns true once a vote has applied a value.
    pub fn is_voted(&self, id: ParameterId) -> bool {
        self.values.contains_key(&id)
    }

    /// Fails if `id` cannot take a value.
    pub(crate) fn check_apply(&self, id: ParameterId) -> ContractResult<()> {
        if Self::metadata(id)?.default.is_none() {
            return Err(ContractError::InvalidArgument(format!("parameter {} does not hold a value", id)));
        }
        Ok(())
    }

    /// Overwrites the value. Reached only through a finished vote or the
    /// oracle override.
    pub(crate) fn apply(&mut self, id: ParameterId, value: u64) -> ContractResult<Option<u64>> {
        self.check_apply(id)?;
        let previous = self.values.insert(id, value);
        info!("Parameter {} set to {} (previously {:?})", id, value, previous);
        Ok(previous)
    }

    /// Value consensus should use: bounded, defaulted, never failing for
    /// registered parameters.
    pub fn effective(&self, id: ParameterId) -> u64 {
        match id.metadata() {
            Some(meta) => {
                let stored = self.values.get(&id).copied().or(meta.default).unwrap_or(0);
                meta.bound(stored)
            }
            None => 0,
        }
    }

    pub fn burn_rate(&self) -> u64 {
        self.effective(ParameterId::BURN_RATE)
    }

    pub fn economy_dividend(&self) -> u64 {
        self.effective(ParameterId::ECONOMY_DIVIDEND)
    }

    pub fn block_size(&self) -> u64 {
        self.effective(ParameterId::BLOCK_SIZE)
    }

    pub fn block_gas_limit(&self) -> u64 {
        self.effective(ParameterId::BLOCK_GAS_LIMIT)
    }

    pub fn fiat_gas_price(&self) -> u64 {
        self.effective(ParameterId::FIAT_GAS_PRICE)
    }

    pub fn fiat_byte_price(&self) -> u64 {
        self.effective(ParameterId::FIAT_BYTE_PRICE)
    }
}
