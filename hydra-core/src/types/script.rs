//! Locking scripts and contract call envelopes carried by transaction outputs.

use serde::{Deserialize, Serialize};

use crate::crypto::{Address, PublicKey};

/// What an output commits its value to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Script {
    /// No script. Marks the first coinstake output and the empty PoS coinbase.
    Empty,
    /// Spendable by the holder of the public key. Used for stake outputs.
    PayToPubKey(PublicKey),
    /// Spendable by any key hashing to the address.
    PayToPubKeyHash(Address),
    /// Deploys a contract funded with the output value.
    Create {
        /// Contract code, stored opaquely.
        code: Vec<u8>,
        /// Maximum gas the deployment may use.
        gas_limit: u64,
        /// Price per gas unit in satoshi.
        gas_price: u64,
    },
    /// Calls a contract, attaching the output value.
    Call {
        /// Target contract.
        contract: Address,
        /// ABI call data (selector followed by 32-byte words).
        data: Vec<u8>,
        /// Maximum gas the call may use.
        gas_limit: u64,
        /// Price per gas unit in satoshi.
        gas_price: u64,
    },
    /// A privileged call that is only valid inside a coinstake transaction.
    CoinstakeCall {
        /// Target system contract.
        contract: Address,
        /// ABI call data.
        data: Vec<u8>,
    },
}

impl Script {
    /// Returns true for [`Script::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Script::Empty)
    }

    /// The address able to spend this output, if any.
    pub fn owner(&self) -> Option<Address> {
        match self {
            Script::PayToPubKey(key) => Some(key.address()),
            Script::PayToPubKeyHash(address) => Some(*address),
            _ => None,
        }
    }

    /// Returns true if the output becomes a spendable coin.
    pub fn is_spendable(&self) -> bool {
        self.owner().is_some()
    }

    /// Returns true for deployments and calls executed by transactions.
    pub fn is_contract(&self) -> bool {
        matches!(self, Script::Create { .. } | Script::Call { .. })
    }

    /// Returns true for coinstake-only calls.
    pub fn is_coinstake_call(&self) -> bool {
        matches!(self, Script::CoinstakeCall { .. })
    }

    /// Gas limit of a contract output, zero otherwise.
    pub fn gas_limit(&self) -> u64 {
        match self {
            Script::Create { gas_limit, .. } | Script::Call { gas_limit, .. } => *gas_limit,
            _ => 0,
        }
    }

    /// Gas price of a contract output, zero otherwise.
    pub fn gas_price(&self) -> u64 {
        match self {
            Script::Create { gas_price, .. } | Script::Call { gas_price, .. } => *gas_price,
            _ => 0,
        }
    }

    /// `gas_limit * gas_price`, or `None` on overflow.
    pub fn gas_fee(&self) -> Option<u64> {
        self.gas_limit().checked_mul(self.gas_price())
    }
}
