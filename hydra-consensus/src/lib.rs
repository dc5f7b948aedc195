//! Hydra Consensus
//!
//! Proof-of-stake consensus rules for the Hydra chain: the stake kernel,
//! coinstake construction, two-pass block validation of privileged
//! governance calls, block assembly and an in-process chain that ties them
//! together.

pub mod chain;
pub mod coinstake;
pub mod error;
pub mod kernel;
pub mod mempool;
pub mod miner;
pub mod params;
pub mod target;
pub mod transaction_builder;
pub mod utxo_set;
pub mod validation;

pub use chain::{Chain, Clock, SubmitOutcome};
pub use coinstake::{block_reward, build_coinstake, check_coinstake_split, contract_dividend, Dividends};
pub use error::{ConsensusError, Result};
pub use kernel::{compute_kernel_hash, is_eligible, next_stake_modifier, solve_stake, StakeCandidate, StakeSolution, StakeWindow};
pub use mempool::Mempool;
pub use miner::BlockAssembler;
pub use params::ChainParams;
pub use utxo_set::UtxoSet;
pub use validation::{apply_transaction, BlockContext, BlockIndexEntry, BlockValidator, ChainState, ConnectedBlock};
