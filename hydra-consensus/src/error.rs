use hydra_core::{Hash, OutPoint};
use hydra_governance::ContractError;
use thiserror::Error;

/// Reasons a block or transaction is refused, plus the non-fatal
/// [`ConsensusError::NoEligibleStake`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Unknown parent block {0}")]
    UnknownParent(Hash),

    #[error("Block {0} is already known")]
    DuplicateBlock(Hash),

    #[error("Empty block")]
    EmptyBlock,

    #[error("Merkle root mismatch")]
    BadMerkleRoot,

    #[error("Block time {time} is not after parent time {parent_time}")]
    TimeTooOld { time: u32, parent_time: u32 },

    #[error("Block time {time} is beyond the allowed limit {limit}")]
    TimeTooNew { time: u32, limit: u32 },

    #[error("Stake timestamp {0} does not match the stake mask")]
    BadStakeTimestamp(u32),

    #[error("Block size too large: {size} bytes, max allowed: {max} bytes")]
    BlockTooLarge { size: u64, max: u64 },

    #[error("Block gas {used} exceeds limit {limit}")]
    BlockGasLimitExceeded { used: u64, limit: u64 },

    #[error("Bad coinbase: {0}")]
    BadCoinbase(String),

    #[error("Block at height {height} must be proof-of-{expected}")]
    WrongBlockType { height: u64, expected: &'static str },

    #[error("Block bits {found:#010x} differ from required {expected:#010x}")]
    BadBits { expected: u32, found: u32 },

    #[error("Invalid proof of work")]
    InvalidProofOfWork,

    #[error("Missing coinstake transaction")]
    MissingCoinstake,

    #[error("Header stake does not match the coinstake input")]
    StakeMismatch,

    #[error("Stake {0:?} not found in the UTXO set")]
    StakeNotFound(OutPoint),

    #[error("Stake has depth {depth}, needs more than {required}")]
    StakeImmature { depth: u64, required: u64 },

    #[error("Stake kernel does not meet the target")]
    InvalidStakeKernel,

    #[error("Bad block signature")]
    BadBlockSignature,

    #[error("Invalid coinstake split: {0}")]
    InvalidCoinstakeSplit(String),

    #[error("Missing coinstake authorization: {0}")]
    MissingCoinstakeAuthorization(String),

    #[error("Unexpected coinstake call: {0}")]
    UnexpectedCoinstakeCall(String),

    #[error("Coinstake call in transaction {0} outside the coinstake")]
    CoinstakeCallOutsideCoinstake(Hash),

    #[error("Coinstake call failed: {0}")]
    CoinstakeCallFailed(ContractError),

    #[error("Invalid transaction {txid}: {reason}")]
    InvalidTransaction { txid: Hash, reason: String },

    #[error("No eligible stake in the search window")]
    NoEligibleStake,

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Mempool rejected transaction: {0}")]
    Mempool(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl ConsensusError {
    pub(crate) fn invalid_tx(txid: Hash, reason: impl Into<String>) -> Self {
        ConsensusError::InvalidTransaction {
            txid,
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for ConsensusError {
    fn from(err: anyhow::Error) -> Self {
        ConsensusError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for ConsensusError {
    fn from(err: serde_json::Error) -> Self {
        ConsensusError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
