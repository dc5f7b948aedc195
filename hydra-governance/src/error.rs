//! Errors raised by governance contract calls.
//!
//! A contract error aborts only the call that raised it. The transaction
//! carrying the call is still mined; consensus decides separately whether the
//! enclosing block is valid.

use hydra_core::Address;
use thiserror::Error;

use crate::parameters::ParameterId;

/// Failure of a single contract call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("caller {0} is not authorized")]
    Unauthorized(Address),

    #[error("admins are already initialized")]
    AlreadyInitialized,

    #[error("admins are not initialized")]
    NotInitialized,

    #[error("a proposal for parameter {0} is already open")]
    ProposalAlreadyOpen(ParameterId),

    #[error("no active proposal")]
    NoActiveProposal,

    #[error("voting on proposal {0} is closed")]
    VotingClosed(u64),

    #[error("proposal {0} has not reached its expiration height")]
    VoteNotExpired(u64),

    #[error("votes can only be finished by the coinstake")]
    FinishOutsideCoinstake,

    #[error("operation is only allowed from the coinstake")]
    CoinstakeOnly,

    #[error("vote weight must be greater than zero")]
    InvalidVoteWeight,

    #[error("unknown parameter {0}")]
    UnknownParameter(u64),

    #[error("contract {contract} has no operation with selector {selector}")]
    UnknownOperation { contract: Address, selector: String },

    #[error("no contract at {0}")]
    UnknownContract(Address),

    #[error("malformed call data: {0}")]
    MalformedCall(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("oracle link between dgp and oracle is not trusted")]
    UntrustedOracle,
}

/// Result of a contract call.
pub type ContractResult<T> = std::result::Result<T, ContractError>;
