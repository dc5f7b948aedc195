//! Hydra Governance System
//!
//! This crate implements the decentralized governance contracts: the DGP
//! (admins, parameters and votes), the price oracle and its trust link with
//! the DGP, and the economy registry of contract owners. Contracts are driven
//! through ABI-encoded calls dispatched by [`GovernanceState`].

pub mod abi;
pub mod admin;
pub mod calls;
pub mod config;
pub mod economy;
pub mod error;
pub mod oracle;
pub mod parameters;
pub mod state;
pub mod voting;

pub use admin::{AdminPair, AdminRegistry};
pub use calls::{DgpCall, EconomyCall, OracleCall};
pub use config::GovernanceConfig;
pub use economy::EconomyContract;
pub use error::{ContractError, ContractResult};
pub use oracle::{OracleBridge, PriceOracle, DEFAULT_BYTE_PRICE, DEFAULT_GAS_PRICE};
pub use parameters::{ParameterId, ParameterMetadata, ParameterStore};
pub use state::{CallContext, CallOrigin, DeployedContract, Deployment, GovernanceState};
pub use voting::{Proposal, ProposalId, ProposalOutcome, ProposalState, ProposalValue, VoteDirection, VoteManager, VotingStats};
