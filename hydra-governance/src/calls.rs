//! Decoding of governance contract calls into closed enums.
//!
//! Every call is decoded completely before any state is touched; an unknown
//! selector, a missing word or a dirty address word fails the call.

use hydra_core::Address;

use crate::abi::{self, split_call, ArgReader, CallBuilder, Selector, Word};
use crate::error::{ContractError, ContractResult};
use crate::parameters::ParameterId;
use crate::voting::{ProposalId, VoteDirection};

/// Selectors with fixed values on the wire.
pub mod selectors {
    use crate::abi::Selector;

    pub const INIT_ADMINS: Selector = Selector([0x7f, 0xd0, 0x5e, 0x2a]);
    pub const SET_ORACLE_ADDRESS: Selector = Selector([0x7a, 0xdb, 0xf9, 0x73]);
    pub const SET_DGP_ADDRESS: Selector = Selector([0x85, 0xd5, 0xf8, 0x82]);
    pub const CREATE_VOTE: Selector = Selector([0x70, 0xeb, 0x39, 0x01]);
    pub const VOTE: Selector = Selector([0x4b, 0x9f, 0x5c, 0x98]);
    pub const FINISH_VOTE: Selector = Selector([0x2a, 0xeb, 0xcb, 0xb6]);
    pub const HAS_VOTE_IN_PROGRESS: Selector = Selector([0x79, 0x69, 0x89, 0xe2]);
    pub const VOTES_FOR: Selector = Selector([0xc9, 0x4d, 0x6b, 0x17]);
    pub const VOTES_AGAINST: Selector = Selector([0x7d, 0x00, 0x7f, 0x49]);
    pub const GET_DGP_PARAM: Selector = Selector([0x2f, 0xc7, 0x8e, 0x4c]);
}

use selectors::*;

const SET_ADMINS: &str = "setAdmins(address,address)";
const IS_ADMIN: &str = "isAdmin(address)";

const DGP_SIGNATURES: &[&str] = &[
    SET_ADMINS,
    IS_ADMIN,
    "paramVoted(uint256)",
    "getVoteExpiration()",
    "currentVoteParam()",
    "currentVoteValue()",
    "currentVoteStartBlock()",
    "currentVoteBlocksExpiration()",
    "currentVoteCreator()",
    "getOracleAddress()",
];

const ORACLE_SIGNATURES: &[&str] = &[
    SET_ADMINS,
    IS_ADMIN,
    "setLocPrice(uint256)",
    "getLocPrice()",
    "getPrice()",
    "getBytePrice()",
    "getDgpAddress()",
    "pushParameter(uint256,uint256)",
];

const ADD_CONTRACT: &str = "addContract(address[],address[])";

const ECONOMY_SIGNATURES: &[&str] = &["contractOwners(address)", ADD_CONTRACT, "updateContract(address,address)"];

fn unknown(contract: &Address, selector: Selector) -> ContractError {
    ContractError::UnknownOperation {
        contract: *contract,
        selector: selector.to_string(),
    }
}

fn optional_uint(args: &mut ArgReader<'_>) -> ContractResult<Option<u64>> {
    if args.remaining() == 0 {
        Ok(None)
    } else {
        args.uint().map(Some)
    }
}

/// Operations of the DGP contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DgpCall {
    InitAdmins { main: Address, backup: Address },
    SetAdmins { main: Address, backup: Address },
    SetOracleAddress(Address),
    /// `value` is a uint word, or an address word for admin votes.
    CreateVote { parameter: ParameterId, value: Word, duration: u64 },
    Vote { proposal: Option<ProposalId>, direction: VoteDirection },
    FinishVote { proposal: Option<ProposalId> },
    HasVoteInProgress { parameter: Option<ParameterId> },
    VotesFor { proposal: Option<ProposalId> },
    VotesAgainst { proposal: Option<ProposalId> },
    GetDgpParam(ParameterId),
    ParamVoted(ParameterId),
    GetVoteExpiration,
    IsAdmin(Address),
    CurrentVoteParam,
    CurrentVoteValue,
    CurrentVoteStartBlock,
    CurrentVoteBlocksExpiration,
    CurrentVoteCreator,
    GetOracleAddress,
}

impl DgpCall {
    pub fn decode(contract: &Address, data: &[u8]) -> ContractResult<Self> {
        let (selector, mut args) = split_call(data)?;
        let call = match selector {
            INIT_ADMINS => DgpCall::InitAdmins {
                main: args.address()?,
                backup: args.address()?,
            },
            SET_ORACLE_ADDRESS => DgpCall::SetOracleAddress(args.address()?),
            CREATE_VOTE => DgpCall::CreateVote {
                parameter: ParameterId(args.uint()?),
                value: *args.word()?,
                duration: args.uint()?,
            },
            VOTE => match args.word_count() {
                1 => DgpCall::Vote {
                    proposal: None,
                    direction: VoteDirection::try_from(args.uint()?)?,
                },
                2 => DgpCall::Vote {
                    proposal: Some(args.uint()?),
                    direction: VoteDirection::try_from(args.uint()?)?,
                },
                n => return Err(ContractError::MalformedCall(format!("vote takes 1 or 2 words, got {}", n))),
            },
            FINISH_VOTE => DgpCall::FinishVote {
                proposal: optional_uint(&mut args)?,
            },
            HAS_VOTE_IN_PROGRESS => DgpCall::HasVoteInProgress {
                parameter: optional_uint(&mut args)?.map(ParameterId),
            },
            VOTES_FOR => DgpCall::VotesFor {
                proposal: optional_uint(&mut args)?,
            },
            VOTES_AGAINST => DgpCall::VotesAgainst {
                proposal: optional_uint(&mut args)?,
            },
            GET_DGP_PARAM => DgpCall::GetDgpParam(ParameterId(args.uint()?)),
            other => match abi::lookup(other, DGP_SIGNATURES) {
                Some(SET_ADMINS) => DgpCall::SetAdmins {
                    main: args.address()?,
                    backup: args.address()?,
                },
                Some(IS_ADMIN) => DgpCall::IsAdmin(args.address()?),
                Some("paramVoted(uint256)") => DgpCall::ParamVoted(ParameterId(args.uint()?)),
                Some("getVoteExpiration()") => DgpCall::GetVoteExpiration,
                Some("currentVoteParam()") => DgpCall::CurrentVoteParam,
                Some("currentVoteValue()") => DgpCall::CurrentVoteValue,
                Some("currentVoteStartBlock()") => DgpCall::CurrentVoteStartBlock,
                Some("currentVoteBlocksExpiration()") => DgpCall::CurrentVoteBlocksExpiration,
                Some("currentVoteCreator()") => DgpCall::CurrentVoteCreator,
                Some("getOracleAddress()") => DgpCall::GetOracleAddress,
                _ => return Err(unknown(contract, other)),
            },
        };
        args.finish()?;
        Ok(call)
    }

    /// Encodes the call as sent on the wire.
    pub fn encode(&self) -> Vec<u8> {
        fn named(signature: &str) -> CallBuilder {
            CallBuilder::new(Selector::from_signature(signature))
        }
        fn with_optional(builder: CallBuilder, value: Option<u64>) -> CallBuilder {
            match value {
                Some(value) => builder.uint(value),
                None => builder,
            }
        }

        let builder = match self {
            DgpCall::InitAdmins { main, backup } => CallBuilder::new(INIT_ADMINS).address(main).address(backup),
            DgpCall::SetAdmins { main, backup } => named(SET_ADMINS).address(main).address(backup),
            DgpCall::SetOracleAddress(address) => CallBuilder::new(SET_ORACLE_ADDRESS).address(address),
            DgpCall::CreateVote { parameter, value, duration } => {
                let mut data = CallBuilder::new(CREATE_VOTE).uint(parameter.0).build();
                data.extend_from_slice(value);
                data.extend_from_slice(&abi::uint_word(*duration));
                return data;
            }
            DgpCall::Vote { proposal, direction } => {
                with_optional(CallBuilder::new(VOTE), *proposal).bool(*direction == VoteDirection::For)
            }
            DgpCall::FinishVote { proposal } => with_optional(CallBuilder::new(FINISH_VOTE), *proposal),
            DgpCall::HasVoteInProgress { parameter } => {
                with_optional(CallBuilder::new(HAS_VOTE_IN_PROGRESS), parameter.map(|p| p.0))
            }
            DgpCall::VotesFor { proposal } => with_optional(CallBuilder::new(VOTES_FOR), *proposal),
            DgpCall::VotesAgainst { proposal } => with_optional(CallBuilder::new(VOTES_AGAINST), *proposal),
            DgpCall::GetDgpParam(parameter) => CallBuilder::new(GET_DGP_PARAM).uint(parameter.0),
            DgpCall::ParamVoted(parameter) => named("paramVoted(uint256)").uint(parameter.0),
            DgpCall::GetVoteExpiration => named("getVoteExpiration()"),
            DgpCall::IsAdmin(address) => named(IS_ADMIN).address(address),
            DgpCall::CurrentVoteParam => named("currentVoteParam()"),
            DgpCall::CurrentVoteValue => named("currentVoteValue()"),
            DgpCall::CurrentVoteStartBlock => named("currentVoteStartBlock()"),
            DgpCall::CurrentVoteBlocksExpiration => named("currentVoteBlocksExpiration()"),
            DgpCall::CurrentVoteCreator => named("currentVoteCreator()"),
            DgpCall::GetOracleAddress => named("getOracleAddress()"),
        };
        builder.build()
    }
}

/// Operations of the price oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleCall {
    InitAdmins { main: Address, backup: Address },
    SetAdmins { main: Address, backup: Address },
    SetDgpAddress(Address),
    SetLocPrice(u64),
    GetLocPrice,
    GetPrice,
    GetBytePrice,
    GetDgpAddress,
    IsAdmin(Address),
    PushParameter { parameter: ParameterId, value: u64 },
}

impl OracleCall {
    pub fn decode(contract: &Address, data: &[u8]) -> ContractResult<Self> {
        let (selector, mut args) = split_call(data)?;
        let call = match selector {
            INIT_ADMINS => OracleCall::InitAdmins {
                main: args.address()?,
                backup: args.address()?,
            },
            SET_DGP_ADDRESS => OracleCall::SetDgpAddress(args.address()?),
            other => match abi::lookup(other, ORACLE_SIGNATURES) {
                Some(SET_ADMINS) => OracleCall::SetAdmins {
                    main: args.address()?,
                    backup: args.address()?,
                },
                Some(IS_ADMIN) => OracleCall::IsAdmin(args.address()?),
                Some("setLocPrice(uint256)") => OracleCall::SetLocPrice(args.uint()?),
                Some("getLocPrice()") => OracleCall::GetLocPrice,
                Some("getPrice()") => OracleCall::GetPrice,
                Some("getBytePrice()") => OracleCall::GetBytePrice,
                Some("getDgpAddress()") => OracleCall::GetDgpAddress,
                Some("pushParameter(uint256,uint256)") => OracleCall::PushParameter {
                    parameter: ParameterId(args.uint()?),
                    value: args.uint()?,
                },
                _ => return Err(unknown(contract, other)),
            },
        };
        args.finish()?;
        Ok(call)
    }

    pub fn encode(&self) -> Vec<u8> {
        let named = |signature: &str| CallBuilder::new(Selector::from_signature(signature));
        let builder = match self {
            OracleCall::InitAdmins { main, backup } => CallBuilder::new(INIT_ADMINS).address(main).address(backup),
            OracleCall::SetAdmins { main, backup } => named(SET_ADMINS).address(main).address(backup),
            OracleCall::SetDgpAddress(address) => CallBuilder::new(SET_DGP_ADDRESS).address(address),
            OracleCall::SetLocPrice(cents) => named("setLocPrice(uint256)").uint(*cents),
            OracleCall::GetLocPrice => named("getLocPrice()"),
            OracleCall::GetPrice => named("getPrice()"),
            OracleCall::GetBytePrice => named("getBytePrice()"),
            OracleCall::GetDgpAddress => named("getDgpAddress()"),
            OracleCall::IsAdmin(address) => named(IS_ADMIN).address(address),
            OracleCall::PushParameter { parameter, value } => {
                named("pushParameter(uint256,uint256)").uint(parameter.0).uint(*value)
            }
        };
        builder.build()
    }
}

/// Operations of the economy contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EconomyCall {
    ContractOwners(Address),
    AddContract { contracts: Vec<Address>, owners: Vec<Address> },
    UpdateContract { contract: Address, owner: Address },
}

impl EconomyCall {
    pub fn decode(contract: &Address, data: &[u8]) -> ContractResult<Self> {
        let (selector, mut args) = split_call(data)?;
        match abi::lookup(selector, ECONOMY_SIGNATURES) {
            Some("contractOwners(address)") => {
                let call = EconomyCall::ContractOwners(args.address()?);
                args.finish()?;
                Ok(call)
            }
            // array tails follow the heads, so trailing words are expected
            Some(ADD_CONTRACT) => {
                let contracts = args.address_array()?;
                let owners = args.address_array()?;
                if contracts.len() != owners.len() {
                    return Err(ContractError::MalformedCall(format!(
                        "{} contracts but {} owners",
                        contracts.len(),
                        owners.len()
                    )));
                }
                Ok(EconomyCall::AddContract { contracts, owners })
            }
            Some("updateContract(address,address)") => {
                let call = EconomyCall::UpdateContract {
                    contract: args.address()?,
                    owner: args.address()?,
                };
                args.finish()?;
                Ok(call)
            }
            _ => Err(unknown(contract, selector)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            EconomyCall::ContractOwners(address) => {
                CallBuilder::new(Selector::from_signature("contractOwners(address)")).address(address).build()
            }
            EconomyCall::AddContract { contracts, owners } => CallBuilder::new(Selector::from_signature(ADD_CONTRACT))
                .address_arrays(&[contracts.as_slice(), owners.as_slice()])
                .build(),
            EconomyCall::UpdateContract { contract, owner } => {
                CallBuilder::new(Selector::from_signature("updateContract(address,address)"))
                    .address(contract)
                    .address(owner)
                    .build()
            }
        }
    }
}
