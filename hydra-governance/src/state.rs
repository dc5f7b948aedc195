//! Governance state and call dispatch.
//!
//! `GovernanceState` owns every governance contract plus the accounts of
//! user-deployed contracts. It is plain data and cheap enough to clone, which
//! consensus relies on to stage a whole block and commit or discard it.

use std::collections::BTreeMap;

use hydra_core::{Address, Hash};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::abi::{encode_address, encode_bool, encode_uint, word_to_address, word_to_uint};
use crate::admin::AdminRegistry;
use crate::calls::{DgpCall, EconomyCall, OracleCall};
use crate::config::GovernanceConfig;
use crate::economy::EconomyContract;
use crate::error::{ContractError, ContractResult};
use crate::oracle::{OracleBridge, PriceOracle};
use crate::parameters::{ParameterId, ParameterStore};
use crate::voting::{ProposalValue, VoteManager};

/// Where a call comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    /// A `Call` output of a regular transaction.
    Transaction,
    /// A coinstake call appended by the block producer.
    Coinstake,
    /// A read-only query; state changes are discarded.
    Static,
}

/// Execution context of one contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub sender: Address,
    /// Value attached to the call, in satoshi.
    pub value: u64,
    /// Height of the block the call executes in.
    pub height: u64,
    pub origin: CallOrigin,
}

impl CallContext {
    pub fn transaction(sender: Address, value: u64, height: u64) -> Self {
        Self {
            sender,
            value,
            height,
            origin: CallOrigin::Transaction,
        }
    }

    pub fn coinstake(height: u64) -> Self {
        Self {
            sender: Address::zero(),
            value: 0,
            height,
            origin: CallOrigin::Coinstake,
        }
    }

    pub fn static_call(height: u64) -> Self {
        Self {
            sender: Address::zero(),
            value: 0,
            height,
            origin: CallOrigin::Static,
        }
    }
}

/// Account of a contract deployed by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub creator: Address,
    pub code_hash: Hash,
    pub balance: u64,
    pub deployed_at: u64,
}

/// A contract deployed in a block, awaiting owner registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub contract: Address,
    pub owner: Address,
}

/// All governance contracts and contract accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceState {
    config: GovernanceConfig,
    dgp_admins: AdminRegistry,
    oracle_admins: AdminRegistry,
    parameters: ParameterStore,
    votes: VoteManager,
    bridge: OracleBridge,
    oracle: PriceOracle,
    economy: EconomyContract,
    contracts: BTreeMap<Address, DeployedContract>,
    /// Value held by the system contracts (vote weights, mostly).
    system_balances: BTreeMap<Address, u64>,
}

impl GovernanceState {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            config,
            dgp_admins: AdminRegistry::new(),
            oracle_admins: AdminRegistry::new(),
            parameters: ParameterStore::new(),
            votes: VoteManager::new(),
            bridge: OracleBridge::new(),
            oracle: PriceOracle::new(),
            economy: EconomyContract::new(),
            contracts: BTreeMap::new(),
            system_balances: BTreeMap::new(),
        }
    }

    /// Executes a call. Handlers check everything before they write, so on
    /// error nothing changes. Static calls run on a scratch copy.
    pub fn execute(&mut self, ctx: &CallContext, contract: &Address, data: &[u8]) -> ContractResult<Vec<u8>> {
        if ctx.origin == CallOrigin::Static {
            return self.clone().dispatch(ctx, contract, data);
        }
        self.dispatch(ctx, contract, data)
    }

    /// Read-only call at `height`.
    pub fn call_static(&self, contract: &Address, data: &[u8], height: u64) -> ContractResult<Vec<u8>> {
        self.clone().dispatch(&CallContext::static_call(height), contract, data)
    }

    fn dispatch(&mut self, ctx: &CallContext, contract: &Address, data: &[u8]) -> ContractResult<Vec<u8>> {
        let output = if *contract == self.config.dgp_address {
            let call = DgpCall::decode(contract, data)?;
            debug!("DGP call {:?} from {} at height {}", call, ctx.sender, ctx.height);
            self.execute_dgp(ctx, call)?
        } else if *contract == self.config.oracle_address {
            let call = OracleCall::decode(contract, data)?;
            debug!("Oracle call {:?} from {}", call, ctx.sender);
            self.execute_oracle(ctx, call)?
        } else if *contract == self.config.economy_address {
            let call = EconomyCall::decode(contract, data)?;
            debug!("Economy call {:?} from {}", call, ctx.sender);
            self.execute_economy(ctx, call)?
        } else {
            let account = self.contracts.get_mut(contract).ok_or(ContractError::UnknownContract(*contract))?;
            account.balance = account
                .balance
                .checked_add(ctx.value)
                .ok_or_else(|| ContractError::InvalidArgument("contract balance overflow".to_string()))?;
            return Ok(Vec::new());
        };

        if ctx.value > 0 {
            let balance = self.system_balances.entry(*contract).or_insert(0);
            *balance = balance.saturating_add(ctx.value);
        }
        Ok(output)
    }

    fn execute_dgp(&mut self, ctx: &CallContext, call: DgpCall) -> ContractResult<Vec<u8>> {
        let output = match call {
            DgpCall::InitAdmins { main, backup } => {
                self.dgp_admins.initialize(main, backup)?;
                Vec::new()
            }
            DgpCall::SetAdmins { main, backup } => {
                self.dgp_admins
                    .set_admins(&ctx.sender, main, backup, self.config.backup_may_set_admins)?;
                Vec::new()
            }
            DgpCall::SetOracleAddress(oracle) => {
                self.bridge.set_oracle_address(&self.dgp_admins, &ctx.sender, oracle)?;
                Vec::new()
            }
            DgpCall::CreateVote { parameter, value, duration } => {
                if duration > self.config.max_vote_duration {
                    return Err(ContractError::InvalidArgument(format!(
                        "vote duration {} exceeds {}",
                        duration, self.config.max_vote_duration
                    )));
                }
                let value = if parameter.is_admin_vote() {
                    ProposalValue::Admin(word_to_address(&value)?)
                } else {
                    ProposalValue::Amount(word_to_uint(&value)?)
                };
                let id = self
                    .votes
                    .create_vote(&self.dgp_admins, &ctx.sender, parameter, value, duration, ctx.height)?;
                encode_uint(id)
            }
            DgpCall::Vote { proposal, direction } => {
                self.votes.vote(&ctx.sender, proposal, direction, ctx.value, ctx.height)?;
                Vec::new()
            }
            DgpCall::FinishVote { proposal } => {
                let finished = self.votes.finish(
                    proposal,
                    ctx.height,
                    ctx.origin == CallOrigin::Coinstake,
                    &mut self.parameters,
                    &mut self.dgp_admins,
                )?;
                encode_uint(finished.len() as u64)
            }
            DgpCall::HasVoteInProgress { parameter } => encode_bool(self.votes.has_vote_in_progress(parameter, ctx.height)),
            DgpCall::VotesFor { proposal } => encode_uint(self.votes.votes_for(proposal)?),
            DgpCall::VotesAgainst { proposal } => encode_uint(self.votes.votes_against(proposal)?),
            DgpCall::GetDgpParam(parameter) => encode_uint(self.parameters.get(parameter)?),
            DgpCall::ParamVoted(parameter) => {
                self.parameters.get(parameter)?;
                encode_bool(self.parameters.is_voted(parameter))
            }
            DgpCall::GetVoteExpiration => encode_uint(self.votes.current().map(|p| p.expiration()).unwrap_or(0)),
            DgpCall::IsAdmin(address) => encode_bool(self.dgp_admins.is_admin(&address)),
            DgpCall::CurrentVoteParam => encode_uint(self.current_vote()?.parameter.0),
            DgpCall::CurrentVoteValue => match self.current_vote()?.value {
                ProposalValue::Amount(amount) => encode_uint(amount),
                ProposalValue::Admin(address) => encode_address(&address),
            },
            DgpCall::CurrentVoteStartBlock => encode_uint(self.current_vote()?.created_at),
            DgpCall::CurrentVoteBlocksExpiration => encode_uint(self.current_vote()?.duration),
            DgpCall::CurrentVoteCreator => encode_address(&self.current_vote()?.creator),
            DgpCall::GetOracleAddress => encode_address(&self.bridge.oracle_address().unwrap_or_else(Address::zero)),
        };
        Ok(output)
    }

    fn current_vote(&self) -> ContractResult<&crate::voting::Proposal> {
        self.votes.current().ok_or(ContractError::NoActiveProposal)
    }

    fn execute_oracle(&mut self, ctx: &CallContext, call: OracleCall) -> ContractResult<Vec<u8>> {
        let output = match call {
            OracleCall::InitAdmins { main, backup } => {
                self.oracle_admins.initialize(main, backup)?;
                Vec::new()
            }
            OracleCall::SetAdmins { main, backup } => {
                self.oracle_admins
                    .set_admins(&ctx.sender, main, backup, self.config.backup_may_set_admins)?;
                Vec::new()
            }
            OracleCall::SetDgpAddress(dgp) => {
                self.bridge.set_dgp_address(&self.oracle_admins, &ctx.sender, dgp)?;
                Vec::new()
            }
            OracleCall::SetLocPrice(cents) => {
                self.oracle.set_coin_price(&self.oracle_admins, &ctx.sender, cents)?;
                Vec::new()
            }
            OracleCall::GetLocPrice => encode_uint(self.oracle.coin_price_cents()),
            OracleCall::GetPrice => encode_uint(self.min_gas_price()),
            OracleCall::GetBytePrice => encode_uint(self.min_byte_price()),
            OracleCall::GetDgpAddress => encode_address(&self.bridge.dgp_address().unwrap_or_else(Address::zero)),
            OracleCall::IsAdmin(address) => encode_bool(self.oracle_admins.is_admin(&address)),
            OracleCall::PushParameter { parameter, value } => {
                self.push_parameter(ctx, parameter, value)?;
                Vec::new()
            }
        };
        Ok(output)
    }

    fn push_parameter(&mut self, ctx: &CallContext, parameter: ParameterId, value: u64) -> ContractResult<()> {
        if !self.config.oracle_parameter_override {
            return Err(ContractError::InvalidArgument("oracle parameter override is disabled".to_string()));
        }
        if !self.oracle_admins.is_admin(&ctx.sender) {
            return Err(ContractError::Unauthorized(ctx.sender));
        }
        if !self.bridge.is_trusted(&self.config) {
            return Err(ContractError::UntrustedOracle);
        }
        if parameter != ParameterId::FIAT_GAS_PRICE && parameter != ParameterId::FIAT_BYTE_PRICE {
            return Err(ContractError::InvalidArgument(format!("oracle cannot set parameter {}", parameter)));
        }
        self.parameters.apply(parameter, value)?;
        info!("Oracle admin {} pushed parameter {} = {}", ctx.sender, parameter, value);
        Ok(())
    }

    fn execute_economy(&mut self, ctx: &CallContext, call: EconomyCall) -> ContractResult<Vec<u8>> {
        let output = match call {
            EconomyCall::ContractOwners(contract) => encode_address(&self.economy.contract_owner(&contract)),
            EconomyCall::AddContract { contracts, owners } => {
                let deployed = &self.contracts;
                self.economy.add_contracts(
                    ctx.origin == CallOrigin::Coinstake,
                    &contracts,
                    &owners,
                    |contract| deployed.contains_key(contract),
                )?;
                Vec::new()
            }
            EconomyCall::UpdateContract { contract, owner } => {
                self.economy.update_contract(&ctx.sender, &contract, owner)?;
                Vec::new()
            }
        };
        Ok(output)
    }

    /// Creates the account of a contract deployed by a transaction.
    pub fn deploy_contract(&mut self, address: Address, creator: Address, code: &[u8], value: u64, height: u64) -> ContractResult<()> {
        if self.config.is_system_contract(&address) || self.contracts.contains_key(&address) {
            return Err(ContractError::InvalidArgument(format!("address {} is taken", address)));
        }
        self.contracts.insert(
            address,
            DeployedContract {
                creator,
                code_hash: Hash::sha256(code),
                balance: value,
                deployed_at: height,
            },
        );
        info!("Contract {} deployed by {} at height {}", address, creator, height);
        Ok(())
    }

    /// Coinstake calls a block at `height` must carry, in order:
    /// `addContract` for the block's deployments, then `finishVote` when a
    /// proposal's voting window has elapsed.
    pub fn required_coinstake_calls(&self, height: u64, deployments: &[Deployment]) -> Vec<(Address, Vec<u8>)> {
        let mut calls = Vec::new();
        if !deployments.is_empty() {
            let call = EconomyCall::AddContract {
                contracts: deployments.iter().map(|d| d.contract).collect(),
                owners: deployments.iter().map(|d| d.owner).collect(),
            };
            calls.push((self.config.economy_address, call.encode()));
        }
        if self.has_vote_finishing(height) {
            calls.push((self.config.dgp_address, DgpCall::FinishVote { proposal: None }.encode()));
        }
        calls
    }

    /// True if some proposal's window has elapsed and awaits the coinstake.
    pub fn has_vote_finishing(&self, height: u64) -> bool {
        !self.votes.finishable(height).is_empty()
    }

    /// Minimum gas price in satoshi.
    pub fn min_gas_price(&self) -> u64 {
        self.oracle.gas_price(&self.bridge, &self.config, &self.parameters)
    }

    /// Minimum price per transaction byte in satoshi.
    pub fn min_byte_price(&self) -> u64 {
        self.oracle.byte_price(&self.bridge, &self.config, &self.parameters)
    }

    pub fn burn_rate(&self) -> u64 {
        self.parameters.burn_rate()
    }

    /// Percent of a call's gas fee paid to the called contract's owner.
    pub fn dividend_rate(&self) -> u64 {
        self.parameters.economy_dividend()
    }

    /// Owner entitled to dividends from calls to `contract`, if any.
    pub fn dividend_owner(&self, contract: &Address) -> Option<Address> {
        Some(self.economy.contract_owner(contract)).filter(|owner| !owner.is_zero())
    }

    pub fn block_size_limit(&self) -> u64 {
        self.parameters.block_size()
    }

    pub fn block_gas_limit(&self) -> u64 {
        self.parameters.block_gas_limit()
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn dgp_admins(&self) -> &AdminRegistry {
        &self.dgp_admins
    }

    pub fn oracle_admins(&self) -> &AdminRegistry {
        &self.oracle_admins
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn votes(&self) -> &VoteManager {
        &self.votes
    }

    pub fn bridge(&self) -> &OracleBridge {
        &self.bridge
    }

    pub fn economy(&self) -> &EconomyContract {
        &self.economy
    }

    pub fn contract(&self, address: &Address) -> Option<&DeployedContract> {
        self.contracts.get(address)
    }

    /// Value held by a system contract.
    pub fn system_balance(&self, address: &Address) -> u64 {
        self.system_balances.get(address).copied().unwrap_or(0)
    }
}

impl Default for GovernanceState {
    fn default() -> Self {
        Self::new(GovernanceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn initialized() -> GovernanceState {
        let mut state = GovernanceState::default();
        let dgp = state.config().dgp_address;
        let call = DgpCall::InitAdmins { main: addr(1), backup: addr(2) }.encode();
        state.execute(&CallContext::transaction(addr(1), 0, 10), &dgp, &call).unwrap();
        state
    }

    #[test]
    fn test_failed_call_leaves_state_untouched() {
        let mut state = initialized();
        let before = state.clone();
        let dgp = state.config().dgp_address;
        let call = DgpCall::InitAdmins { main: addr(5), backup: addr(6) }.encode();
        let result = state.execute(&CallContext::transaction(addr(5), 100, 11), &dgp, &call);
        assert_eq!(result, Err(ContractError::AlreadyInitialized));
        assert_eq!(state, before);
    }

    #[test]
    fn test_rejected_calls_do_not_write() {
        let mut state = initialized();
        let dgp = state.config().dgp_address;
        let economy = state.config().economy_address;
        let create = DgpCall::CreateVote {
            parameter: ParameterId::BURN_RATE,
            value: crate::abi::uint_word(10),
            duration: 2,
        };
        state.execute(&CallContext::transaction(addr(1), 0, 20), &dgp, &create.encode()).unwrap();
        let before = state.clone();

        // vote after the window, finish from a transaction, unpaired economy arrays
        let vote = DgpCall::Vote { proposal: Some(1), direction: crate::voting::VoteDirection::For }.encode();
        assert_eq!(
            state.execute(&CallContext::transaction(addr(3), 7, 22), &dgp, &vote),
            Err(ContractError::VotingClosed(1))
        );
        let finish = DgpCall::FinishVote { proposal: None }.encode();
        assert_eq!(
            state.execute(&CallContext::transaction(addr(3), 7, 22), &dgp, &finish),
            Err(ContractError::FinishOutsideCoinstake)
        );
        let add = EconomyCall::AddContract { contracts: vec![addr(0x500)], owners: vec![addr(3)] }.encode();
        assert_eq!(
            state.execute(&CallContext::coinstake(22), &economy, &add),
            Err(ContractError::UnknownContract(addr(0x500)))
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_static_call_discards_changes() {
        let state = initialized();
        let dgp = state.config().dgp_address;
        let output = state
            .call_static(&dgp, &hex!("2fc78e4c 0000000000000000000000000000000000000000000000000000000000000007"), 11)
            .unwrap();
        assert_eq!(output, encode_uint(1000));

        let mut state = state;
        let before = state.clone();
        let create = DgpCall::CreateVote {
            parameter: ParameterId::BURN_RATE,
            value: crate::abi::uint_word(10),
            duration: 5,
        };
        let ctx = CallContext { sender: addr(1), ..CallContext::static_call(11) };
        assert_eq!(state.execute(&ctx, &dgp, &create.encode()).unwrap(), encode_uint(1));
        assert_eq!(state, before);
    }

    #[test]
    fn test_vote_weight_is_attached_value() {
        let mut state = initialized();
        let dgp = state.config().dgp_address;
        let create = DgpCall::CreateVote {
            parameter: ParameterId::BURN_RATE,
            value: crate::abi::uint_word(10),
            duration: 5,
        };
        state.execute(&CallContext::transaction(addr(1), 0, 20), &dgp, &create.encode()).unwrap();

        let vote = DgpCall::Vote { proposal: None, direction: crate::voting::VoteDirection::For }.encode();
        assert_eq!(
            state.execute(&CallContext::transaction(addr(3), 0, 21), &dgp, &vote),
            Err(ContractError::InvalidVoteWeight)
        );
        state.execute(&CallContext::transaction(addr(3), 25, 21), &dgp, &vote).unwrap();
        assert_eq!(state.votes().votes_for(None).unwrap(), 25);
        assert_eq!(state.system_balance(&dgp), 25);
    }

    #[test]
    fn test_required_calls_order() {
        let mut state = initialized();
        let dgp = state.config().dgp_address;
        let create = DgpCall::CreateVote {
            parameter: ParameterId::BURN_RATE,
            value: crate::abi::uint_word(10),
            duration: 2,
        };
        state.execute(&CallContext::transaction(addr(1), 0, 20), &dgp, &create.encode()).unwrap();

        let deployment = Deployment { contract: addr(0x500), owner: addr(3) };
        assert_eq!(state.required_coinstake_calls(21, &[]), Vec::new());
        let calls = state.required_coinstake_calls(22, &[deployment]);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, state.config().economy_address);
        assert_eq!(calls[1], (dgp, hex!("2aebcbb6").to_vec()));
    }

    #[test]
    fn test_add_contract_from_transaction_reverts() {
        let mut state = initialized();
        state.deploy_contract(addr(0x500), addr(3), b"code", 0, 30).unwrap();
        let economy = state.config().economy_address;
        let call = EconomyCall::AddContract { contracts: vec![addr(0x500)], owners: vec![addr(3)] }.encode();
        assert_eq!(
            state.execute(&CallContext::transaction(addr(3), 0, 31), &economy, &call),
            Err(ContractError::CoinstakeOnly)
        );
        state.execute(&CallContext::coinstake(31), &economy, &call).unwrap();
        assert_eq!(state.economy().contract_owner(&addr(0x500)), addr(3));
    }

    #[test]
    fn test_oracle_override_is_gated() {
        let mut config = GovernanceConfig::default();
        config.oracle_parameter_override = true;
        let mut state = GovernanceState::new(config.clone());
        let (dgp, oracle) = (config.dgp_address, config.oracle_address);
        let ctx = |sender| CallContext::transaction(sender, 0, 5);

        state.execute(&ctx(addr(1)), &dgp, &DgpCall::InitAdmins { main: addr(1), backup: addr(2) }.encode()).unwrap();
        state.execute(&ctx(addr(7)), &oracle, &OracleCall::InitAdmins { main: addr(7), backup: addr(8) }.encode()).unwrap();

        let push = OracleCall::PushParameter { parameter: ParameterId::FIAT_GAS_PRICE, value: 5_000 }.encode();
        assert_eq!(state.execute(&ctx(addr(7)), &oracle, &push), Err(ContractError::UntrustedOracle));

        state.execute(&ctx(addr(1)), &dgp, &DgpCall::SetOracleAddress(oracle).encode()).unwrap();
        state.execute(&ctx(addr(7)), &oracle, &OracleCall::SetDgpAddress(dgp).encode()).unwrap();
        assert!(state.bridge().is_trusted(state.config()));

        assert_eq!(state.execute(&ctx(addr(1)), &oracle, &push), Err(ContractError::Unauthorized(addr(1))));
        state.execute(&ctx(addr(7)), &oracle, &push).unwrap();
        assert_eq!(state.parameters().fiat_gas_price(), 5_000);
    }

    #[test]
    fn test_unknown_user_contract() {
        let mut state = GovernanceState::default();
        assert_eq!(
            state.execute(&CallContext::transaction(addr(1), 5, 1), &addr(0x777), &[]),
            Err(ContractError::UnknownContract(addr(0x777)))
        );
    }
}
