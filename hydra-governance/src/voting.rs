//! Proposal lifecycle and vote tallying.
//!
//! ```text
//! Open --finish, for > against--> Applied
//! Open --finish, otherwise-----> Rejected
//! Open --finish, no votes------> Expired
//! ```
//!
//! A proposal accepts votes while `height < created_at + duration`. Once that
//! height is reached only the coinstake can finish it.

use std::collections::BTreeMap;

use hydra_core::Address;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::admin::AdminRegistry;
use crate::error::{ContractError, ContractResult};
use crate::parameters::{ParameterId, ParameterStore};

/// Sequential proposal number, starting at 1.
pub type ProposalId = u64;

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteDirection {
    Against,
    For,
}

impl TryFrom<u64> for VoteDirection {
    type Error = ContractError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VoteDirection::Against),
            1 => Ok(VoteDirection::For),
            other => Err(ContractError::InvalidArgument(format!("vote direction must be 0 or 1, got {}", other))),
        }
    }
}

/// Value a proposal would apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalValue {
    Amount(u64),
    Admin(Address),
}

/// Lifecycle state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    Open,
    Applied,
    Rejected,
    Expired,
}

/// Possible outcomes for a finished proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalOutcome {
    Applied,
    Rejected,
    Expired,
}

impl From<ProposalOutcome> for ProposalState {
    fn from(outcome: ProposalOutcome) -> Self {
        match outcome {
            ProposalOutcome::Applied => ProposalState::Applied,
            ProposalOutcome::Rejected => ProposalState::Rejected,
            ProposalOutcome::Expired => ProposalState::Expired,
        }
    }
}

/// Accumulated weight one voter has cast on a proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub weight_for: u64,
    pub weight_against: u64,
}

/// A parameter change put to vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub parameter: ParameterId,
    pub value: ProposalValue,
    pub duration: u64,
    pub created_at: u64,
    pub creator: Address,
    pub votes_for: u64,
    pub votes_against: u64,
    pub state: ProposalState,
    pub ballots: BTreeMap<Address, Ballot>,
}

impl Proposal {
    /// First height at which voting is closed and the proposal can finish.
    pub fn expiration(&self) -> u64 {
        self.created_at.saturating_add(self.duration)
    }

    pub fn is_open(&self) -> bool {
        self.state == ProposalState::Open
    }

    pub fn accepts_votes(&self, height: u64) -> bool {
        self.is_open() && height < self.expiration()
    }

    pub fn is_finishable(&self, height: u64) -> bool {
        self.is_open() && height >= self.expiration()
    }

    fn outcome(&self) -> ProposalOutcome {
        if self.votes_for == 0 && self.votes_against == 0 {
            ProposalOutcome::Expired
        } else if self.votes_for > self.votes_against {
            ProposalOutcome::Applied
        } else {
            ProposalOutcome::Rejected
        }
    }
}

/// Snapshot of vote manager activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VotingStats {
    pub total_proposals: usize,
    pub open: usize,
    pub applied: usize,
    pub rejected: usize,
    pub expired: usize,
}

/// Owns every proposal and enforces one open proposal per parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteManager {
    proposals: BTreeMap<ProposalId, Proposal>,
    open_by_parameter: BTreeMap<ParameterId, ProposalId>,
    next_id: ProposalId,
    /// Most recently created proposal; the target of id-less calls.
    current: Option<ProposalId>,
}

impl Default for VoteManager {
    fn default() -> Self {
        Self {
            proposals: BTreeMap::new(),
            open_by_parameter: BTreeMap::new(),
            next_id: 1,
            current: None,
        }
    }
}

impl VoteManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a proposal. The caller must be an admin and the parameter must
    /// not already have an open proposal.
    pub fn create_vote(
        &mut self,
        admins: &AdminRegistry,
        caller: &Address,
        parameter: ParameterId,
        value: ProposalValue,
        duration: u64,
        height: u64,
    ) -> ContractResult<ProposalId> {
        if !admins.is_admin(caller) {
            return Err(ContractError::Unauthorized(*caller));
        }
        if parameter.metadata().is_none() {
            return Err(ContractError::UnknownParameter(parameter.0));
        }
        if duration == 0 {
            return Err(ContractError::InvalidArgument("vote duration must be at least one block".to_string()));
        }
        match (parameter.is_admin_vote(), value) {
            (true, ProposalValue::Admin(address)) if !address.is_zero() => {}
            (false, ProposalValue::Amount(_)) => {}
            _ => {
                return Err(ContractError::InvalidArgument(format!(
                    "value {:?} does not fit parameter {}",
                    value, parameter
                )))
            }
        }
        if self.open_by_parameter.contains_key(&parameter) {
            return Err(ContractError::ProposalAlreadyOpen(parameter));
        }

        let id = self.next_id;
        self.next_id += 1;
        self.proposals.insert(
            id,
            Proposal {
                id,
                parameter,
                value,
                duration,
                created_at: height,
                creator: *caller,
                votes_for: 0,
                votes_against: 0,
                state: ProposalState::Open,
                ballots: BTreeMap::new(),
            },
        );
        self.open_by_parameter.insert(parameter, id);
        self.current = Some(id);

        info!(
            "Proposal {} created by {}: parameter {} -> {:?}, voting until height {}",
            id,
            caller,
            parameter,
            value,
            height.saturating_add(duration)
        );
        Ok(id)
    }

    /// Adds `weight` to one side of a proposal. Repeated votes from the same
    /// voter accumulate on both sides.
    pub fn vote(
        &mut self,
        voter: &Address,
        proposal: Option<ProposalId>,
        direction: VoteDirection,
        weight: u64,
        height: u64,
    ) -> ContractResult<()> {
        if weight == 0 {
            return Err(ContractError::InvalidVoteWeight);
        }
        let id = proposal.or(self.current).ok_or(ContractError::NoActiveProposal)?;
        let entry = self.proposals.get_mut(&id).ok_or(ContractError::NoActiveProposal)?;
        if !entry.is_open() {
            return Err(ContractError::NoActiveProposal);
        }
        if !entry.accepts_votes(height) {
            return Err(ContractError::VotingClosed(id));
        }

        let tally = match direction {
            VoteDirection::For => &mut entry.votes_for,
            VoteDirection::Against => &mut entry.votes_against,
        };
        *tally = tally
            .checked_add(weight)
            .ok_or_else(|| ContractError::InvalidArgument("vote tally overflow".to_string()))?;
        let ballot = entry.ballots.entry(*voter).or_default();
        let own = match direction {
            VoteDirection::For => &mut ballot.weight_for,
            VoteDirection::Against => &mut ballot.weight_against,
        };
        *own = own.saturating_add(weight);

        debug!("{} voted {:?} on proposal {} with weight {}", voter, direction, id, weight);
        Ok(())
    }

    /// True if a proposal (for `parameter`, or any) still accepts votes.
    pub fn has_vote_in_progress(&self, parameter: Option<ParameterId>, height: u64) -> bool {
        match parameter {
            Some(parameter) => self
                .open_by_parameter
                .get(&parameter)
                .and_then(|id| self.proposals.get(id))
                .map(|proposal| proposal.accepts_votes(height))
                .unwrap_or(false),
            None => self
                .open_by_parameter
                .values()
                .filter_map(|id| self.proposals.get(id))
                .any(|proposal| proposal.accepts_votes(height)),
        }
    }

    /// Open proposals whose window has elapsed at `height`.
    pub fn finishable(&self, height: u64) -> Vec<ProposalId> {
        self.open_by_parameter
            .values()
            .filter_map(|id| self.proposals.get(id))
            .filter(|proposal| proposal.is_finishable(height))
            .map(|proposal| proposal.id)
            .collect()
    }

    /// Closes one proposal, or every finishable one when `proposal` is `None`,
    /// and applies the winners. Only valid from the coinstake.
    pub fn finish(
        &mut self,
        proposal: Option<ProposalId>,
        height: u64,
        from_coinstake: bool,
        parameters: &mut ParameterStore,
        admins: &mut AdminRegistry,
    ) -> ContractResult<Vec<(ProposalId, ProposalOutcome)>> {
        if !from_coinstake {
            return Err(ContractError::FinishOutsideCoinstake);
        }

        let targets = match proposal {
            Some(id) => {
                let entry = self.proposals.get(&id).filter(|p| p.is_open()).ok_or(ContractError::NoActiveProposal)?;
                if !entry.is_finishable(height) {
                    return Err(ContractError::VoteNotExpired(id));
                }
                vec![id]
            }
            None => {
                if self.open_by_parameter.is_empty() {
                    return Err(ContractError::NoActiveProposal);
                }
                let ready = self.finishable(height);
                if ready.is_empty() {
                    let pending = self.current.unwrap_or_default();
                    return Err(ContractError::VoteNotExpired(pending));
                }
                ready
            }
        };

        // winners are checked up front so a failure closes nothing
        for proposal in targets.iter().filter_map(|id| self.proposals.get(id)) {
            if let (ProposalOutcome::Applied, ProposalValue::Amount(_)) = (proposal.outcome(), proposal.value) {
                parameters.check_apply(proposal.parameter)?;
            }
        }

        let mut results = Vec::with_capacity(targets.len());
        for id in targets {
            let outcome = self.close(id, parameters, admins)?;
            results.push((id, outcome));
        }
        Ok(results)
    }

    fn close(&mut self, id: ProposalId, parameters: &mut ParameterStore, admins: &mut AdminRegistry) -> ContractResult<ProposalOutcome> {
        let proposal = self.proposals.get_mut(&id).ok_or(ContractError::NoActiveProposal)?;
        let outcome = proposal.outcome();

        if outcome == ProposalOutcome::Applied {
            match (proposal.parameter, proposal.value) {
                (ParameterId::ADMIN_VOTE, ProposalValue::Admin(address)) => {
                    admins.add_voted_admin(address);
                }
                (ParameterId::REMOVE_ADMIN_VOTE, ProposalValue::Admin(address)) => {
                    if !admins.remove_voted_admin(&address) {
                        warn!("Proposal {} removes {}, which is not a voted admin", id, address);
                    }
                }
                (parameter, ProposalValue::Amount(value)) => {
                    parameters.apply(parameter, value)?;
                }
                (parameter, value) => {
                    warn!("Proposal {} carries {:?} for parameter {}; nothing applied", id, value, parameter);
                }
            }
        }

        proposal.state = outcome.into();
        self.open_by_parameter.remove(&proposal.parameter);
        info!(
            "Proposal {} finished as {:?} ({} for, {} against)",
            id, outcome, proposal.votes_for, proposal.votes_against
        );
        Ok(outcome)
    }

    pub fn proposal(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(&id)
    }

    /// The most recently created proposal.
    pub fn current(&self) -> Option<&Proposal> {
        self.current.and_then(|id| self.proposals.get(&id))
    }

    fn resolve(&self, proposal: Option<ProposalId>) -> ContractResult<&Proposal> {
        proposal
            .or(self.current)
            .and_then(|id| self.proposals.get(&id))
            .ok_or(ContractError::NoActiveProposal)
    }

    pub fn votes_for(&self, proposal: Option<ProposalId>) -> ContractResult<u64> {
        Ok(self.resolve(proposal)?.votes_for)
    }

    pub fn votes_against(&self, proposal: Option<ProposalId>) -> ContractResult<u64> {
        Ok(self.resolve(proposal)?.votes_against)
    }

    pub fn stats(&self) -> VotingStats {
        let mut stats = VotingStats {
            total_proposals: self.proposals.len(),
            ..VotingStats::default()
        };
        for proposal in self.proposals.values() {
            match proposal.state {
                ProposalState::Open => stats.open += 1,
                ProposalState::Applied => stats.applied += 1,
                ProposalState::Rejected => stats.rejected += 1,
                ProposalState::Expired => stats.expired += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn setup() -> (VoteManager, AdminRegistry, ParameterStore) {
        let mut admins = AdminRegistry::new();
        admins.initialize(addr(1), addr(2)).unwrap();
        (VoteManager::new(), admins, ParameterStore::new())
    }

    #[test]
    fn test_only_admins_create_votes() {
        let (mut votes, admins, _) = setup();
        let result = votes.create_vote(&admins, &addr(9), ParameterId::BURN_RATE, ProposalValue::Amount(10), 5, 100);
        assert_eq!(result, Err(ContractError::Unauthorized(addr(9))));
        assert!(!votes.has_vote_in_progress(None, 100));
    }

    #[test]
    fn test_one_open_proposal_per_parameter() {
        let (mut votes, admins, _) = setup();
        votes.create_vote(&admins, &addr(1), ParameterId::BURN_RATE, ProposalValue::Amount(10), 5, 100).unwrap();
        assert_eq!(
            votes.create_vote(&admins, &addr(2), ParameterId::BURN_RATE, ProposalValue::Amount(20), 5, 101),
            Err(ContractError::ProposalAlreadyOpen(ParameterId::BURN_RATE))
        );
        assert_eq!(
            votes.create_vote(&admins, &addr(2), ParameterId::BLOCK_SIZE, ProposalValue::Amount(4_000_000), 5, 101),
            Ok(2)
        );
    }

    #[test]
    fn test_repeated_votes_accumulate() {
        let (mut votes, admins, _) = setup();
        votes.create_vote(&admins, &addr(1), ParameterId::BURN_RATE, ProposalValue::Amount(10), 13, 100).unwrap();
        votes.vote(&addr(1), None, VoteDirection::For, 1, 101).unwrap();
        votes.vote(&addr(1), None, VoteDirection::Against, 1, 101).unwrap();
        assert_eq!(votes.votes_for(None).unwrap(), 1);
        assert_eq!(votes.votes_against(None).unwrap(), 1);
        let ballot = votes.current().unwrap().ballots[&addr(1)];
        assert_eq!(ballot, Ballot { weight_for: 1, weight_against: 1 });
    }

    #[test]
    fn test_voting_closes_at_expiration() {
        let (mut votes, admins, _) = setup();
        let id = votes.create_vote(&admins, &addr(1), ParameterId::BURN_RATE, ProposalValue::Amount(10), 5, 100).unwrap();
        assert!(votes.has_vote_in_progress(Some(ParameterId::BURN_RATE), 104));
        assert!(!votes.has_vote_in_progress(Some(ParameterId::BURN_RATE), 105));
        assert_eq!(votes.vote(&addr(1), Some(id), VoteDirection::For, 1, 105), Err(ContractError::VotingClosed(id)));
        assert_eq!(votes.vote(&addr(1), Some(id), VoteDirection::For, 0, 101), Err(ContractError::InvalidVoteWeight));
    }

    #[test]
    fn test_finish_requires_coinstake_and_expiry() {
        let (mut votes, mut admins, mut params) = setup();
        let id = votes.create_vote(&admins, &addr(1), ParameterId::BURN_RATE, ProposalValue::Amount(10), 5, 100).unwrap();
        votes.vote(&addr(1), None, VoteDirection::For, 11, 101).unwrap();
        votes.vote(&addr(2), None, VoteDirection::Against, 10, 101).unwrap();

        assert_eq!(
            votes.finish(None, 105, false, &mut params, &mut admins),
            Err(ContractError::FinishOutsideCoinstake)
        );
        assert_eq!(votes.finish(None, 104, true, &mut params, &mut admins), Err(ContractError::VoteNotExpired(id)));

        let results = votes.finish(None, 105, true, &mut params, &mut admins).unwrap();
        assert_eq!(results, vec![(id, ProposalOutcome::Applied)]);
        assert_eq!(params.burn_rate(), 10);
        assert!(!votes.has_vote_in_progress(None, 105));
        assert_eq!(votes.finish(None, 106, true, &mut params, &mut admins), Err(ContractError::NoActiveProposal));
    }

    #[test]
    fn test_tie_is_rejected_and_silence_expires() {
        let (mut votes, mut admins, mut params) = setup();
        let tie = votes.create_vote(&admins, &addr(1), ParameterId::BURN_RATE, ProposalValue::Amount(10), 2, 10).unwrap();
        let silent = votes.create_vote(&admins, &addr(1), ParameterId::BLOCK_SIZE, ProposalValue::Amount(1), 2, 10).unwrap();
        votes.vote(&addr(1), Some(tie), VoteDirection::For, 3, 11).unwrap();
        votes.vote(&addr(2), Some(tie), VoteDirection::Against, 3, 11).unwrap();

        let results = votes.finish(None, 12, true, &mut params, &mut admins).unwrap();
        assert_eq!(results, vec![(tie, ProposalOutcome::Rejected), (silent, ProposalOutcome::Expired)]);
        assert!(!params.is_voted(ParameterId::BURN_RATE));
        assert_eq!(votes.stats().rejected, 1);
        assert_eq!(votes.stats().expired, 1);
    }

    #[test]
    fn test_admin_vote_adds_admin() {
        let (mut votes, mut admins, mut params) = setup();
        votes
            .create_vote(&admins, &addr(1), ParameterId::ADMIN_VOTE, ProposalValue::Admin(addr(7)), 1, 10)
            .unwrap();
        votes.vote(&addr(3), None, VoteDirection::For, 5, 10).unwrap();
        votes.finish(None, 11, true, &mut params, &mut admins).unwrap();
        assert!(admins.is_admin(&addr(7)));
    }

    #[test]
    fn test_admin_vote_requires_address_value() {
        let (mut votes, admins, _) = setup();
        assert!(matches!(
            votes.create_vote(&admins, &addr(1), ParameterId::ADMIN_VOTE, ProposalValue::Amount(7), 1, 10),
            Err(ContractError::InvalidArgument(_))
        ));
    }
}
