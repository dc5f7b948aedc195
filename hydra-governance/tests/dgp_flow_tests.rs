use hex_literal::hex;
use hydra_core::Address;
use hydra_governance::abi::{encode_bool, encode_uint, uint_word};
use hydra_governance::{
    CallContext, ContractError, DgpCall, GovernanceConfig, GovernanceState, ParameterId, ProposalState, VoteDirection,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn main_admin() -> Address {
    Address::from_low_u64_be(0xa1)
}

fn backup_admin() -> Address {
    Address::from_low_u64_be(0xa2)
}

fn dgp() -> Address {
    GovernanceConfig::default().dgp_address
}

fn setup() -> GovernanceState {
    init_logger();
    let mut state = GovernanceState::default();
    let init = DgpCall::InitAdmins {
        main: main_admin(),
        backup: backup_admin(),
    };
    state
        .execute(&CallContext::transaction(main_admin(), 0, 100), &dgp(), &init.encode())
        .unwrap();
    state
}

#[test]
fn test_initial_admin_and_default_params() {
    let state = setup();
    assert_eq!(state.dgp_admins().main(), Some(main_admin()));
    assert_eq!(state.dgp_admins().backup(), Some(backup_admin()));

    for (param, expected) in [(2u64, 1000u64), (7, 1000), (8, 32)] {
        let call = DgpCall::GetDgpParam(ParameterId(param)).encode();
        assert_eq!(state.call_static(&dgp(), &call, 101).unwrap(), encode_uint(expected));
    }
}

#[test]
fn test_second_initialization_is_rejected() {
    let mut state = setup();
    let again = DgpCall::InitAdmins {
        main: backup_admin(),
        backup: main_admin(),
    };
    let result = state.execute(&CallContext::transaction(backup_admin(), 0, 101), &dgp(), &again.encode());
    assert_eq!(result, Err(ContractError::AlreadyInitialized));
    assert_eq!(state.dgp_admins().main(), Some(main_admin()));
}

#[test]
fn test_burn_rate_vote_lifecycle() {
    let mut state = setup();
    let create = DgpCall::CreateVote {
        parameter: ParameterId::BURN_RATE,
        value: uint_word(25),
        duration: 13,
    };
    let output = state
        .execute(&CallContext::transaction(main_admin(), 0, 110), &dgp(), &create.encode())
        .unwrap();
    assert_eq!(output, encode_uint(1));

    // hasVoteInProgress() with no arguments
    assert_eq!(state.call_static(&dgp(), &hex!("796989e2"), 111).unwrap(), encode_bool(true));

    let vote_for = hex!("4b9f5c98 0000000000000000000000000000000000000000000000000000000000000001");
    let vote_against = hex!("4b9f5c98 0000000000000000000000000000000000000000000000000000000000000000");
    state
        .execute(&CallContext::transaction(main_admin(), 1, 111), &dgp(), &vote_for)
        .unwrap();
    state
        .execute(&CallContext::transaction(main_admin(), 1, 111), &dgp(), &vote_against)
        .unwrap();

    assert_eq!(state.call_static(&dgp(), &hex!("c94d6b17"), 112).unwrap(), encode_uint(1));
    assert_eq!(state.call_static(&dgp(), &hex!("7d007f49"), 112).unwrap(), encode_uint(1));

    // a third voter tips the balance
    let voter = Address::from_low_u64_be(0xb0);
    state
        .execute(&CallContext::transaction(voter, 5, 112), &dgp(), &vote_for)
        .unwrap();

    // finishing from a transaction is refused, even after expiry
    let finish = hex!("2aebcbb6");
    assert_eq!(
        state.execute(&CallContext::transaction(main_admin(), 0, 123), &dgp(), &finish),
        Err(ContractError::FinishOutsideCoinstake)
    );
    assert_eq!(
        state.execute(&CallContext::coinstake(122), &dgp(), &finish),
        Err(ContractError::VoteNotExpired(1))
    );
    state.execute(&CallContext::coinstake(123), &dgp(), &finish).unwrap();

    assert_eq!(state.parameters().burn_rate(), 25);
    assert!(state.parameters().is_voted(ParameterId::BURN_RATE));
    assert_eq!(state.votes().proposal(1).unwrap().state, ProposalState::Applied);
    assert_eq!(state.call_static(&dgp(), &hex!("796989e2"), 124).unwrap(), encode_bool(false));
}

#[test]
fn test_non_admin_cannot_create_vote() {
    let mut state = setup();
    let outsider = Address::from_low_u64_be(0xcc);
    let create = DgpCall::CreateVote {
        parameter: ParameterId::BLOCK_SIZE,
        value: uint_word(4_000_000),
        duration: 10,
    };
    assert_eq!(
        state.execute(&CallContext::transaction(outsider, 0, 110), &dgp(), &create.encode()),
        Err(ContractError::Unauthorized(outsider))
    );
    assert_eq!(state.votes().stats().total_proposals, 0);
}

#[test]
fn test_votes_after_window_are_rejected() {
    let mut state = setup();
    let create = DgpCall::CreateVote {
        parameter: ParameterId::BLOCK_GAS_LIMIT,
        value: uint_word(50_000_000),
        duration: 3,
    };
    state
        .execute(&CallContext::transaction(main_admin(), 0, 200), &dgp(), &create.encode())
        .unwrap();
    let vote = DgpCall::Vote {
        proposal: Some(1),
        direction: VoteDirection::For,
    };
    assert_eq!(
        state.execute(&CallContext::transaction(main_admin(), 1, 203), &dgp(), &vote.encode()),
        Err(ContractError::VotingClosed(1))
    );
}
