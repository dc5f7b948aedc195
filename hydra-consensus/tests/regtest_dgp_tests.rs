//! End-to-end tests on a regtest chain: governance calls travel through the
//! mempool, blocks are staked, and privileged calls must ride in the
//! coinstake.

use hydra_consensus::coinstake::sign_block;
use hydra_consensus::target::check_proof_of_work;
use hydra_consensus::{BlockValidator, Chain, ConsensusError, SubmitOutcome};
use hydra_core::{Address, Block, BlockHeader, Hash, KeyPair, OutPoint, Script, Transaction, TxInput, TxOutput, COIN};
use hex_literal::hex;
use hydra_governance::abi::{encode_address, encode_bool, encode_uint, uint_word};
use hydra_governance::{DgpCall, EconomyCall, GovernanceConfig, ParameterId, ProposalState, VoteDirection};

const GAS_LIMIT: u64 = 100_000;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dgp() -> Address {
    GovernanceConfig::default().dgp_address
}

fn economy() -> Address {
    GovernanceConfig::default().economy_address
}

fn staker() -> KeyPair {
    KeyPair::from_seed(&[1u8; 32])
}

fn backup() -> KeyPair {
    KeyPair::from_seed(&[2u8; 32])
}

/// 20 proof-of-work blocks followed by 10 staked ones.
fn setup() -> (Chain, KeyPair) {
    init_logger();
    let mut chain = Chain::regtest();
    let key = staker();
    chain.generate_blocks(30, &key).unwrap();
    assert_eq!(chain.get_block_count(), 30);
    (chain, key)
}

fn call(chain: &mut Chain, key: &KeyPair, contract: &Address, data: Vec<u8>, value: u64) -> Hash {
    chain.send_to_contract(key, contract, data, value, GAS_LIMIT).unwrap()
}

fn init_admins(chain: &mut Chain, key: &KeyPair) {
    let init = DgpCall::InitAdmins {
        main: key.address(),
        backup: backup().address(),
    };
    call(chain, key, &dgp(), init.encode(), 0);
    chain.generate_blocks(1, key).unwrap();
}

fn hex_word(value: u64) -> String {
    hex::encode(encode_uint(value))
}

/// Re-signs the coinstake and the header after a test edits a staked block.
fn reseal(block: &mut Block, key: &KeyPair) {
    block.transactions[1].sign_inputs(key).unwrap();
    block.header.merkle_root = block.compute_merkle_root();
    sign_block(&mut block.header, key).unwrap();
}

#[test]
fn test_admin_initialization_and_defaults() {
    let (mut chain, key) = setup();
    init_admins(&mut chain, &key);

    assert_eq!(chain.governance().dgp_admins().main(), Some(key.address()));
    let is_admin = DgpCall::IsAdmin(key.address()).encode();
    assert_eq!(chain.call_contract(&dgp(), &is_admin).unwrap(), hex::encode(encode_bool(true)));

    for (param, expected) in [(2u64, 1000u64), (7, 1000), (8, 32)] {
        let get = DgpCall::GetDgpParam(ParameterId(param)).encode();
        assert_eq!(chain.call_contract(&dgp(), &get).unwrap(), hex_word(expected));
    }
}

#[test]
fn test_vote_tallies_and_progress() {
    let (mut chain, key) = setup();
    init_admins(&mut chain, &key);

    let create = DgpCall::CreateVote {
        parameter: ParameterId::BURN_RATE,
        value: uint_word(20),
        duration: 10,
    };
    call(&mut chain, &key, &dgp(), create.encode(), 0);
    chain.generate_blocks(1, &key).unwrap();

    // hasVoteInProgress()
    assert_eq!(chain.call_contract(&dgp(), &hex!("796989e2")).unwrap(), hex::encode(encode_bool(true)));

    let vote_for = hex!("4b9f5c98 0000000000000000000000000000000000000000000000000000000000000001");
    let vote_against = hex!("4b9f5c98 0000000000000000000000000000000000000000000000000000000000000000");
    call(&mut chain, &key, &dgp(), vote_for.to_vec(), 1);
    call(&mut chain, &key, &dgp(), vote_against.to_vec(), 1);
    chain.generate_blocks(1, &key).unwrap();

    assert_eq!(chain.call_contract(&dgp(), &hex!("c94d6b17")).unwrap(), hex_word(1));
    assert_eq!(chain.call_contract(&dgp(), &hex!("7d007f49")).unwrap(), hex_word(1));
    assert_eq!(chain.governance().system_balance(&dgp()), 2);
}

#[test]
fn test_finish_vote_from_transaction_reverts_after_window() {
    let (mut chain, key) = setup();
    init_admins(&mut chain, &key);

    let create = DgpCall::CreateVote {
        parameter: ParameterId::BURN_RATE,
        value: uint_word(20),
        duration: 5,
    };
    call(&mut chain, &key, &dgp(), create.encode(), 0);
    chain.generate_blocks(1, &key).unwrap();
    let expiration = chain.get_block_count() + 5;

    let vote_for = DgpCall::Vote {
        proposal: Some(1),
        direction: VoteDirection::For,
    };
    let vote_against = DgpCall::Vote {
        proposal: Some(1),
        direction: VoteDirection::Against,
    };
    call(&mut chain, &key, &dgp(), vote_for.encode(), 2);
    call(&mut chain, &key, &dgp(), vote_against.encode(), 1);
    while chain.get_block_count() < expiration - 1 {
        chain.generate_blocks(1, &key).unwrap();
    }
    assert_eq!(chain.governance().votes().proposal(1).unwrap().state, ProposalState::Open);
    let dgp_balance = chain.governance().system_balance(&dgp());

    // the window is over for the next block; a regular finishVote is queued
    let finish = DgpCall::FinishVote { proposal: None }.encode();
    let txid = call(&mut chain, &key, &dgp(), finish.clone(), 1_000);

    // the finishing block closes the vote in its coinstake and leaves the pool alone
    let hashes = chain.generate_blocks(1, &key).unwrap();
    assert_eq!(chain.get_block_count(), expiration);
    let finishing = chain.get_block(&hashes[0]).unwrap();
    let finish_call = Script::CoinstakeCall {
        contract: dgp(),
        data: finish.clone(),
    };
    assert_eq!(finishing.transactions[1].outputs.iter().filter(|output| output.script == finish_call).count(), 1);
    assert!(!finishing.transactions.iter().any(|tx| tx.hash() == txid));
    assert!(chain.mempool().contains(&txid));
    assert_eq!(chain.governance().votes().proposal(1).unwrap().state, ProposalState::Applied);
    assert_eq!(chain.governance().burn_rate(), 20);

    // the queued call is mined next, reverts and refunds its value
    let height = chain.get_block_count();
    let hashes = chain.generate_blocks(1, &key).unwrap();
    assert_eq!(chain.get_block_count(), height + 1);
    let block = chain.get_block(&hashes[0]).unwrap();
    assert!(block.transactions.iter().any(|tx| tx.hash() == txid));
    assert!(!block.transactions[1].outputs.iter().any(|output| output.script == finish_call));

    let refund = chain.state().utxos.get(&OutPoint::new(txid, 0)).unwrap();
    assert_eq!(refund.output.value, 1_000);
    assert_eq!(refund.owner(), Some(key.address()));
    assert_eq!(chain.governance().system_balance(&dgp()), dgp_balance);
    assert_eq!(chain.governance().votes().proposal(1).unwrap().state, ProposalState::Applied);
    assert_eq!(chain.governance().burn_rate(), 20);
    assert!(chain.mempool().is_empty());
}

#[test]
fn test_burn_rate_vote_applies_in_coinstake_and_burns_fees() {
    let (mut chain, key) = setup();
    init_admins(&mut chain, &key);

    let create = DgpCall::CreateVote {
        parameter: ParameterId::BURN_RATE,
        value: uint_word(50),
        duration: 3,
    };
    call(&mut chain, &key, &dgp(), create.encode(), 0);
    chain.generate_blocks(1, &key).unwrap();
    let created_at = chain.get_block_count();

    let vote = DgpCall::Vote {
        proposal: Some(1),
        direction: VoteDirection::For,
    };
    call(&mut chain, &key, &dgp(), vote.encode(), 5);
    chain.generate_blocks(1, &key).unwrap();

    // the block at the expiration height carries finishVote in its coinstake
    while chain.get_block_count() < created_at + 3 {
        chain.generate_blocks(1, &key).unwrap();
    }
    let finishing = chain.get_block(&chain.tip().hash).unwrap();
    let finish_call = Script::CoinstakeCall {
        contract: dgp(),
        data: DgpCall::FinishVote { proposal: None }.encode(),
    };
    assert!(finishing.transactions[1].outputs.iter().any(|output| output.script == finish_call));
    assert_eq!(chain.governance().votes().proposal(1).unwrap().state, ProposalState::Applied);
    assert_eq!(chain.governance().burn_rate(), 50);

    // a plain payment now pays relay_fee, half of which is burned
    chain.send_to_address(&key, &backup().address(), COIN).unwrap();
    let block = chain.create_pos_block(&key).unwrap();
    let validator = BlockValidator::new(chain.params().clone());
    let (_, connected) = validator
        .connect_block(chain.state(), chain.tip(), &block, chain.now())
        .unwrap();
    let fees = chain.params().relay_fee;
    assert_eq!(connected.fees, fees);
    assert_eq!(connected.burned, fees / 100 * 50);
    assert_eq!(connected.reward, chain.params().block_subsidy(connected.height) + fees - connected.burned);
    assert_eq!(chain.submit_block(block), SubmitOutcome::Accepted);
}

#[test]
fn test_deployment_without_add_contract_is_rejected() {
    let (mut chain, key) = setup();
    let height = chain.get_block_count();
    let (_, contract) = chain.deploy_contract(&key, vec![0x60, 0x80, 0x60, 0x40], 0, GAS_LIMIT).unwrap();

    let mut block = chain.create_pos_block(&key).unwrap();
    let last = block.transactions[1].outputs.pop().unwrap();
    assert!(last.script.is_coinstake_call());
    reseal(&mut block, &key);

    assert!(matches!(
        chain.submit_block(block),
        SubmitOutcome::Rejected(ConsensusError::MissingCoinstakeAuthorization(_))
    ));
    assert_eq!(chain.get_block_count(), height);

    // the honest block registers the owner through the coinstake
    chain.generate_blocks(1, &key).unwrap();
    assert_eq!(chain.get_block_count(), height + 1);
    let owner = chain
        .call_contract(&economy(), &EconomyCall::ContractOwners(contract).encode())
        .unwrap();
    assert_eq!(owner, hex::encode(encode_address(&key.address())));
}

#[test]
fn test_called_contract_owner_receives_dividend_in_coinstake() {
    let (mut chain, key) = setup();
    let owner = backup();
    chain.send_to_address(&key, &owner.address(), 10 * COIN).unwrap();
    chain.generate_blocks(1, &key).unwrap();
    let (_, contract) = chain.deploy_contract(&owner, vec![0x60, 0x80, 0x60, 0x40], 0, GAS_LIMIT).unwrap();
    chain.generate_blocks(1, &key).unwrap();
    assert_eq!(chain.governance().dividend_owner(&contract), Some(owner.address()));

    let gas_price = chain.governance().min_gas_price();
    call(&mut chain, &key, &contract, vec![0xde, 0xad, 0xbe, 0xef], 0);
    let block = chain.create_pos_block(&key).unwrap();
    let dividend = GAS_LIMIT * gas_price / 100 * chain.governance().dividend_rate();
    assert!(dividend > 0);
    let coinstake = &block.transactions[1];
    assert_eq!(coinstake.outputs[3], TxOutput::new(dividend, Script::PayToPubKeyHash(owner.address())));
    assert_eq!(coinstake.outputs.len(), 4);

    let validator = BlockValidator::new(chain.params().clone());
    let (_, connected) = validator
        .connect_block(chain.state(), chain.tip(), &block, chain.now())
        .unwrap();
    assert_eq!(connected.dividends, dividend);
    assert_eq!(
        connected.reward,
        chain.params().block_subsidy(connected.height) + connected.fees - connected.burned - dividend
    );

    // the staker may not keep the owner's share
    let mut greedy = block.clone();
    greedy.transactions[1].outputs.pop();
    reseal(&mut greedy, &key);
    assert!(matches!(
        chain.submit_block(greedy),
        SubmitOutcome::Rejected(ConsensusError::InvalidCoinstakeSplit(_))
    ));

    let paid = OutPoint::new(block.transactions[1].hash(), 3);
    assert_eq!(chain.submit_block(block), SubmitOutcome::Accepted);
    let coin = chain.state().utxos.get(&paid).unwrap();
    assert_eq!(coin.output.value, dividend);
    assert_eq!(coin.owner(), Some(owner.address()));
}

#[test]
fn test_unexpected_coinstake_call_is_rejected() {
    let (mut chain, key) = setup();
    let mut block = chain.create_pos_block(&key).unwrap();
    block.transactions[1].outputs.push(TxOutput::new(
        0,
        Script::CoinstakeCall {
            contract: dgp(),
            data: DgpCall::FinishVote { proposal: None }.encode(),
        },
    ));
    reseal(&mut block, &key);

    assert!(matches!(
        chain.submit_block(block),
        SubmitOutcome::Rejected(ConsensusError::UnexpectedCoinstakeCall(_))
    ));
}

#[test]
fn test_wrong_coinstake_split_is_rejected() {
    let (mut chain, key) = setup();
    let height = chain.get_block_count();
    let mut block = chain.create_pos_block(&key).unwrap();
    block.transactions[1].outputs[2].value -= 50_000;
    reseal(&mut block, &key);

    assert!(matches!(
        chain.submit_block(block),
        SubmitOutcome::Rejected(ConsensusError::InvalidCoinstakeSplit(_))
    ));
    assert_eq!(chain.get_block_count(), height);
}

#[test]
fn test_coinstake_call_in_regular_transaction_is_refused() {
    let (mut chain, key) = setup();
    let (outpoint, _) = chain.spendable_coins(&key.address())[0];
    let mut tx = Transaction::new(
        vec![TxInput::new(outpoint)],
        vec![TxOutput::new(
            0,
            Script::CoinstakeCall {
                contract: dgp(),
                data: DgpCall::FinishVote { proposal: None }.encode(),
            },
        )],
    );
    tx.sign_inputs(&key).unwrap();
    let txid = tx.hash();

    assert_eq!(
        chain.submit_transaction(tx),
        Err(ConsensusError::CoinstakeCallOutsideCoinstake(txid))
    );
}

#[test]
fn test_proof_of_work_block_cannot_deploy() {
    init_logger();
    let mut chain = Chain::regtest();
    let key = staker();
    chain.generate_blocks(12, &key).unwrap();

    chain.deploy_contract(&key, vec![0x00], 0, GAS_LIMIT).unwrap();
    chain.generate_blocks(1, &key).unwrap();
    assert_eq!(chain.mempool().len(), 1, "the PoW assembler leaves deployments queued");

    let tip = *chain.tip();
    let height = tip.height + 1;
    let deployment = chain.mempool().transactions()[0].clone();
    let coinbase = Transaction::new_coinbase(
        height,
        vec![TxOutput::new(chain.params().block_subsidy(height), Script::PayToPubKeyHash(key.address()))],
    );
    let mut block = Block::new(
        BlockHeader {
            version: 1,
            prev_block_hash: tip.hash,
            merkle_root: Hash::zero(),
            time: tip.time + 1,
            bits: chain.params().pow_limit_bits,
            nonce: 0,
            prevout_stake: OutPoint::null(),
            signature: Vec::new(),
        },
        vec![coinbase, deployment],
    );
    block.header.merkle_root = block.compute_merkle_root();
    while !check_proof_of_work(&block.hash(), block.header.bits) {
        block.header.nonce += 1;
    }
    chain.advance_mock_time(1);

    assert!(matches!(
        chain.submit_block(block),
        SubmitOutcome::Rejected(ConsensusError::MissingCoinstakeAuthorization(_))
    ));
}

#[test]
fn test_peer_block_conflicting_with_pool_evicts_children() {
    let (mut local, key) = setup();
    let (mut peer, _) = setup();
    assert_eq!(local.tip().hash, peer.tip().hash);
    let receiver = backup();

    // the child spends the parent's unconfirmed output
    let parent = local.send_to_address(&key, &receiver.address(), COIN).unwrap();
    let child = local.send_to_address(&receiver, &key.address(), COIN / 2).unwrap();
    assert_eq!(local.mempool().len(), 2);

    // the peer spends the same coin differently and stakes it
    let conflict = peer.send_to_address(&key, &receiver.address(), 2 * COIN).unwrap();
    let block = peer.create_pos_block(&key).unwrap();
    assert!(block.transactions.iter().any(|tx| tx.hash() == conflict));
    local.advance_mock_time(peer.now().saturating_sub(local.now()));

    assert_eq!(local.submit_block(block), SubmitOutcome::Accepted);
    assert!(!local.mempool().contains(&parent));
    assert!(!local.mempool().contains(&child));
    assert!(local.mempool().is_empty());

    let payment = local.send_to_address(&key, &receiver.address(), COIN).unwrap();
    local.generate_blocks(1, &key).unwrap();
    let tip = local.get_block(&local.tip().hash).unwrap();
    assert!(tip.transactions.iter().any(|tx| tx.hash() == payment));
}

#[test]
fn test_known_non_tip_parent_is_inconclusive() {
    let (mut chain, _) = setup();
    let old = chain.get_block(&chain.get_block_hash(5).unwrap()).unwrap().clone();
    assert_eq!(
        chain.submit_block(old.clone()),
        SubmitOutcome::Rejected(ConsensusError::DuplicateBlock(old.hash()))
    );

    let mut sibling = old;
    sibling.header.nonce = sibling.header.nonce.wrapping_add(1);
    assert_eq!(chain.submit_block(sibling), SubmitOutcome::Inconclusive);
    assert_eq!(chain.get_block_count(), 30);
}

#[test]
fn test_staked_block_before_maturity_has_no_candidates() {
    init_logger();
    let mut chain = Chain::regtest();
    let key = staker();
    chain.generate_blocks(5, &key).unwrap();
    assert!(chain.stake_candidates(&key.address()).is_empty());
    assert!(matches!(chain.create_pos_block(&key), Err(ConsensusError::NoEligibleStake)));
}
