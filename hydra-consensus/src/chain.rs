//! In-process chain: block index, tip state, mempool and node-style
//! helpers for sending transactions and producing blocks.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use hydra_core::{Address, Block, BlockHeader, Hash, KeyPair, OutPoint, Transaction, TxOutput};
use hydra_governance::{ContractResult, GovernanceState};
use log::{info, warn};

use crate::error::{ConsensusError, Result};
use crate::kernel::{StakeCandidate, StakeWindow};
use crate::mempool::Mempool;
use crate::miner::BlockAssembler;
use crate::params::ChainParams;
use crate::transaction_builder::TransactionBuilder;
use crate::validation::{apply_transaction, BlockContext, BlockIndexEntry, BlockValidator, ChainState};

/// Source of the node's notion of "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    System,
    /// A fixed time, moved explicitly or by block production.
    Mock(u32),
}

impl Clock {
    pub fn now(&self) -> u32 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
                .unwrap_or(0),
            Clock::Mock(time) => *time,
        }
    }
}

/// Result of offering a block to the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The block extends the tip.
    Accepted,
    /// The block builds on a known block that is not the tip; side chains
    /// are not tracked, so it is neither connected nor rejected.
    Inconclusive,
    Rejected(ConsensusError),
}

/// Attempts to find a stake on a mock clock before giving up.
const MOCK_STAKE_ATTEMPTS: u32 = 16;

pub struct Chain {
    params: ChainParams,
    validator: BlockValidator,
    blocks: Vec<Block>,
    entries: Vec<BlockIndexEntry>,
    by_hash: HashMap<Hash, u64>,
    state: ChainState,
    mempool: Mempool,
    clock: Clock,
}

impl Chain {
    /// Creates a chain holding only the genesis block.
    pub fn new(params: ChainParams) -> Self {
        let coinbase = Transaction::new_coinbase(0, vec![TxOutput::empty()]);
        let mut genesis = Block::new(
            BlockHeader {
                version: 1,
                prev_block_hash: Hash::zero(),
                merkle_root: Hash::zero(),
                time: params.genesis_time,
                bits: params.pow_limit_bits,
                nonce: 0,
                prevout_stake: OutPoint::null(),
                signature: Vec::new(),
            },
            vec![coinbase],
        );
        genesis.header.merkle_root = genesis.compute_merkle_root();

        let hash = genesis.hash();
        let entry = BlockIndexEntry {
            hash,
            height: 0,
            time: genesis.header.time,
            stake_modifier: Hash::zero(),
            is_proof_of_stake: false,
        };
        info!("Chain initialized with genesis block {}", hash);

        Self {
            state: ChainState::new(params.governance.clone()),
            validator: BlockValidator::new(params.clone()),
            clock: Clock::System,
            params,
            blocks: vec![genesis],
            entries: vec![entry],
            by_hash: HashMap::from([(hash, 0)]),
            mempool: Mempool::new(),
        }
    }

    /// A regtest chain on a mock clock starting at the genesis time.
    pub fn regtest() -> Self {
        let params = ChainParams::regtest();
        let start = params.genesis_time;
        let mut chain = Self::new(params);
        chain.clock = Clock::Mock(start);
        chain
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// Moves a mock clock forward; has no effect on the system clock.
    pub fn advance_mock_time(&mut self, seconds: u32) {
        if let Clock::Mock(time) = &mut self.clock {
            *time = time.saturating_add(seconds);
        }
    }

    pub fn now(&self) -> u32 {
        self.clock.now()
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Height of the tip.
    pub fn get_block_count(&self) -> u64 {
        self.tip().height
    }

    pub fn get_block_hash(&self, height: u64) -> Option<Hash> {
        self.entries.get(height as usize).map(|entry| entry.hash)
    }

    pub fn get_block(&self, hash: &Hash) -> Option<&Block> {
        self.by_hash.get(hash).and_then(|height| self.blocks.get(*height as usize))
    }

    pub fn tip(&self) -> &BlockIndexEntry {
        // the index always holds genesis
        &self.entries[self.entries.len() - 1]
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn governance(&self) -> &GovernanceState {
        &self.state.governance
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Confirmed balance of `address`.
    pub fn balance(&self, address: &Address) -> u64 {
        self.state.utxos.balance_of(address)
    }

    /// Coins `address` can spend in the next block: mature confirmed coins
    /// not already spent by the pool, plus unconfirmed pool outputs.
    pub fn spendable_coins(&self, address: &Address) -> Vec<(OutPoint, u64)> {
        let next_height = self.get_block_count() + 1;
        let mut coins: Vec<(OutPoint, u64)> = self
            .state
            .utxos
            .coins_of(address)
            .into_iter()
            .filter(|(outpoint, coin)| {
                !self.mempool.is_spent(outpoint)
                    && (!coin.is_reward() || next_height.saturating_sub(coin.height) >= self.params.coinbase_maturity)
            })
            .map(|(outpoint, coin)| (outpoint, coin.output.value))
            .collect();
        coins.extend(self.mempool.unconfirmed_outputs(address));
        coins
    }

    /// Confirmed coins of `address` deep enough to stake in the next block.
    pub fn stake_candidates(&self, address: &Address) -> Vec<StakeCandidate> {
        let next_height = self.get_block_count() + 1;
        self.state
            .utxos
            .coins_of(address)
            .into_iter()
            .filter(|(outpoint, coin)| {
                coin.output.value > 0
                    && !self.mempool.is_spent(outpoint)
                    && next_height.saturating_sub(coin.height) > self.params.coinbase_maturity
            })
            .map(|(prevout, coin)| StakeCandidate {
                prevout,
                value: coin.output.value,
                block_time: coin.block_time,
            })
            .collect()
    }

    /// Validates `tx` on top of the tip and the pool, then queues it.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<Hash> {
        let height = self.get_block_count() + 1;
        let mut staged = self.state.clone();
        let ctx = BlockContext::new(&self.params, &staged, height, self.now());
        for queued in self.mempool.transactions() {
            if let Err(e) = apply_transaction(&mut staged, queued, &ctx) {
                warn!("Queued transaction {} no longer applies: {}", queued.hash(), e);
            }
        }
        apply_transaction(&mut staged, &tx, &ctx)?;
        self.mempool.add(tx)
    }

    /// Pays `amount` to `to` from the coins of `key`.
    pub fn send_to_address(&mut self, key: &KeyPair, to: &Address, amount: u64) -> Result<Hash> {
        let coins = self.spendable_coins(&key.address());
        let tx = TransactionBuilder::new(key, self.params.relay_fee).build_payment(&coins, to, amount)?;
        self.submit_transaction(tx)
    }

    /// Sends a contract call paying the oracle's gas price.
    pub fn send_to_contract(&mut self, key: &KeyPair, contract: &Address, data: Vec<u8>, value: u64, gas_limit: u64) -> Result<Hash> {
        let coins = self.spendable_coins(&key.address());
        let gas_price = self.state.governance.min_gas_price();
        let tx = TransactionBuilder::new(key, self.params.relay_fee)
            .build_contract_call(&coins, contract, data, value, gas_limit, gas_price)?;
        self.submit_transaction(tx)
    }

    /// Deploys `code` and returns the transaction id and contract address.
    pub fn deploy_contract(&mut self, key: &KeyPair, code: Vec<u8>, value: u64, gas_limit: u64) -> Result<(Hash, Address)> {
        let coins = self.spendable_coins(&key.address());
        let gas_price = self.state.governance.min_gas_price();
        let tx = TransactionBuilder::new(key, self.params.relay_fee)
            .build_deployment(&coins, code, value, gas_limit, gas_price)?;
        let txid = self.submit_transaction(tx)?;
        Ok((txid, OutPoint::new(txid, 0).contract_address()))
    }

    /// Read-only call against the tip state, executed as if in the next
    /// block. Returns the hex-encoded output.
    pub fn call_contract(&self, contract: &Address, data: &[u8]) -> ContractResult<String> {
        let output = self
            .state
            .governance
            .call_static(contract, data, self.get_block_count() + 1)?;
        Ok(hex::encode(output))
    }

    /// Produces `count` blocks paying `key`: proof-of-work up to the last
    /// PoW height, staked after. Returns the new block hashes.
    pub fn generate_blocks(&mut self, count: u64, key: &KeyPair) -> Result<Vec<Hash>> {
        let mut hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let block = if self.params.is_pos_height(self.get_block_count() + 1) {
                self.create_pos_block(key)?
            } else {
                self.create_pow_block(&key.address())?
            };
            let hash = block.hash();
            match self.submit_block(block) {
                SubmitOutcome::Accepted => hashes.push(hash),
                SubmitOutcome::Inconclusive => return Err(ConsensusError::UnknownParent(hash)),
                SubmitOutcome::Rejected(e) => return Err(e),
            }
        }
        Ok(hashes)
    }

    /// Mines a proof-of-work block on the tip without submitting it.
    pub fn create_pow_block(&mut self, miner: &Address) -> Result<Block> {
        let tip = *self.tip();
        let time = self.now().max(tip.time + 1);
        if let Clock::Mock(now) = &mut self.clock {
            *now = time;
        }
        BlockAssembler::new(&self.params).assemble_pow_block(&self.state, &tip, self.mempool.transactions(), miner, time)
    }

    /// Stakes a block on the tip without submitting it. On a mock clock the
    /// clock is moved to the next stake slot, and further if no stake is
    /// eligible there.
    pub fn create_pos_block(&mut self, key: &KeyPair) -> Result<Block> {
        let tip = *self.tip();
        let candidates = self.stake_candidates(&key.address());
        if candidates.is_empty() {
            return Err(ConsensusError::NoEligibleStake);
        }

        let mask = self.params.stake_timestamp_mask;
        let step = self.params.stake_step();
        let attempts = if matches!(self.clock, Clock::Mock(_)) { MOCK_STAKE_ATTEMPTS } else { 1 };

        for _ in 0..attempts {
            let now = self.now();
            let start = (now & !mask).max((tip.time & !mask).saturating_add(step));
            if let Clock::Mock(time) = &mut self.clock {
                *time = (*time).max(start);
            }
            let now = self.now();
            let end = start
                .saturating_add(self.params.max_stake_lookahead)
                .min(now.saturating_add(self.params.max_future_drift));
            let window = StakeWindow::new(start, end, mask);

            let assembled = BlockAssembler::new(&self.params).assemble_pos_block(
                &self.state,
                &tip,
                self.mempool.transactions(),
                key,
                &candidates,
                &window,
            );
            match assembled {
                Ok(block) => {
                    if let Clock::Mock(time) = &mut self.clock {
                        *time = (*time).max(block.header.time);
                    }
                    return Ok(block);
                }
                Err(ConsensusError::NoEligibleStake) => {
                    self.advance_mock_time(self.params.max_stake_lookahead.max(step));
                }
                Err(e) => return Err(e),
            }
        }
        Err(ConsensusError::NoEligibleStake)
    }

    /// Validates `block` and, if it extends the tip, connects it.
    pub fn submit_block(&mut self, block: Block) -> SubmitOutcome {
        let hash = block.hash();
        if self.by_hash.contains_key(&hash) {
            return SubmitOutcome::Rejected(ConsensusError::DuplicateBlock(hash));
        }

        let tip = *self.tip();
        if block.header.prev_block_hash != tip.hash {
            if self.by_hash.contains_key(&block.header.prev_block_hash) {
                info!("Block {} builds on a non-tip block; not connected", hash);
                return SubmitOutcome::Inconclusive;
            }
            return SubmitOutcome::Rejected(ConsensusError::UnknownParent(block.header.prev_block_hash));
        }

        match self.validator.connect_block(&self.state, &tip, &block, self.now()) {
            Ok((state, connected)) => {
                self.state = state;
                self.mempool.remove_confirmed(&block);
                self.by_hash.insert(hash, connected.height);
                self.entries.push(connected.index_entry());
                self.blocks.push(block);
                SubmitOutcome::Accepted
            }
            Err(e) => {
                warn!("Rejected block {}: {}", hash, e);
                SubmitOutcome::Rejected(e)
            }
        }
    }
}
