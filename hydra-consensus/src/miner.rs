//! Block assembly for proof-of-work bootstrap blocks and staked blocks.

use hydra_core::{consensus_bytes, Address, Block, BlockHeader, Hash, KeyPair, OutPoint, Script, Transaction, TxOutput};
use hydra_governance::Deployment;
use log::{debug, info, warn};

use crate::coinstake::{block_reward, build_coinstake, merge_dividends, sign_block, total_dividends, Dividends};
use crate::error::{ConsensusError, Result};
use crate::kernel::{solve_stake, StakeCandidate, StakeWindow};
use crate::params::ChainParams;
use crate::target::check_proof_of_work;
use crate::validation::{apply_transaction, BlockContext, BlockIndexEntry, BlockValidator, ChainState};

/// Room left in a block for the header and reward transactions.
const BLOCK_RESERVED_BYTES: u64 = 1_000;

/// Transactions picked for a block and what they add up to.
struct Selection {
    txs: Vec<Transaction>,
    fees: u64,
    deployments: Vec<Deployment>,
    dividends: Dividends,
}

/// Builds blocks on top of a chain state.
pub struct BlockAssembler<'a> {
    params: &'a ChainParams,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(params: &'a ChainParams) -> Self {
        Self { params }
    }

    /// Applies queued transactions to `staged` in order, skipping any that
    /// fail or do not fit.
    fn select_transactions(&self, staged: &mut ChainState, ctx: &BlockContext, queued: &[Transaction], allow_deployments: bool) -> Selection {
        let max_size = staged.governance.block_size_limit().saturating_sub(BLOCK_RESERVED_BYTES);
        let max_gas = staged.governance.block_gas_limit();
        let mut selection = Selection {
            txs: Vec::new(),
            fees: 0,
            deployments: Vec::new(),
            dividends: Dividends::new(),
        };
        let mut size = 0u64;
        let mut gas = 0u64;

        for tx in queued {
            let txid = tx.hash();
            let creates = tx.outputs.iter().any(|output| matches!(output.script, Script::Create { .. }));
            if creates && !allow_deployments {
                debug!("Leaving deployment {} for a staked block", txid);
                continue;
            }
            let tx_size = consensus_bytes(tx).len() as u64;
            let tx_gas = tx.outputs.iter().map(|output| output.script.gas_limit()).fold(0u64, u64::saturating_add);
            if size.saturating_add(tx_size) > max_size || gas.saturating_add(tx_gas) > max_gas {
                debug!("Transaction {} does not fit in the block", txid);
                continue;
            }

            match apply_transaction(staged, tx, ctx) {
                Ok(effects) => {
                    let Some(fees) = selection.fees.checked_add(effects.fee) else {
                        warn!("Skipping {}: block fee overflow", txid);
                        continue;
                    };
                    selection.fees = fees;
                    size += tx_size;
                    gas += tx_gas;
                    selection.deployments.extend(effects.deployments);
                    merge_dividends(&mut selection.dividends, &effects.dividends);
                    selection.txs.push(tx.clone());
                }
                Err(e) => warn!("Skipping transaction {}: {}", txid, e),
            }
        }
        selection
    }

    /// Mines a proof-of-work block paying subsidy and fees to `miner`.
    /// Deployments are left in the pool: only a coinstake can register them.
    pub fn assemble_pow_block(
        &self,
        state: &ChainState,
        prev: &BlockIndexEntry,
        queued: &[Transaction],
        miner: &Address,
        time: u32,
    ) -> Result<Block> {
        let height = prev.height + 1;
        let mut staged = state.clone();
        let ctx = BlockContext::new(self.params, &staged, height, time);
        let selection = self.select_transactions(&mut staged, &ctx, queued, false);

        let reward = self.params.block_subsidy(height).saturating_add(selection.fees);
        let coinbase = Transaction::new_coinbase(height, vec![TxOutput::new(reward, Script::PayToPubKeyHash(*miner))]);
        let mut transactions = vec![coinbase];
        transactions.extend(selection.txs);

        let mut block = Block::new(
            BlockHeader {
                version: 1,
                prev_block_hash: prev.hash,
                merkle_root: Hash::zero(),
                time,
                bits: self.params.pow_limit_bits,
                nonce: 0,
                prevout_stake: OutPoint::null(),
                signature: Vec::new(),
            },
            transactions,
        );
        block.header.merkle_root = block.compute_merkle_root();

        loop {
            if check_proof_of_work(&block.hash(), block.header.bits) {
                break;
            }
            block.header.nonce = block
                .header
                .nonce
                .checked_add(1)
                .ok_or(ConsensusError::InvalidProofOfWork)?;
        }

        info!(
            "Mined PoW block {} at height {} with {} transaction(s), nonce {}",
            block.hash(),
            height,
            block.transactions.len(),
            block.header.nonce
        );
        Ok(block)
    }

    /// Searches `window` for a stake among `candidates` and builds a signed
    /// block for the winner. The block is validated before it is returned.
    pub fn assemble_pos_block(
        &self,
        state: &ChainState,
        prev: &BlockIndexEntry,
        queued: &[Transaction],
        key: &KeyPair,
        candidates: &[StakeCandidate],
        window: &StakeWindow,
    ) -> Result<Block> {
        let height = prev.height + 1;
        let solution = solve_stake(&prev.stake_modifier, candidates, window, &self.params.pos_target())
            .ok_or(ConsensusError::NoEligibleStake)?;
        let time = solution.time;

        let mut staged = state.clone();
        staged.utxos.spend(&solution.candidate.prevout);
        let ctx = BlockContext::new(self.params, &staged, height, time);

        let selection = if state.governance.has_vote_finishing(height) {
            debug!("A vote finishes at height {}; leaving the pool untouched", height);
            Selection {
                txs: Vec::new(),
                fees: 0,
                deployments: Vec::new(),
                dividends: Dividends::new(),
            }
        } else {
            self.select_transactions(&mut staged, &ctx, queued, true)
        };

        let calls = state.governance.required_coinstake_calls(height, &selection.deployments);
        let (reward, burned) = block_reward(self.params.block_subsidy(height), selection.fees, staged.governance.burn_rate());
        let dividends = total_dividends(&selection.dividends);
        let reward = reward.checked_sub(dividends).ok_or_else(|| {
            ConsensusError::InvalidCoinstakeSplit(format!("dividends {} exceed reward {}", dividends, reward))
        })?;
        let coinstake = build_coinstake(&solution.candidate, reward, key, &selection.dividends, &calls)?;
        let coinbase = Transaction::new_coinbase(height, vec![TxOutput::empty()]);

        let mut transactions = vec![coinbase, coinstake];
        transactions.extend(selection.txs);

        let mut block = Block::new(
            BlockHeader {
                version: 1,
                prev_block_hash: prev.hash,
                merkle_root: Hash::zero(),
                time,
                bits: self.params.pos_limit_bits,
                nonce: 0,
                prevout_stake: solution.candidate.prevout,
                signature: Vec::new(),
            },
            transactions,
        );
        block.header.merkle_root = block.compute_merkle_root();
        sign_block(&mut block.header, key)?;

        BlockValidator::new(self.params.clone()).connect_block(state, prev, &block, time)?;
        info!(
            "Staked block {} at height {} time {}: {} transaction(s), {} coinstake call(s), reward {}, burned {}, dividends {}",
            block.hash(),
            height,
            time,
            block.transactions.len(),
            calls.len(),
            reward,
            burned,
            dividends
        );
        Ok(block)
    }
}
