//! Validation logic for the Hydra blockchain.
//!
//! This module contains the core validation logic for blocks and transactions,
//! ensuring they comply with the consensus rules. A block is checked and
//! applied against a clone of the parent's [`ChainState`]; the clone replaces
//! the live state only when every rule passes.
//!
//! Privileged governance mutations are checked in two passes. The first pass
//! walks the block and records what it does (contract deployments) and which
//! coinstake calls it carries. The second pass compares those calls with the
//! calls the block owes, before any transaction is applied.

use std::collections::HashSet;

use hydra_core::{
    verify_signature, Address, Block, Coin, Hash, OutPoint, PublicKey, Script, Signature, Transaction, TxInput, TxOutput,
};
use hydra_governance::{CallContext, Deployment, GovernanceConfig, GovernanceState};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::coinstake::{
    block_reward, check_coinstake_split, coinstake_calls, contract_dividend, merge_dividends, total_dividends,
    verify_block_signature, Dividends,
};
use crate::error::{ConsensusError, Result};
use crate::kernel::{next_stake_modifier, solve_stake, StakeCandidate, StakeWindow};
use crate::params::ChainParams;
use crate::target::check_proof_of_work;
use crate::utxo_set::UtxoSet;

/// Everything a block is validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub utxos: UtxoSet,
    pub governance: GovernanceState,
}

impl ChainState {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            utxos: UtxoSet::new(),
            governance: GovernanceState::new(config),
        }
    }
}

/// What the chain remembers about a connected block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndexEntry {
    pub hash: Hash,
    pub height: u64,
    pub time: u32,
    /// Modifier mixed into the kernels of this block's children.
    pub stake_modifier: Hash,
    pub is_proof_of_stake: bool,
}

/// Per-block values transactions are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub height: u64,
    pub time: u32,
    /// Oracle gas price at the start of the block.
    pub min_gas_price: u64,
    pub min_gas_limit: u64,
    pub maturity: u64,
    /// Dividend rate at the start of the block.
    pub dividend_rate: u64,
}

impl BlockContext {
    pub fn new(params: &ChainParams, state: &ChainState, height: u64, time: u32) -> Self {
        Self {
            height,
            time,
            min_gas_price: state.governance.min_gas_price(),
            min_gas_limit: params.min_gas_limit,
            maturity: params.coinbase_maturity,
            dividend_rate: state.governance.dividend_rate(),
        }
    }
}

/// Result of applying one regular transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxEffects {
    pub fee: u64,
    pub gas: u64,
    pub deployments: Vec<Deployment>,
    /// Gas fee shares owed to the owners of called contracts.
    pub dividends: Dividends,
}

/// Summary of a block that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedBlock {
    pub hash: Hash,
    pub height: u64,
    pub time: u32,
    pub stake_modifier: Hash,
    pub is_proof_of_stake: bool,
    /// Fees paid by the block's regular transactions.
    pub fees: u64,
    /// Share of the fees destroyed by the burn rate.
    pub burned: u64,
    /// Value created for the block producer.
    pub reward: u64,
    /// Value paid to contract owners by the coinstake.
    pub dividends: u64,
}

impl ConnectedBlock {
    pub fn index_entry(&self) -> BlockIndexEntry {
        BlockIndexEntry {
            hash: self.hash,
            height: self.height,
            time: self.time,
            stake_modifier: self.stake_modifier,
            is_proof_of_stake: self.is_proof_of_stake,
        }
    }
}

/// Contract deployments of a transaction, addressed by their outpoints.
pub fn transaction_deployments(tx: &Transaction) -> Vec<Deployment> {
    let Some(owner) = tx.sender() else {
        return Vec::new();
    };
    let txid = tx.hash();
    tx.outputs
        .iter()
        .enumerate()
        .filter(|(_, output)| matches!(output.script, Script::Create { .. }))
        .map(|(index, _)| Deployment {
            contract: OutPoint::new(txid, index as u32).contract_address(),
            owner,
        })
        .collect()
}

/// Checks that `input` may spend `coin` under the signing hash of its
/// transaction.
fn verify_input(txid: Hash, input: &TxInput, coin: &Coin, signing_hash: &Hash) -> Result<()> {
    let owner = coin
        .owner()
        .ok_or_else(|| ConsensusError::invalid_tx(txid, "input spends an unspendable output"))?;
    if input.public_key.address() != owner {
        return Err(ConsensusError::invalid_tx(txid, "input key does not own the coin"));
    }
    let signature = Signature::from_slice(&input.signature)
        .ok_or_else(|| ConsensusError::invalid_tx(txid, "malformed input signature"))?;
    if !verify_signature(&input.public_key, signing_hash.as_bytes(), &signature)? {
        return Err(ConsensusError::invalid_tx(txid, "bad input signature"));
    }
    Ok(())
}

/// Validates a regular transaction and applies it to `state`. Nothing
/// changes when an error is returned. Failing contract calls do not fail the
/// transaction; their value is refunded to the sender at the call outpoint.
pub fn apply_transaction(state: &mut ChainState, tx: &Transaction, ctx: &BlockContext) -> Result<TxEffects> {
    let txid = tx.hash();

    if tx.is_coinbase() {
        return Err(ConsensusError::invalid_tx(txid, "unexpected coinbase"));
    }
    if tx.inputs.is_empty() || tx.outputs.is_empty() {
        return Err(ConsensusError::invalid_tx(txid, "transaction has no inputs or no outputs"));
    }
    if tx.has_coinstake_calls() {
        return Err(ConsensusError::CoinstakeCallOutsideCoinstake(txid));
    }

    // 1. Inputs
    let signing_hash = tx.hash_for_signature();
    let mut seen_inputs = HashSet::new();
    let mut value_in = 0u64;
    for input in &tx.inputs {
        if input.is_coinbase() {
            return Err(ConsensusError::invalid_tx(txid, "null input in a regular transaction"));
        }
        if !seen_inputs.insert(input.outpoint) {
            return Err(ConsensusError::invalid_tx(txid, "duplicate input"));
        }
        let coin = state
            .utxos
            .get(&input.outpoint)
            .ok_or_else(|| ConsensusError::invalid_tx(txid, format!("missing input {}:{}", input.outpoint.tx_hash, input.outpoint.output_index)))?;
        if coin.is_reward() && ctx.height.saturating_sub(coin.height) < ctx.maturity {
            return Err(ConsensusError::invalid_tx(txid, "spends an immature reward"));
        }
        verify_input(txid, input, coin, &signing_hash)?;
        value_in = value_in
            .checked_add(coin.output.value)
            .ok_or_else(|| ConsensusError::invalid_tx(txid, "input value overflow"))?;
    }

    // 2. Fee and gas
    let value_out = tx
        .total_output_value()
        .ok_or_else(|| ConsensusError::invalid_tx(txid, "output value overflow"))?;
    let fee = value_in
        .checked_sub(value_out)
        .ok_or_else(|| ConsensusError::invalid_tx(txid, format!("outputs {} exceed inputs {}", value_out, value_in)))?;

    let mut gas = 0u64;
    let mut gas_fee = 0u64;
    for output in tx.outputs.iter().filter(|output| output.script.is_contract()) {
        if output.script.gas_price() < ctx.min_gas_price {
            return Err(ConsensusError::invalid_tx(
                txid,
                format!("gas price {} below minimum {}", output.script.gas_price(), ctx.min_gas_price),
            ));
        }
        if output.script.gas_limit() < ctx.min_gas_limit {
            return Err(ConsensusError::invalid_tx(
                txid,
                format!("gas limit {} below minimum {}", output.script.gas_limit(), ctx.min_gas_limit),
            ));
        }
        gas = gas.saturating_add(output.script.gas_limit());
        gas_fee = output
            .script
            .gas_fee()
            .and_then(|f| gas_fee.checked_add(f))
            .ok_or_else(|| ConsensusError::invalid_tx(txid, "gas fee overflow"))?;
    }
    if gas_fee > fee {
        return Err(ConsensusError::invalid_tx(txid, format!("fee {} does not cover gas {}", fee, gas_fee)));
    }

    let sender = tx
        .sender()
        .ok_or_else(|| ConsensusError::invalid_tx(txid, "transaction has no sender"))?;

    let mut dividends = Dividends::new();
    for output in &tx.outputs {
        if let Script::Call { contract, .. } = &output.script {
            if let Some(owner) = state.governance.dividend_owner(contract) {
                let dividend = contract_dividend(output.script.gas_fee().unwrap_or(0), ctx.dividend_rate);
                merge_dividends(&mut dividends, &Dividends::from([(owner, dividend)]));
            }
        }
    }

    let deployments = transaction_deployments(tx);
    if let Some(taken) = deployments
        .iter()
        .find(|d| state.governance.contract(&d.contract).is_some())
    {
        return Err(ConsensusError::invalid_tx(txid, format!("contract address {} is taken", taken.contract)));
    }

    // 3. Apply
    for input in &tx.inputs {
        state.utxos.spend(&input.outpoint);
    }

    for (index, output) in tx.outputs.iter().enumerate() {
        let outpoint = OutPoint::new(txid, index as u32);
        match &output.script {
            Script::PayToPubKey(_) | Script::PayToPubKeyHash(_) => state.utxos.add(
                outpoint,
                Coin {
                    output: output.clone(),
                    height: ctx.height,
                    block_time: ctx.time,
                    is_coinbase: false,
                    is_coinstake: false,
                },
            ),
            Script::Empty => {
                if output.value > 0 {
                    debug!("Transaction {} burns {} at output {}", txid, output.value, index);
                }
            }
            Script::Create { code, .. } => {
                state
                    .governance
                    .deploy_contract(outpoint.contract_address(), sender, code, output.value, ctx.height)
                    .map_err(|e| ConsensusError::invalid_tx(txid, e.to_string()))?;
            }
            Script::Call { contract, data, .. } => {
                let call = CallContext::transaction(sender, output.value, ctx.height);
                if let Err(e) = state.governance.execute(&call, contract, data) {
                    warn!("Call to {} in {} reverted: {}", contract, txid, e);
                    if output.value > 0 {
                        state.utxos.add(
                            outpoint,
                            Coin {
                                output: TxOutput::new(output.value, Script::PayToPubKeyHash(sender)),
                                height: ctx.height,
                                block_time: ctx.time,
                                is_coinbase: false,
                                is_coinstake: false,
                            },
                        );
                    }
                }
            }
            // rejected before any input was spent
            Script::CoinstakeCall { .. } => {}
        }
    }

    Ok(TxEffects {
        fee,
        gas,
        deployments,
        dividends,
    })
}

/// Compares the calls a coinstake carries with the calls the block owes.
fn check_coinstake_authorizations(required: &[(Address, Vec<u8>)], actual: &[(Address, Vec<u8>)]) -> Result<()> {
    for (index, call) in required.iter().enumerate() {
        if actual.get(index) == Some(call) {
            continue;
        }
        let description = format!("{} <- {}", call.0, hex::encode(&call.1));
        return Err(if actual.contains(call) {
            ConsensusError::UnexpectedCoinstakeCall(format!("{} is out of order", description))
        } else {
            ConsensusError::MissingCoinstakeAuthorization(description)
        });
    }
    if let Some((contract, data)) = actual.get(required.len()) {
        return Err(ConsensusError::UnexpectedCoinstakeCall(format!("{} <- {}", contract, hex::encode(data))));
    }
    Ok(())
}

/// Verified stake of a proof-of-stake block.
struct StakeProof {
    kernel: Hash,
    stake_value: u64,
    staker: PublicKey,
}

/// Validates blocks against a chain state.
#[derive(Debug, Clone, Default)]
pub struct BlockValidator {
    params: ChainParams,
}

impl BlockValidator {
    pub fn new(params: ChainParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Validates `block` on top of `prev` and returns the state after it.
    /// `state` is left untouched; callers commit by replacing their state
    /// with the returned one.
    pub fn connect_block(
        &self,
        state: &ChainState,
        prev: &BlockIndexEntry,
        block: &Block,
        now: u32,
    ) -> Result<(ChainState, ConnectedBlock)> {
        let header = &block.header;
        let hash = block.hash();
        let height = prev.height + 1;

        // 1. Context and structure
        if header.prev_block_hash != prev.hash {
            return Err(ConsensusError::UnknownParent(header.prev_block_hash));
        }
        self.check_structure(block)?;
        if header.time <= prev.time {
            return Err(ConsensusError::TimeTooOld {
                time: header.time,
                parent_time: prev.time,
            });
        }
        let limit = now.saturating_add(self.params.max_future_drift);
        if header.time > limit {
            return Err(ConsensusError::TimeTooNew {
                time: header.time,
                limit,
            });
        }

        // 2. Governance limits
        let size = block.serialized_size();
        let max_size = state.governance.block_size_limit();
        if size > max_size {
            return Err(ConsensusError::BlockTooLarge { size, max: max_size });
        }
        let gas: u64 = block
            .transactions
            .iter()
            .flat_map(|tx| tx.outputs.iter())
            .fold(0u64, |acc, output| acc.saturating_add(output.script.gas_limit()));
        let gas_limit = state.governance.block_gas_limit();
        if gas > gas_limit {
            return Err(ConsensusError::BlockGasLimitExceeded { used: gas, limit: gas_limit });
        }

        // 3. Block type
        let is_pos = self.params.is_pos_height(height);
        if is_pos != header.is_proof_of_stake() {
            return Err(ConsensusError::WrongBlockType {
                height,
                expected: if is_pos { "stake" } else { "work" },
            });
        }
        let stake = if is_pos {
            Some(self.check_pos_block(state, prev, block, height)?)
        } else {
            self.check_pow_block(block)?;
            None
        };

        // 4. First pass: what the block does
        let first_regular = if is_pos { 2 } else { 1 };
        for tx in block.transactions.iter().enumerate().filter(|(i, _)| !(is_pos && *i == 1)).map(|(_, tx)| tx) {
            if tx.has_coinstake_calls() {
                return Err(ConsensusError::CoinstakeCallOutsideCoinstake(tx.hash()));
            }
        }
        let deployments: Vec<Deployment> = block.transactions[first_regular..]
            .iter()
            .flat_map(transaction_deployments)
            .collect();

        // 5. Second pass: what the coinstake authorizes
        let calls = match block.coinstake().filter(|_| is_pos) {
            Some(coinstake) => {
                let required = state.governance.required_coinstake_calls(height, &deployments);
                let actual = coinstake_calls(coinstake);
                check_coinstake_authorizations(&required, &actual)?;
                actual
            }
            None => {
                if !deployments.is_empty() {
                    return Err(ConsensusError::MissingCoinstakeAuthorization(format!(
                        "{} contract deployment(s) in a proof-of-work block",
                        deployments.len()
                    )));
                }
                Vec::new()
            }
        };

        // 6. Apply transactions
        let mut staged = state.clone();
        let ctx = BlockContext::new(&self.params, &staged, height, header.time);
        if is_pos {
            let coinstake = &block.transactions[1];
            let input = &coinstake.inputs[0];
            let coin = staged
                .utxos
                .get(&input.outpoint)
                .ok_or(ConsensusError::StakeNotFound(input.outpoint))?;
            verify_input(coinstake.hash(), input, coin, &coinstake.hash_for_signature())?;
            staged.utxos.spend(&input.outpoint);
        }

        let mut fees = 0u64;
        let mut dividends = Dividends::new();
        for tx in &block.transactions[first_regular..] {
            let effects = apply_transaction(&mut staged, tx, &ctx)?;
            fees = fees
                .checked_add(effects.fee)
                .ok_or_else(|| ConsensusError::invalid_tx(tx.hash(), "block fee overflow"))?;
            merge_dividends(&mut dividends, &effects.dividends);
        }

        // 7. Rewards
        let subsidy = self.params.block_subsidy(height);
        let coinbase = &block.transactions[0];
        let (reward, burned, paid_dividends) = match &stake {
            Some(proof) => {
                if !coinbase.outputs.iter().all(TxOutput::is_empty) {
                    return Err(ConsensusError::BadCoinbase("staked block coinbase must be empty".to_string()));
                }
                let (reward, burned) = block_reward(subsidy, fees, staged.governance.burn_rate());
                let owed = total_dividends(&dividends);
                let reward = reward.checked_sub(owed).ok_or_else(|| {
                    ConsensusError::InvalidCoinstakeSplit(format!("dividends {} exceed reward {}", owed, reward))
                })?;
                check_coinstake_split(&block.transactions[1], proof.stake_value, reward, &dividends)?;
                staged
                    .utxos
                    .add_transaction_outputs(&block.transactions[1], height, header.time);
                (reward, burned, owed)
            }
            None => {
                let paid = coinbase
                    .total_output_value()
                    .ok_or_else(|| ConsensusError::BadCoinbase("coinbase value overflow".to_string()))?;
                let allowed = subsidy.saturating_add(fees);
                if paid > allowed {
                    return Err(ConsensusError::BadCoinbase(format!("coinbase pays {}, allowed {}", paid, allowed)));
                }
                (paid, 0, 0)
            }
        };
        if coinbase.outputs.iter().any(|output| output.script.is_contract()) {
            return Err(ConsensusError::BadCoinbase("coinbase carries a contract output".to_string()));
        }
        staged.utxos.add_transaction_outputs(coinbase, height, header.time);

        // 8. Privileged calls
        for (contract, data) in &calls {
            staged
                .governance
                .execute(&CallContext::coinstake(height), contract, data)
                .map_err(ConsensusError::CoinstakeCallFailed)?;
        }

        // 9. Modifier
        let stake_modifier = match &stake {
            Some(proof) => next_stake_modifier(&prev.stake_modifier, &proof.kernel),
            None => next_stake_modifier(&prev.stake_modifier, &hash),
        };

        let connected = ConnectedBlock {
            hash,
            height,
            time: header.time,
            stake_modifier,
            is_proof_of_stake: is_pos,
            fees,
            burned,
            reward,
            dividends: paid_dividends,
        };
        info!(
            "Connected {} block {} at height {} ({} txs, fees {}, burned {}, reward {}, dividends {})",
            if is_pos { "PoS" } else { "PoW" },
            hash,
            height,
            block.transactions.len(),
            fees,
            burned,
            reward,
            paid_dividends
        );
        if let Some(proof) = &stake {
            debug!("Block {} staked by {}", hash, proof.staker.address());
        }
        Ok((staged, connected))
    }

    fn check_structure(&self, block: &Block) -> Result<()> {
        let coinbase = block.transactions.first().ok_or(ConsensusError::EmptyBlock)?;
        if !coinbase.is_coinbase() {
            return Err(ConsensusError::BadCoinbase("first transaction is not a coinbase".to_string()));
        }

        let mut txids = HashSet::new();
        for (index, tx) in block.transactions.iter().enumerate() {
            let txid = tx.hash();
            if !txids.insert(txid) {
                return Err(ConsensusError::invalid_tx(txid, "duplicate transaction"));
            }
            if index > 0 && tx.is_coinbase() {
                return Err(ConsensusError::BadCoinbase("more than one coinbase".to_string()));
            }
            if index > 1 && tx.is_coinstake() {
                return Err(ConsensusError::invalid_tx(txid, "coinstake outside the second position"));
            }
        }

        if block.compute_merkle_root() != block.header.merkle_root {
            return Err(ConsensusError::BadMerkleRoot);
        }
        Ok(())
    }

    fn check_pow_block(&self, block: &Block) -> Result<()> {
        let bits = block.header.bits;
        if bits != self.params.pow_limit_bits {
            return Err(ConsensusError::BadBits {
                expected: self.params.pow_limit_bits,
                found: bits,
            });
        }
        if !check_proof_of_work(&block.hash(), bits) {
            return Err(ConsensusError::InvalidProofOfWork);
        }
        Ok(())
    }

    fn check_pos_block(&self, state: &ChainState, prev: &BlockIndexEntry, block: &Block, height: u64) -> Result<StakeProof> {
        let header = &block.header;
        if header.bits != self.params.pos_limit_bits {
            return Err(ConsensusError::BadBits {
                expected: self.params.pos_limit_bits,
                found: header.bits,
            });
        }
        if !self.params.is_stake_timestamp(header.time) {
            return Err(ConsensusError::BadStakeTimestamp(header.time));
        }

        let coinstake = block.coinstake().ok_or(ConsensusError::MissingCoinstake)?;
        if coinstake.inputs.len() != 1 || coinstake.inputs[0].outpoint != header.prevout_stake {
            return Err(ConsensusError::StakeMismatch);
        }

        let coin = state
            .utxos
            .get(&header.prevout_stake)
            .ok_or(ConsensusError::StakeNotFound(header.prevout_stake))?;
        let depth = height.saturating_sub(coin.height);
        if depth <= self.params.coinbase_maturity {
            return Err(ConsensusError::StakeImmature {
                depth,
                required: self.params.coinbase_maturity,
            });
        }
        if coin.block_time > header.time {
            return Err(ConsensusError::InvalidStakeKernel);
        }

        let candidate = StakeCandidate {
            prevout: header.prevout_stake,
            value: coin.output.value,
            block_time: coin.block_time,
        };
        let window = StakeWindow::exact(header.time, self.params.stake_timestamp_mask);
        let solution = solve_stake(&prev.stake_modifier, &[candidate], &window, &self.params.pos_target())
            .filter(|solution| solution.time == header.time && solution.candidate == candidate)
            .ok_or(ConsensusError::InvalidStakeKernel)?;

        let staker = match coinstake.outputs.get(1).map(|output| &output.script) {
            Some(Script::PayToPubKey(key)) => *key,
            _ => {
                return Err(ConsensusError::InvalidCoinstakeSplit(
                    "output 1 is not pay-to-pubkey".to_string(),
                ))
            }
        };
        verify_block_signature(header, &staker)?;

        Ok(StakeProof {
            kernel: solution.kernel,
            stake_value: coin.output.value,
            staker,
        })
    }
}
