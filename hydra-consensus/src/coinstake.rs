//! Coinstake construction and checks.
//!
//! A coinstake spends the stake and pays it back, with the block reward, in
//! two equal pay-to-pubkey outputs after an empty marker output:
//!
//! ```text
//! [ empty | P2PK v | P2PK v | dividend ... | coinstake call ... ]    v = (stake + reward) / 2
//! ```
//!
//! Owners of contracts called in the block receive their dividend as
//! pay-to-pubkey-hash outputs, ordered by owner address. Any privileged
//! governance calls the block needs ride along as zero-value
//! [`Script::CoinstakeCall`] outputs.

use std::collections::BTreeMap;

use hydra_core::{
    verify_signature, Address, BlockHeader, KeyPair, PublicKey, Script, Signature, Transaction, TxInput, TxOutput,
};
use log::debug;

use crate::error::{ConsensusError, Result};
use crate::kernel::StakeCandidate;

/// Splits fees into the burned share and the remainder. Returns
/// `(reward, burned)` with `burned = (fees / 100) * burn_rate`.
pub fn block_reward(subsidy: u64, fees: u64, burn_rate: u64) -> (u64, u64) {
    let burned = (fees / 100).saturating_mul(burn_rate).min(fees);
    (subsidy.saturating_add(fees - burned), burned)
}

/// Dividends owed to contract owners, keyed by owner.
pub type Dividends = BTreeMap<Address, u64>;

/// Owner's share of the gas fee paid by one call:
/// `(gas_fee / 100) * dividend_rate`.
pub fn contract_dividend(gas_fee: u64, dividend_rate: u64) -> u64 {
    (gas_fee / 100).saturating_mul(dividend_rate).min(gas_fee)
}

/// Adds every entry of `other` to `into`.
pub fn merge_dividends(into: &mut Dividends, other: &Dividends) {
    for (owner, amount) in other {
        let total = into.entry(*owner).or_insert(0);
        *total = total.saturating_add(*amount);
    }
}

/// Sum of all dividends.
pub fn total_dividends(dividends: &Dividends) -> u64 {
    dividends.values().fold(0u64, |acc, amount| acc.saturating_add(*amount))
}

fn dividend_outputs(dividends: &Dividends) -> impl Iterator<Item = TxOutput> + '_ {
    dividends
        .iter()
        .filter(|(_, amount)| **amount > 0)
        .map(|(owner, amount)| TxOutput::new(*amount, Script::PayToPubKeyHash(*owner)))
}

/// Value of each of the two stake outputs.
pub fn split_value(stake_value: u64, reward: u64) -> Option<u64> {
    stake_value.checked_add(reward).map(|total| total / 2)
}

/// Builds and signs the coinstake for `candidate`. `reward` is the staker's
/// share, with dividends already taken out. Dividends follow the stake
/// outputs, then `calls` as coinstake-call outputs in the given order.
pub fn build_coinstake(
    candidate: &StakeCandidate,
    reward: u64,
    signing_key: &KeyPair,
    dividends: &Dividends,
    calls: &[(Address, Vec<u8>)],
) -> Result<Transaction> {
    let half = split_value(candidate.value, reward)
        .ok_or_else(|| ConsensusError::InvalidCoinstakeSplit("stake plus reward overflows".to_string()))?;

    let mut outputs = vec![
        TxOutput::empty(),
        TxOutput::new(half, Script::PayToPubKey(signing_key.public_key)),
        TxOutput::new(half, Script::PayToPubKey(signing_key.public_key)),
    ];
    outputs.extend(dividend_outputs(dividends));
    outputs.extend(calls.iter().map(|(contract, data)| {
        TxOutput::new(
            0,
            Script::CoinstakeCall {
                contract: *contract,
                data: data.clone(),
            },
        )
    }));

    let mut tx = Transaction::new(vec![TxInput::new(candidate.prevout)], outputs);
    tx.sign_inputs(signing_key)?;
    debug!(
        "Built coinstake {} spending {}:{} with {} dividend(s) and {} call(s)",
        tx.hash(),
        candidate.prevout.tx_hash,
        candidate.prevout.output_index,
        dividends.len(),
        calls.len()
    );
    Ok(tx)
}

/// Checks the payout layout of a coinstake, dividends included, and returns
/// the staker key from output 1.
pub fn check_coinstake_split(tx: &Transaction, stake_value: u64, reward: u64, dividends: &Dividends) -> Result<PublicKey> {
    let half = split_value(stake_value, reward)
        .ok_or_else(|| ConsensusError::InvalidCoinstakeSplit("stake plus reward overflows".to_string()))?;

    if tx.outputs.len() < 3 {
        return Err(ConsensusError::InvalidCoinstakeSplit(format!(
            "expected at least 3 outputs, found {}",
            tx.outputs.len()
        )));
    }
    if !tx.outputs[0].is_empty() {
        return Err(ConsensusError::InvalidCoinstakeSplit("first output is not empty".to_string()));
    }

    let key = match (&tx.outputs[1].script, &tx.outputs[2].script) {
        (Script::PayToPubKey(a), Script::PayToPubKey(b)) if a == b => *a,
        _ => {
            return Err(ConsensusError::InvalidCoinstakeSplit(
                "outputs 1 and 2 must pay the same public key".to_string(),
            ))
        }
    };

    for (index, output) in tx.outputs[1..3].iter().enumerate() {
        if output.value != half {
            return Err(ConsensusError::InvalidCoinstakeSplit(format!(
                "output {} pays {}, expected {}",
                index + 1,
                output.value,
                half
            )));
        }
    }

    let mut index = 3;
    for expected in dividend_outputs(dividends) {
        match tx.outputs.get(index) {
            Some(output) if *output == expected => index += 1,
            Some(output) => {
                return Err(ConsensusError::InvalidCoinstakeSplit(format!(
                    "output {} pays {}, expected dividend {} to {:?}",
                    index, output.value, expected.value, expected.script.owner()
                )))
            }
            None => {
                return Err(ConsensusError::InvalidCoinstakeSplit(format!(
                    "missing dividend of {} to {:?}",
                    expected.value,
                    expected.script.owner()
                )))
            }
        }
    }

    if let Some(extra) = tx.outputs[index..]
        .iter()
        .position(|output| output.value != 0 || !output.script.is_coinstake_call())
    {
        return Err(ConsensusError::InvalidCoinstakeSplit(format!(
            "output {} is not a zero-value coinstake call",
            extra + index
        )));
    }

    Ok(key)
}

/// The coinstake calls carried by `tx`, in output order.
pub fn coinstake_calls(tx: &Transaction) -> Vec<(Address, Vec<u8>)> {
    tx.outputs
        .iter()
        .filter_map(|output| match &output.script {
            Script::CoinstakeCall { contract, data } => Some((*contract, data.clone())),
            _ => None,
        })
        .collect()
}

/// Signs a staked block header.
pub fn sign_block(header: &mut BlockHeader, key: &KeyPair) -> Result<()> {
    header.signature = key.sign(header.hash_for_signature().as_bytes())?.to_vec();
    Ok(())
}

/// Verifies the staker's signature on a header.
pub fn verify_block_signature(header: &BlockHeader, key: &PublicKey) -> Result<()> {
    let signature = Signature::from_slice(&header.signature).ok_or(ConsensusError::BadBlockSignature)?;
    if verify_signature(key, header.hash_for_signature().as_bytes(), &signature)? {
        Ok(())
    } else {
        Err(ConsensusError::BadBlockSignature)
    }
}
