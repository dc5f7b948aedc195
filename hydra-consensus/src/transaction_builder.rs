//! Builds and signs payments, contract calls and deployments.

use hydra_core::{Address, KeyPair, OutPoint, Script, Transaction, TxInput, TxOutput};
use log::debug;

use crate::error::{ConsensusError, Result};

/// Picks coins smallest first until `amount_needed` is covered, taking at
/// least one. Returns the chosen outpoints and their total value.
pub fn select_coins(available: &[(OutPoint, u64)], amount_needed: u64) -> Result<(Vec<OutPoint>, u64)> {
    let mut sorted: Vec<&(OutPoint, u64)> = available.iter().collect();
    sorted.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut selected = Vec::new();
    let mut current_value = 0u64;
    for (outpoint, value) in sorted {
        selected.push(*outpoint);
        current_value = current_value.saturating_add(*value);
        if current_value >= amount_needed {
            return Ok((selected, current_value));
        }
    }

    Err(ConsensusError::InsufficientFunds {
        needed: amount_needed,
        available: current_value,
    })
}

/// Builds transactions spending the coins of one key.
pub struct TransactionBuilder<'a> {
    key: &'a KeyPair,
    relay_fee: u64,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(key: &'a KeyPair, relay_fee: u64) -> Self {
        Self { key, relay_fee }
    }

    /// Pays `amount` to `to`.
    pub fn build_payment(&self, coins: &[(OutPoint, u64)], to: &Address, amount: u64) -> Result<Transaction> {
        self.build(coins, vec![TxOutput::new(amount, Script::PayToPubKeyHash(*to))])
    }

    /// Calls `contract` with `data`, attaching `value`.
    pub fn build_contract_call(
        &self,
        coins: &[(OutPoint, u64)],
        contract: &Address,
        data: Vec<u8>,
        value: u64,
        gas_limit: u64,
        gas_price: u64,
    ) -> Result<Transaction> {
        let script = Script::Call {
            contract: *contract,
            data,
            gas_limit,
            gas_price,
        };
        self.build(coins, vec![TxOutput::new(value, script)])
    }

    /// Deploys `code`, funding the contract with `value`.
    pub fn build_deployment(
        &self,
        coins: &[(OutPoint, u64)],
        code: Vec<u8>,
        value: u64,
        gas_limit: u64,
        gas_price: u64,
    ) -> Result<Transaction> {
        let script = Script::Create {
            code,
            gas_limit,
            gas_price,
        };
        self.build(coins, vec![TxOutput::new(value, script)])
    }

    fn build(&self, coins: &[(OutPoint, u64)], mut outputs: Vec<TxOutput>) -> Result<Transaction> {
        let overflow = || ConsensusError::InsufficientFunds {
            needed: u64::MAX,
            available: 0,
        };
        let gas_fee = outputs
            .iter()
            .try_fold(0u64, |acc, output| output.script.gas_fee().and_then(|fee| acc.checked_add(fee)))
            .ok_or_else(overflow)?;
        let fee = self.relay_fee.checked_add(gas_fee).ok_or_else(overflow)?;
        let needed = outputs
            .iter()
            .try_fold(fee, |acc, output| acc.checked_add(output.value))
            .ok_or_else(overflow)?;

        let (selected, total) = select_coins(coins, needed)?;
        let change = total - needed;
        if change > 0 {
            outputs.push(TxOutput::new(change, Script::PayToPubKeyHash(self.key.address())));
        }

        let inputs = selected.into_iter().map(TxInput::new).collect();
        let mut tx = Transaction::new(inputs, outputs);
        tx.sign_inputs(self.key)?;
        debug!("Built transaction {} with fee {} and change {}", tx.hash(), fee, change);
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_core::{Hash, COIN};

    fn coins() -> Vec<(OutPoint, u64)> {
        vec![
            (OutPoint::new(Hash::sha256(b"a"), 0), 5 * COIN),
            (OutPoint::new(Hash::sha256(b"b"), 0), COIN),
            (OutPoint::new(Hash::sha256(b"c"), 0), 2 * COIN),
        ]
    }

    #[test]
    fn test_selects_smallest_coins_first() {
        let (selected, total) = select_coins(&coins(), 3 * COIN).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(total, 3 * COIN);
    }

    #[test]
    fn test_insufficient_funds() {
        assert!(matches!(
            select_coins(&coins(), 9 * COIN),
            Err(ConsensusError::InsufficientFunds { available, .. }) if available == 8 * COIN
        ));
    }

    #[test]
    fn test_contract_call_pays_gas_and_returns_change() {
        let key = KeyPair::from_seed(&[8u8; 32]);
        let builder = TransactionBuilder::new(&key, 100_000);
        let dgp = Address::from_low_u64_be(0x91);
        let tx = builder
            .build_contract_call(&coins(), &dgp, vec![0x79, 0x69, 0x89, 0xe2], 0, 100_000, 40)
            .unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].value, COIN - 100_000 - 4_000_000);
        assert_eq!(tx.sender(), Some(key.address()));
    }
}
