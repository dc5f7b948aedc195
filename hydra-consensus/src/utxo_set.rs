//! UTXO set management for the Hydra consensus engine.
//!
//! The set is held in memory and cloned together with the governance state
//! when a block is staged, so a rejected block leaves no trace.

use std::collections::BTreeMap;

use hydra_core::{Address, Coin, OutPoint, Transaction};
use log::trace;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSet {
    coins: BTreeMap<OutPoint, Coin>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a coin by its outpoint.
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.coins.contains_key(outpoint)
    }

    /// Adds a coin, replacing any coin at the same outpoint.
    pub fn add(&mut self, outpoint: OutPoint, coin: Coin) {
        trace!("Adding coin {}:{} worth {}", outpoint.tx_hash, outpoint.output_index, coin.output.value);
        self.coins.insert(outpoint, coin);
    }

    /// Adds every spendable output of `tx` created at `height`.
    pub fn add_transaction_outputs(&mut self, tx: &Transaction, height: u64, block_time: u32) {
        let txid = tx.hash();
        let is_coinbase = tx.is_coinbase();
        let is_coinstake = tx.is_coinstake();
        for (index, output) in tx.outputs.iter().enumerate() {
            if !output.script.is_spendable() {
                continue;
            }
            self.add(
                OutPoint::new(txid, index as u32),
                Coin {
                    output: output.clone(),
                    height,
                    block_time,
                    is_coinbase,
                    is_coinstake,
                },
            );
        }
    }

    /// Removes and returns a coin.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.remove(outpoint)
    }

    /// Coins spendable by `address`, in outpoint order.
    pub fn coins_of(&self, address: &Address) -> Vec<(OutPoint, Coin)> {
        self.coins
            .iter()
            .filter(|(_, coin)| coin.owner().as_ref() == Some(address))
            .map(|(outpoint, coin)| (*outpoint, coin.clone()))
            .collect()
    }

    /// Total value held by `address`.
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.coins
            .values()
            .filter(|coin| coin.owner().as_ref() == Some(address))
            .fold(0u64, |acc, coin| acc.saturating_add(coin.output.value))
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_core::{KeyPair, Script, TxOutput};

    #[test]
    fn test_only_spendable_outputs_become_coins() {
        let key = KeyPair::from_seed(&[1u8; 32]);
        let tx = Transaction::new_coinbase(
            1,
            vec![
                TxOutput::new(50, Script::PayToPubKeyHash(key.address())),
                TxOutput::new(0, Script::Empty),
            ],
        );
        let mut set = UtxoSet::new();
        set.add_transaction_outputs(&tx, 1, 1_600_000_000);

        assert_eq!(set.len(), 1);
        let coin = set.get(&OutPoint::new(tx.hash(), 0)).unwrap();
        assert!(coin.is_coinbase);
        assert_eq!(set.balance_of(&key.address()), 50);

        assert!(set.spend(&OutPoint::new(tx.hash(), 0)).is_some());
        assert!(set.is_empty());
    }
}
