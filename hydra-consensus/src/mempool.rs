//! Pool of transactions waiting for a block.

use std::collections::HashSet;

use hydra_core::{Address, Block, Hash, OutPoint, Transaction};
use log::{debug, info};

use crate::error::{ConsensusError, Result};

enum Eviction {
    Keep,
    Confirmed,
    Conflict,
}

/// Unconfirmed transactions in arrival order. Transactions may spend the
/// outputs of earlier pool transactions, but no two may spend the same
/// outpoint.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    txs: Vec<Transaction>,
    ids: HashSet<Hash>,
    spent: HashSet<OutPoint>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a transaction and returns its id.
    pub fn add(&mut self, tx: Transaction) -> Result<Hash> {
        let txid = tx.hash();
        if tx.is_coinbase() || tx.is_coinstake() {
            return Err(ConsensusError::Mempool(format!("{} is a block reward transaction", txid)));
        }
        if self.ids.contains(&txid) {
            return Err(ConsensusError::Mempool(format!("{} is already queued", txid)));
        }
        if let Some(input) = tx.inputs.iter().find(|input| self.spent.contains(&input.outpoint)) {
            return Err(ConsensusError::Mempool(format!(
                "{} double-spends {}:{}",
                txid, input.outpoint.tx_hash, input.outpoint.output_index
            )));
        }

        self.spent.extend(tx.inputs.iter().map(|input| input.outpoint));
        self.ids.insert(txid);
        self.txs.push(tx);
        debug!("Queued transaction {} ({} in pool)", txid, self.txs.len());
        Ok(txid)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn contains(&self, txid: &Hash) -> bool {
        self.ids.contains(txid)
    }

    /// Returns true if a queued transaction spends `outpoint`.
    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.spent.contains(outpoint)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Unspent outputs of queued transactions paying `address`.
    pub fn unconfirmed_outputs(&self, address: &Address) -> Vec<(OutPoint, u64)> {
        self.txs
            .iter()
            .flat_map(|tx| {
                let txid = tx.hash();
                tx.outputs
                    .iter()
                    .enumerate()
                    .filter(|(_, output)| output.script.owner().as_ref() == Some(address))
                    .map(move |(index, output)| (OutPoint::new(txid, index as u32), output.value))
            })
            .filter(|(outpoint, _)| !self.spent.contains(outpoint))
            .collect()
    }

    /// Drops transactions confirmed by `block`, those conflicting with it,
    /// and every queued transaction spending the outputs of a conflict.
    pub fn remove_confirmed(&mut self, block: &Block) {
        let confirmed: HashSet<Hash> = block.transactions.iter().map(Transaction::hash).collect();
        let spent_by_block: HashSet<OutPoint> = block
            .transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint))
            .collect();

        let before = self.txs.len();
        let evicted = self.evict(|tx, txid| {
            if confirmed.contains(txid) {
                Eviction::Confirmed
            } else if tx.inputs.iter().any(|input| spent_by_block.contains(&input.outpoint)) {
                Eviction::Conflict
            } else {
                Eviction::Keep
            }
        });
        if before != self.txs.len() {
            info!(
                "Removed {} transaction(s) from the pool after block {} ({} conflicting)",
                before - self.txs.len(),
                block.hash(),
                evicted
            );
        }
    }

    /// Drops one transaction and its queued descendants.
    pub fn remove(&mut self, txid: &Hash) {
        self.evict(|_, id| if id == txid { Eviction::Conflict } else { Eviction::Keep });
    }

    /// Applies `decide` to each queued transaction. Transactions spending an
    /// output of a conflict are dropped as conflicts too. Returns the number
    /// of conflicts dropped.
    fn evict<F>(&mut self, decide: F) -> usize
    where
        F: Fn(&Transaction, &Hash) -> Eviction,
    {
        let mut conflicts: HashSet<Hash> = HashSet::new();
        let mut kept = Vec::with_capacity(self.txs.len());
        // arrival order puts parents before their children
        for tx in std::mem::take(&mut self.txs) {
            let txid = tx.hash();
            let orphaned = tx.inputs.iter().any(|input| conflicts.contains(&input.outpoint.tx_hash));
            match decide(&tx, &txid) {
                Eviction::Confirmed => {}
                Eviction::Conflict => {
                    conflicts.insert(txid);
                }
                Eviction::Keep if orphaned => {
                    debug!("Dropping {}: it spends a removed transaction", txid);
                    conflicts.insert(txid);
                }
                Eviction::Keep => kept.push(tx),
            }
        }
        self.txs = kept;
        self.rebuild_indexes();
        conflicts.len()
    }

    fn rebuild_indexes(&mut self) {
        self.ids = self.txs.iter().map(Transaction::hash).collect();
        self.spent = self
            .txs
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(|input| input.outpoint))
            .collect();
    }
}
