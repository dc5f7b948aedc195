//! Core types for the Hydra blockchain

use serde::{Deserialize, Serialize};

use crate::crypto::{hash160, Address, Hash, KeyPair, PublicKey};

mod script;

pub use script::Script;

/// Number of satoshi in one coin.
pub const COIN: u64 = 100_000_000;

/// Encodes a value with the consensus serialization.
pub fn consensus_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("Failed to serialize consensus object")
}

/// Identifies a specific transaction output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    /// Transaction holding the output.
    pub tx_hash: Hash,
    /// Position of the output in that transaction.
    pub output_index: u32,
}

impl OutPoint {
    /// Creates an outpoint.
    pub fn new(tx_hash: Hash, output_index: u32) -> Self {
        Self { tx_hash, output_index }
    }

    /// The outpoint referenced by coinbase inputs and PoW headers.
    pub fn null() -> Self {
        Self {
            tx_hash: Hash::zero(),
            output_index: u32::MAX,
        }
    }

    /// Returns true for [`OutPoint::null`].
    pub fn is_null(&self) -> bool {
        self.tx_hash.is_zero() && self.output_index == u32::MAX
    }

    /// Address of a contract deployed by the output at this outpoint.
    pub fn contract_address(&self) -> Address {
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(self.tx_hash.as_bytes());
        data.extend_from_slice(&self.output_index.to_le_bytes());
        Address(hash160(&data))
    }
}

/// A transaction input references an output from a previous transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxInput {
    /// Reference to the transaction output being spent
    pub outpoint: OutPoint,
    /// Signature that proves ownership of the output being spent
    pub signature: Vec<u8>,
    /// Public key of the output being spent
    pub public_key: PublicKey,
}

impl TxInput {
    /// Creates an unsigned input spending `outpoint`.
    pub fn new(outpoint: OutPoint) -> Self {
        Self {
            outpoint,
            signature: Vec::new(),
            public_key: PublicKey::zero(),
        }
    }

    /// Returns true if this is a coinbase input.
    pub fn is_coinbase(&self) -> bool {
        self.outpoint.is_null()
    }
}

/// A transaction output specifies an amount and a locking script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxOutput {
    /// Amount in satoshis
    pub value: u64,
    /// Locking script or contract envelope
    pub script: Script,
}

impl TxOutput {
    /// Creates an output.
    pub fn new(value: u64, script: Script) -> Self {
        Self { value, script }
    }

    /// The zero-value empty output opening a coinstake.
    pub fn empty() -> Self {
        Self {
            value: 0,
            script: Script::Empty,
        }
    }

    /// Returns true for a zero-value output with an empty script.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script.is_empty()
    }
}

/// A transaction is a transfer of value between wallets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction version
    pub version: u32,
    /// List of inputs
    pub inputs: Vec<TxInput>,
    /// List of outputs
    pub outputs: Vec<TxOutput>,
    /// Lock time or block number after which this transaction is valid
    pub lock_time: u32,
}

impl Transaction {
    /// Creates an unsigned transaction.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Creates a coinbase transaction for `height`. The height is committed in
    /// the input so that coinbases of different blocks never share a txid.
    pub fn new_coinbase(height: u64, outputs: Vec<TxOutput>) -> Self {
        let input = TxInput {
            outpoint: OutPoint::null(),
            signature: height.to_le_bytes().to_vec(),
            public_key: PublicKey::zero(),
        };
        Self::new(vec![input], outputs)
    }

    /// Computes the transaction id.
    pub fn hash(&self) -> Hash {
        Hash::sha256d(&consensus_bytes(self))
    }

    /// Computes the hash of the transaction for signing purposes (excludes signatures).
    pub fn hash_for_signature(&self) -> Hash {
        let mut tx_copy = self.clone();
        for input in &mut tx_copy.inputs {
            input.signature.clear();
        }
        Hash::sha256d(&consensus_bytes(&tx_copy))
    }

    /// Sets every input's public key to `keypair` and signs them.
    pub fn sign_inputs(&mut self, keypair: &KeyPair) -> anyhow::Result<()> {
        for input in &mut self.inputs {
            input.public_key = keypair.public_key;
        }
        let signature = keypair.sign(self.hash_for_signature().as_bytes())?.to_vec();
        for input in &mut self.inputs {
            input.signature = signature.clone();
        }
        Ok(())
    }

    /// Returns true if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Returns true if this is a coinstake: a real first input, at least two
    /// outputs and an empty first output.
    pub fn is_coinstake(&self) -> bool {
        match (self.inputs.first(), self.outputs.first()) {
            (Some(input), Some(first)) => !input.is_coinbase() && self.outputs.len() >= 2 && first.is_empty(),
            _ => false,
        }
    }

    /// Address of the key that signed the first input.
    pub fn sender(&self) -> Option<Address> {
        match self.inputs.first() {
            Some(input) if !input.is_coinbase() => Some(input.public_key.address()),
            _ => None,
        }
    }

    /// Sum of output values, or `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs.iter().try_fold(0u64, |acc, output| acc.checked_add(output.value))
    }

    /// Returns true if any output deploys or calls a contract.
    pub fn has_contract_outputs(&self) -> bool {
        self.outputs.iter().any(|output| output.script.is_contract())
    }

    /// Returns true if any output carries a coinstake-only call.
    pub fn has_coinstake_calls(&self) -> bool {
        self.outputs.iter().any(|output| output.script.is_coinstake_call())
    }
}

/// A spendable entry of the UTXO set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coin {
    /// The unspent output.
    pub output: TxOutput,
    /// Height of the block that created it.
    pub height: u64,
    /// Timestamp of the block that created it.
    pub block_time: u32,
    /// Created by a coinbase.
    pub is_coinbase: bool,
    /// Created by a coinstake.
    pub is_coinstake: bool,
}

impl Coin {
    /// Returns true for coins that must reach maturity before spending.
    pub fn is_reward(&self) -> bool {
        self.is_coinbase || self.is_coinstake
    }

    /// The address able to spend the coin.
    pub fn owner(&self) -> Option<Address> {
        self.output.script.owner()
    }
}

/// A Merkle tree is a binary tree of hashes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleTree {
    /// The root hash of the Merkle tree.
    pub root: Hash,
}

impl MerkleTree {
    /// Creates a new Merkle tree from a list of hashes.
    pub fn from_hashes(hashes: Vec<Hash>) -> Self {
        if hashes.is_empty() {
            return Self { root: Hash::zero() };
        }

        let mut current_level = hashes;
        while current_level.len() > 1 {
            current_level = current_level
                .chunks(2)
                .map(|pair| {
                    let left = pair[0];
                    let right = pair.get(1).copied().unwrap_or(left);
                    let mut combined = [0u8; 64];
                    combined[..32].copy_from_slice(left.as_bytes());
                    combined[32..].copy_from_slice(right.as_bytes());
                    Hash::blake3(&combined)
                })
                .collect();
        }

        Self { root: current_level[0] }
    }
}

/// Block header contains metadata about a block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Protocol version
    pub version: u32,
    /// Hash of the previous block
    pub prev_block_hash: Hash,
    /// Root hash of the Merkle tree of transactions
    pub merkle_root: Hash,
    /// Block creation timestamp (seconds since Unix epoch)
    pub time: u32,
    /// Current target in compact format
    pub bits: u32,
    /// Nonce value used for mining
    pub nonce: u32,
    /// Stake spent by the coinstake; null for proof-of-work blocks
    pub prevout_stake: OutPoint,
    /// Signature of the staker over [`BlockHeader::hash_for_signature`]
    pub signature: Vec<u8>,
}

impl BlockHeader {
    /// Computes the block hash.
    pub fn hash(&self) -> Hash {
        Hash::sha256d(&consensus_bytes(self))
    }

    /// Computes the hash signed by the staker (excludes the signature).
    pub fn hash_for_signature(&self) -> Hash {
        let mut unsigned = self.clone();
        unsigned.signature.clear();
        Hash::sha256d(&consensus_bytes(&unsigned))
    }

    /// Returns true if the header commits to a stake.
    pub fn is_proof_of_stake(&self) -> bool {
        !self.prevout_stake.is_null()
    }
}

/// A block contains a header and a list of transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// List of transactions in this block
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates a new block
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block { header, transactions }
    }

    /// Computes the block hash (same as the header hash)
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Computes the Merkle root of the block's transactions.
    pub fn compute_merkle_root(&self) -> Hash {
        let tx_hashes: Vec<Hash> = self.transactions.iter().map(Transaction::hash).collect();
        MerkleTree::from_hashes(tx_hashes).root
    }

    /// Returns true for a staked block: a stake in the header and a coinstake
    /// as second transaction.
    pub fn is_proof_of_stake(&self) -> bool {
        self.header.is_proof_of_stake() && self.coinstake().is_some()
    }

    /// The coinstake transaction, if the second transaction is one.
    pub fn coinstake(&self) -> Option<&Transaction> {
        self.transactions.get(1).filter(|tx| tx.is_coinstake())
    }

    /// Size of the block in its consensus encoding.
    pub fn serialized_size(&self) -> u64 {
        consensus_bytes(self).len() as u64
    }
}
