//! Proof-of-stake kernel.
//!
//! A stake is eligible at a block time when its kernel hash, divided by the
//! staked value, falls under the proof-of-stake target. Block times are
//! quantized by the stake timestamp mask, so a staker only has a handful of
//! slots to try in any search window.

use std::cmp::Ordering;

use hydra_core::{Hash, OutPoint};
use log::{debug, trace};
use primitive_types::U256;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A coin that may be staked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeCandidate {
    pub prevout: OutPoint,
    pub value: u64,
    /// Time of the block that created the coin.
    pub block_time: u32,
}

/// The winning stake of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeSolution {
    pub candidate: StakeCandidate,
    /// Block time the kernel was computed for.
    pub time: u32,
    pub kernel: Hash,
}

/// Inclusive range of block times to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeWindow {
    pub start: u32,
    pub end: u32,
    pub mask: u32,
}

impl StakeWindow {
    pub fn new(start: u32, end: u32, mask: u32) -> Self {
        Self { start, end, mask }
    }

    /// A window holding a single block time; used when validating.
    pub fn exact(time: u32, mask: u32) -> Self {
        Self {
            start: time,
            end: time,
            mask,
        }
    }

    /// Candidate block times, earliest first. The start is aligned down to
    /// the mask.
    pub fn slots(&self) -> impl Iterator<Item = u32> {
        let step = self.mask as u64 + 1;
        let first = (self.start & !self.mask) as u64;
        let end = self.end as u64;
        (0..)
            .map(move |i| first + i * step)
            .take_while(move |t| *t <= end)
            .map(|t| t as u32)
    }
}

/// Hashes the stake kernel:
/// `sha256d(modifier || coin_time || txid || vout || block_time)`, integers
/// little-endian.
pub fn compute_kernel_hash(modifier: &Hash, prevout: &OutPoint, coin_block_time: u32, block_time: u32) -> Hash {
    let mut data = Vec::with_capacity(32 + 4 + 32 + 4 + 4);
    data.extend_from_slice(modifier.as_bytes());
    data.extend_from_slice(&coin_block_time.to_le_bytes());
    data.extend_from_slice(prevout.tx_hash.as_bytes());
    data.extend_from_slice(&prevout.output_index.to_le_bytes());
    data.extend_from_slice(&block_time.to_le_bytes());
    Hash::sha256d(&data)
}

/// Returns true if `kernel / value < target`. A zero-value stake is never
/// eligible.
pub fn is_eligible(kernel: &Hash, value: u64, target: &U256) -> bool {
    if value == 0 {
        return false;
    }
    kernel.to_u256() / U256::from(value) < *target
}

/// Orders solutions found at the same block time: smallest kernel first,
/// then smallest prevout.
fn compare_kernels(a: &(Hash, StakeCandidate), b: &(Hash, StakeCandidate)) -> Ordering {
    a.0.to_u256()
        .cmp(&b.0.to_u256())
        .then_with(|| a.1.prevout.cmp(&b.1.prevout))
}

/// Searches the window for the earliest block time at which one of the
/// candidates is eligible. Candidates are evaluated in parallel; the result
/// does not depend on their order.
pub fn solve_stake(modifier: &Hash, candidates: &[StakeCandidate], window: &StakeWindow, target: &U256) -> Option<StakeSolution> {
    for time in window.slots() {
        let best = candidates
            .par_iter()
            .filter(|candidate| candidate.block_time <= time)
            .filter_map(|candidate| {
                let kernel = compute_kernel_hash(modifier, &candidate.prevout, candidate.block_time, time);
                is_eligible(&kernel, candidate.value, target).then_some((kernel, *candidate))
            })
            .min_by(compare_kernels);

        if let Some((kernel, candidate)) = best {
            debug!(
                "Stake {}:{} eligible at time {} with kernel {}",
                candidate.prevout.tx_hash, candidate.prevout.output_index, time, kernel
            );
            return Some(StakeSolution { candidate, time, kernel });
        }
        trace!("No eligible stake at time {}", time);
    }
    None
}

/// Derives a block's modifier from its parent's modifier and the block's
/// proof: the kernel of a staked block, the hash of a proof-of-work block.
/// Genesis starts from zero.
pub fn next_stake_modifier(prev_modifier: &Hash, proof: &Hash) -> Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(proof.as_bytes());
    data[32..].copy_from_slice(prev_modifier.as_bytes());
    Hash::sha256d(&data)
}
