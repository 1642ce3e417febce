// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use alloy_primitives::{keccak256, B256};

pub const GENESIS_ROOT: B256 = B256::ZERO;

// Latest entry of the append-only state root chain. Height 0 is genesis;
// every sealed batch appends exactly one entry at height + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub root: B256,
    pub height: u64,
}

impl ChainHead {
    pub fn genesis(root: B256) -> Self {
        Self { root, height: 0 }
    }
}

// The successor root commits to the previous root and the ordered digests
// of every transaction in the batch.
pub fn advance_root(old_root: B256, tx_digests: &[B256]) -> B256 {
    let mut preimage = Vec::with_capacity(32 * (1 + tx_digests.len()));
    preimage.extend_from_slice(old_root.as_slice());
    for digest in tx_digests {
        preimage.extend_from_slice(digest.as_slice());
    }
    keccak256(&preimage)
}
