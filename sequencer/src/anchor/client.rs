// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::storage::{BatchRecord, ProofRecord};
use alloy_primitives::{keccak256, B256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorReceipt {
    pub tx_ref: String,
    pub block_number: u64,
}

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("anchoring is paused")]
    Paused,
    #[error("anchor submission rejected: {reason}")]
    Rejected { reason: String },
    #[error("anchor endpoint unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Settlement-side seam. `submit` lands a proven batch root together with its
/// proof; a submission is final only once `is_confirmed` reports its
/// reference as settled.
pub trait AnchorClient: Send {
    fn submit(
        &mut self,
        batch: &BatchRecord,
        proof: &ProofRecord,
    ) -> Result<AnchorReceipt, AnchorError>;

    fn is_confirmed(&self, tx_ref: &str) -> Result<bool, AnchorError>;

    /// Most recent receipts first.
    fn latest_anchored(&self, count: usize) -> Vec<AnchorReceipt>;

    /// Root of the newest submission the anchor has seen, if any.
    fn current_root(&self) -> Option<B256>;

    fn is_paused(&self) -> bool;
}

/// In-process anchor with scriptable failures and a manual block clock.
#[derive(Debug, Default)]
pub struct MemoryAnchor {
    paused: bool,
    confirmation_depth: u64,
    block_number: u64,
    scripted_failures: VecDeque<String>,
    submissions: HashMap<String, u64>,
    anchored: Vec<(B256, AnchorReceipt)>,
}

impl MemoryAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confirmation_depth(confirmation_depth: u64) -> Self {
        Self {
            confirmation_depth,
            ..Self::default()
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn fail_next_submission(&mut self, reason: impl Into<String>) {
        self.scripted_failures.push_back(reason.into());
    }

    pub fn advance_block(&mut self) {
        self.block_number = self.block_number.saturating_add(1);
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }
}

impl AnchorClient for MemoryAnchor {
    fn submit(
        &mut self,
        batch: &BatchRecord,
        proof: &ProofRecord,
    ) -> Result<AnchorReceipt, AnchorError> {
        if self.paused {
            return Err(AnchorError::Paused);
        }
        if let Some(reason) = self.scripted_failures.pop_front() {
            return Err(AnchorError::Unavailable { reason });
        }

        self.block_number = self.block_number.saturating_add(1);
        // The reference binds the root, the batch and the proof that carried it.
        let mut preimage = Vec::with_capacity(72);
        preimage.extend_from_slice(batch.new_state_root.as_slice());
        preimage.extend_from_slice(&batch.batch_id.to_be_bytes());
        preimage.extend_from_slice(proof.proof_hash.as_slice());
        let receipt = AnchorReceipt {
            tx_ref: format!("{:#x}", keccak256(&preimage)),
            block_number: self.block_number,
        };

        self.submissions
            .insert(receipt.tx_ref.clone(), self.block_number);
        self.anchored.push((batch.new_state_root, receipt.clone()));
        Ok(receipt)
    }

    fn is_confirmed(&self, tx_ref: &str) -> Result<bool, AnchorError> {
        match self.submissions.get(tx_ref) {
            Some(submitted_at) => {
                Ok(self.block_number >= submitted_at.saturating_add(self.confirmation_depth))
            }
            None => Err(AnchorError::Rejected {
                reason: format!("unknown anchor reference {tx_ref}"),
            }),
        }
    }

    fn latest_anchored(&self, count: usize) -> Vec<AnchorReceipt> {
        self.anchored
            .iter()
            .rev()
            .take(count)
            .map(|(_, receipt)| receipt.clone())
            .collect()
    }

    fn current_root(&self) -> Option<B256> {
        self.anchored.last().map(|(root, _)| *root)
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}
