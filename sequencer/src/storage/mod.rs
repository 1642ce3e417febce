// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

mod db;
mod sql;

use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

use rollup_core::batch::BatchStatus;
use rollup_core::proof::ProofKind;
use rollup_core::state::ChainHead;
use rollup_core::tx::TxStatus;

pub use db::Storage;

#[derive(Debug, Error)]
pub enum StorageOpenError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
}

// Failures of ledger mutations. Plain reads return rusqlite errors directly.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("duplicate transaction {tx_hash}")]
    DuplicateTransaction { tx_hash: B256 },
    #[error(
        "chain head moved: expected {expected_root}@{expected_height}, \
         found {actual_root}@{actual_height}"
    )]
    ChainMismatch {
        expected_root: B256,
        expected_height: u64,
        actual_root: B256,
        actual_height: u64,
    },
    #[error("batch {batch_id} cannot advance from {from} to {to}")]
    InvalidTransition {
        batch_id: u64,
        from: BatchStatus,
        to: BatchStatus,
    },
    #[error("batch {batch_id} already has a proof")]
    DuplicateProof { batch_id: u64 },
    #[error("batch {batch_id} not found")]
    BatchNotFound { batch_id: u64 },
    #[error("genesis root mismatch: stored {stored}, configured {configured}")]
    GenesisMismatch { stored: B256, configured: B256 },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub tx_hash: B256,
    pub sender: Address,
    pub recipient: Address,
    pub value: U256,
    pub payload: Vec<u8>,
    pub nonce: u64,
    pub status: TxStatus,
    pub batch_id: Option<u64>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    pub batch_id: u64,
    pub old_state_root: B256,
    pub new_state_root: B256,
    pub tx_count: u32,
    pub status: BatchStatus,
    pub proof_hash: Option<B256>,
    pub anchor_tx_ref: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRecord {
    pub proof_id: u64,
    pub batch_id: u64,
    pub kind: ProofKind,
    pub payload: Vec<u8>,
    pub public_signals: Vec<String>,
    pub proof_hash: B256,
    pub generation_time_ms: u64,
    pub verified: bool,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub address: Address,
    pub balance: U256,
    pub nonce: u64,
    pub updated_at_ms: i64,
}

// What seal_batch committed; the lane publishes this and hands it to the
// proof worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBatch {
    pub batch_id: u64,
    pub old_root: B256,
    pub new_root: B256,
    pub height: u64,
    pub tx_digests: Vec<B256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerStats {
    pub pending_transactions: u64,
    pub total_transactions: u64,
    pub total_batches: u64,
    pub proven_batches: u64,
    pub failed_batches: u64,
    pub submitted_batches: u64,
    pub confirmed_batches: u64,
    pub total_proofs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub stats: LedgerStats,
    pub head: ChainHead,
}
