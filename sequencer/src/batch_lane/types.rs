// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::time::SystemTime;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::storage::BatchRecord;
use alloy_primitives::B256;
use rollup_core::tx::TxDraft;

#[derive(Debug)]
pub struct PendingSubmission {
    pub draft: TxDraft,
    pub respond_to: oneshot::Sender<Result<SubmitOutcome, SequencerError>>,
    pub received_at: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub tx_hash: B256,
    // A resubmission of an already known transaction acks instead of failing.
    pub duplicate: bool,
}

#[derive(Debug)]
pub struct TriggerRequest {
    pub respond_to: oneshot::Sender<Result<Option<BatchRecord>, SequencerError>>,
}

#[derive(Debug)]
pub enum BatchLaneInput {
    Submit(PendingSubmission),
    Trigger(TriggerRequest),
}

#[derive(Debug, Error, Clone)]
pub enum SequencerError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    Overloaded(String),
    #[error("batch {batch_id} proof failed: {reason}")]
    ProofFailed { batch_id: u64, reason: String },
}

impl SequencerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::Overloaded(message.into())
    }
}
