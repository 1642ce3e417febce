// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::storage::{BatchRecord, SealedBatch};
use rollup_core::proof::Proof;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchSealed {
        batch_id: u64,
        height: u64,
        old_root: String,
        new_root: String,
        tx_count: u32,
    },
    ProofReady {
        batch_id: u64,
        proof_kind: String,
        proof_hash: String,
        generation_time_ms: u64,
    },
    ProofFailed {
        batch_id: u64,
        reason: String,
    },
    BatchAnchored {
        batch_id: u64,
        anchor_tx_ref: String,
    },
}

impl BatchEvent {
    pub fn batch_id(&self) -> u64 {
        match self {
            Self::BatchSealed { batch_id, .. } => *batch_id,
            Self::ProofReady { batch_id, .. } => *batch_id,
            Self::ProofFailed { batch_id, .. } => *batch_id,
            Self::BatchAnchored { batch_id, .. } => *batch_id,
        }
    }

    pub fn sealed(sealed: &SealedBatch) -> Self {
        Self::BatchSealed {
            batch_id: sealed.batch_id,
            height: sealed.height,
            old_root: format!("{:#x}", sealed.old_root),
            new_root: format!("{:#x}", sealed.new_root),
            tx_count: sealed.tx_digests.len() as u32,
        }
    }

    pub fn proof_ready(batch_id: u64, proof: &Proof) -> Self {
        Self::ProofReady {
            batch_id,
            proof_kind: proof.kind.as_str().to_string(),
            proof_hash: format!("{:#x}", proof.hash),
            generation_time_ms: proof.generation_time_ms,
        }
    }

    pub fn proof_failed(batch_id: u64, reason: String) -> Self {
        Self::ProofFailed { batch_id, reason }
    }

    pub fn anchored(batch: &BatchRecord) -> Self {
        Self::BatchAnchored {
            batch_id: batch.batch_id,
            anchor_tx_ref: batch.anchor_tx_ref.clone().unwrap_or_default(),
        }
    }
}

// Fanout hub for pipeline notifications. Publishing never blocks the
// pipeline: a closed or full subscriber is dropped instead of awaited.
#[derive(Clone)]
pub struct BatchEvents {
    inner: Arc<BatchEventsInner>,
}

struct BatchEventsInner {
    subscriber_buffer_capacity: usize,
    next_subscriber_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<BatchEvent>>>,
}

impl BatchEvents {
    pub fn new(subscriber_buffer_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BatchEventsInner {
                subscriber_buffer_capacity: subscriber_buffer_capacity.max(1),
                next_subscriber_id: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<BatchEvent> {
        let (tx, rx) = mpsc::channel(self.inner.subscriber_buffer_capacity);
        let subscriber_id = self
            .inner
            .next_subscriber_id
            .fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .expect("batch events subscribers mutex poisoned")
            .insert(subscriber_id, tx);
        rx
    }

    pub fn publish(&self, event: BatchEvent) {
        let mut to_remove = Vec::new();
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("batch events subscribers mutex poisoned");

        for (subscriber_id, sender) in subscribers.iter() {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Closed(_)) => {
                    to_remove.push(*subscriber_id);
                }
                Err(TrySendError::Full(_)) => {
                    to_remove.push(*subscriber_id);
                    warn!(
                        subscriber_id,
                        batch_id = event.batch_id(),
                        "dropped slow batch event subscriber due to full channel"
                    );
                }
            }
        }

        for subscriber_id in to_remove {
            subscribers.remove(&subscriber_id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .expect("batch events subscribers mutex poisoned")
            .len()
    }
}
