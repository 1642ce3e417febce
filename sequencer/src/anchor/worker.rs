// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::AnchorClient;
use crate::events::{BatchEvent, BatchEvents};
use crate::storage::{LedgerError, Storage};
use rollup_core::batch::BatchStatus;

#[derive(Debug, Error)]
pub enum AnchorWorkerError {
    #[error("shutdown requested")]
    ShutdownRequested,
    #[error("failed to load batches for anchoring")]
    LoadBatches { source: rusqlite::Error },
    #[error("failed to load the proof for a batch being anchored")]
    LoadProof { source: rusqlite::Error },
    #[error("failed to record anchoring progress")]
    RecordStatus { source: LedgerError },
}

#[derive(Debug, Clone, Copy)]
pub struct AnchorWorkerConfig {
    /// Sleep between sweeps when no batch made progress.
    pub poll_interval: Duration,
    /// Maximum batches examined per status per sweep.
    pub page_size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AnchorWorkerStop {
    stop: Arc<AtomicBool>,
}

impl AnchorWorkerStop {
    pub fn request_shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Walks proven batches into the settlement layer. Each sweep first checks
/// earlier submissions for confirmation, then submits the oldest proven
/// batches. A submission failure ends the sweep so the same batch retries
/// first next time and anchoring order matches batch order.
pub struct AnchorWorker<C: AnchorClient> {
    storage: Storage,
    client: C,
    events: BatchEvents,
    stop: AnchorWorkerStop,
    config: AnchorWorkerConfig,
}

impl<C: AnchorClient + 'static> AnchorWorker<C> {
    pub fn new(config: AnchorWorkerConfig, storage: Storage, client: C, events: BatchEvents) -> Self {
        Self {
            storage,
            client,
            events,
            stop: AnchorWorkerStop::default(),
            config,
        }
    }

    pub fn spawn(self) -> (JoinHandle<AnchorWorkerError>, AnchorWorkerStop) {
        let stop = self.stop.clone();
        let handle = tokio::task::spawn_blocking(move || match self.run_forever() {
            Ok(()) => unreachable!("anchor worker loop only exits with an error"),
            Err(err) => err,
        });
        (handle, stop)
    }

    fn run_forever(mut self) -> Result<(), AnchorWorkerError> {
        while !self.stop.is_shutdown_requested() {
            match self.advance_once() {
                Ok(0) => thread::sleep(self.config.poll_interval),
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "anchor sweep failed, will retry");
                    thread::sleep(self.config.poll_interval);
                }
            }
        }
        Err(AnchorWorkerError::ShutdownRequested)
    }

    /// One sweep; returns how many batches changed status.
    pub(crate) fn advance_once(&mut self) -> Result<usize, AnchorWorkerError> {
        let page = self.config.page_size.max(1);
        let mut progressed = 0_usize;

        let submitted = self
            .storage
            .batches_with_status(BatchStatus::Submitted, page)
            .map_err(|source| AnchorWorkerError::LoadBatches { source })?;
        for batch in submitted {
            let Some(tx_ref) = batch.anchor_tx_ref.as_deref() else {
                warn!(
                    batch_id = batch.batch_id,
                    "submitted batch has no anchor reference, skipping"
                );
                continue;
            };
            match self.client.is_confirmed(tx_ref) {
                Ok(true) => {
                    let confirmed = self
                        .storage
                        .update_batch_status(batch.batch_id, BatchStatus::Confirmed, None, None)
                        .map_err(|source| AnchorWorkerError::RecordStatus { source })?;
                    info!(
                        batch_id = batch.batch_id,
                        anchor_tx_ref = %tx_ref,
                        "batch anchor confirmed"
                    );
                    self.events.publish(BatchEvent::anchored(&confirmed));
                    progressed += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        batch_id = batch.batch_id,
                        error = %err,
                        "anchor confirmation check failed, will retry"
                    );
                    break;
                }
            }
        }

        // Pause gates new submissions only; in-flight confirmations still land.
        if !self.client.is_paused() {
            let proven = self
                .storage
                .batches_with_status(BatchStatus::Proven, page)
                .map_err(|source| AnchorWorkerError::LoadBatches { source })?;
            for batch in proven {
                let proof = self
                    .storage
                    .proof_for_batch(batch.batch_id)
                    .map_err(|source| AnchorWorkerError::LoadProof { source })?;
                let Some(proof) = proof else {
                    warn!(
                        batch_id = batch.batch_id,
                        "proven batch has no stored proof, skipping"
                    );
                    continue;
                };
                match self.client.submit(&batch, &proof) {
                    Ok(receipt) => {
                        self.storage
                            .update_batch_status(
                                batch.batch_id,
                                BatchStatus::Submitted,
                                None,
                                Some(&receipt.tx_ref),
                            )
                            .map_err(|source| AnchorWorkerError::RecordStatus { source })?;
                        info!(
                            batch_id = batch.batch_id,
                            anchor_tx_ref = %receipt.tx_ref,
                            block_number = receipt.block_number,
                            "batch submitted to anchor"
                        );
                        progressed += 1;
                    }
                    Err(err) => {
                        warn!(
                            batch_id = batch.batch_id,
                            error = %err,
                            "anchor submission failed, will retry"
                        );
                        break;
                    }
                }
            }
        }

        if progressed > 0 {
            if let Some(root) = self.client.current_root() {
                debug!(anchor_root = %root, "anchor root after sweep");
            }
        }
        Ok(progressed)
    }
}
