// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batch_lane::SequencerError;
use crate::events::{BatchEvent, BatchEvents};
use crate::storage::{BatchRecord, LedgerError, Storage};
use rollup_core::batch::BatchStatus;
use rollup_core::proof::{BatchInputs, ProofEngine};

#[derive(Debug)]
pub struct ProofJob {
    pub batch_id: u64,
    pub inputs: BatchInputs,
    // Present when a manual trigger is waiting for the terminal outcome.
    pub respond_to: Option<oneshot::Sender<Result<Option<BatchRecord>, SequencerError>>>,
}

#[derive(Debug, Error)]
pub enum ProofLaneError {
    #[error("proof lane shutdown requested")]
    ShutdownRequested,
    #[error("proof job channel closed")]
    ChannelClosed,
    #[error("cannot load batch for proving")]
    LoadBatch {
        #[source]
        source: rusqlite::Error,
    },
    #[error("cannot record batch status change")]
    RecordStatus {
        #[source]
        source: LedgerError,
    },
    #[error("cannot persist proof")]
    PersistProof {
        #[source]
        source: LedgerError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ProofLaneStop {
    shutdown: Arc<AtomicBool>,
}

impl ProofLaneStop {
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

pub struct ProofLane {
    rx: mpsc::Receiver<ProofJob>,
    stop: ProofLaneStop,
    storage: Storage,
    engine: Box<dyn ProofEngine>,
    events: BatchEvents,
    idle_poll_interval: Duration,
}

impl ProofLane {
    pub fn new(
        rx: mpsc::Receiver<ProofJob>,
        storage: Storage,
        engine: Box<dyn ProofEngine>,
        events: BatchEvents,
        idle_poll_interval: Duration,
    ) -> Self {
        Self {
            rx,
            stop: ProofLaneStop::default(),
            storage,
            engine,
            events,
            idle_poll_interval,
        }
    }

    pub fn spawn(self) -> (JoinHandle<ProofLaneError>, ProofLaneStop) {
        let stop = self.stop.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut lane = self;
            match lane.run_forever() {
                Err(err) => err,
                Ok(()) => unreachable!("proof lane run loop is expected to be non-terminating"),
            }
        });
        (handle, stop)
    }

    fn run_forever(&mut self) -> Result<(), ProofLaneError> {
        while !self.stop.is_shutdown_requested() {
            match self.rx.try_recv() {
                Ok(job) => self.process_job(job)?,
                Err(mpsc::error::TryRecvError::Empty) => thread::sleep(self.idle_poll_interval),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Err(ProofLaneError::ChannelClosed);
                }
            }
        }
        Err(ProofLaneError::ShutdownRequested)
    }

    fn process_job(&mut self, job: ProofJob) -> Result<(), ProofLaneError> {
        let ProofJob {
            batch_id,
            inputs,
            respond_to,
        } = job;

        let batch = self
            .storage
            .batch(batch_id)
            .map_err(|source| ProofLaneError::LoadBatch { source })?;
        let Some(batch) = batch else {
            warn!(batch_id, "dropping proof job for unknown batch");
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(Err(SequencerError::internal(format!(
                    "batch {batch_id} not found"
                ))));
            }
            return Ok(());
        };

        match batch.status {
            BatchStatus::Pending => {
                self.storage
                    .update_batch_status(batch_id, BatchStatus::Proving, None, None)
                    .map_err(|source| ProofLaneError::RecordStatus { source })?;
            }
            // A job recovered after a restart is already marked proving.
            BatchStatus::Proving => {}
            other => {
                warn!(
                    batch_id,
                    status = %other,
                    "skipping proof job for batch not awaiting proof"
                );
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(Ok(Some(batch)));
                }
                return Ok(());
            }
        }

        let proof = match self.engine.generate(&inputs) {
            Ok(proof) => proof,
            Err(err) => {
                return self.record_failure(
                    batch_id,
                    format!("proof generation failed: {err}"),
                    respond_to,
                );
            }
        };
        let verified = match self.engine.verify(&proof, &inputs) {
            Ok(value) => value,
            Err(err) => {
                return self.record_failure(
                    batch_id,
                    format!("proof verification errored: {err}"),
                    respond_to,
                );
            }
        };

        match self.storage.save_proof(batch_id, &proof, verified) {
            Ok(_) => {}
            Err(LedgerError::DuplicateProof { .. }) => {
                debug!(batch_id, "proof already persisted, continuing recovery");
            }
            Err(source) => return Err(ProofLaneError::PersistProof { source }),
        }

        if !verified {
            return self.record_failure(
                batch_id,
                "generated proof failed self verification".to_string(),
                respond_to,
            );
        }

        let record = self
            .storage
            .update_batch_status(batch_id, BatchStatus::Proven, Some(proof.hash), None)
            .map_err(|source| ProofLaneError::RecordStatus { source })?;
        info!(
            batch_id,
            proof_hash = %proof.hash,
            generation_time_ms = proof.generation_time_ms,
            "batch proven"
        );
        self.events.publish(BatchEvent::proof_ready(batch_id, &proof));
        if let Some(respond_to) = respond_to {
            let _ = respond_to.send(Ok(Some(record)));
        }
        Ok(())
    }

    // Failed batches keep their transactions; the chain already advanced when
    // the batch was sealed, so nothing returns to the pool.
    fn record_failure(
        &mut self,
        batch_id: u64,
        reason: String,
        respond_to: Option<oneshot::Sender<Result<Option<BatchRecord>, SequencerError>>>,
    ) -> Result<(), ProofLaneError> {
        self.storage
            .update_batch_status(batch_id, BatchStatus::Failed, None, None)
            .map_err(|source| ProofLaneError::RecordStatus { source })?;
        warn!(batch_id, reason = %reason, "batch proof failed");
        self.events
            .publish(BatchEvent::proof_failed(batch_id, reason.clone()));
        if let Some(respond_to) = respond_to {
            let _ = respond_to.send(Err(SequencerError::ProofFailed { batch_id, reason }));
        }
        Ok(())
    }
}
