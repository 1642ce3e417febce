// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use crate::events::{BatchEvent, BatchEvents};
use crate::prover::ProofJob;
use crate::storage::{BatchRecord, LedgerError, Storage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::profiling::BatchLaneMetrics;
use super::{BatchLaneError, BatchLaneInput, PendingSubmission, SequencerError, SubmitOutcome};
use alloy_primitives::B256;
use rollup_core::batch::BatchStatus;
use rollup_core::proof::BatchInputs;
use rollup_core::state::advance_root;

// Upper bound on batches re-enqueued for proving after a restart.
const RECOVERY_SCAN_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct BatchLaneConfig {
    // Size trigger: a batch seals as soon as this many transactions are pending.
    pub batch_size: usize,

    // Timer trigger: a partial batch seals this long after the first pending
    // transaction arrived. Duration::ZERO disables the timer.
    pub batch_timeout: Duration,

    pub max_submissions_per_chunk: usize,
    pub idle_poll_interval: Duration,
    pub metrics_enabled: bool,
    pub metrics_log_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct BatchLaneStop {
    shutdown: Arc<AtomicBool>,
}

impl BatchLaneStop {
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

pub struct BatchLane {
    rx: mpsc::Receiver<BatchLaneInput>,
    stop: BatchLaneStop,
    storage: Storage,
    proof_tx: mpsc::Sender<ProofJob>,
    events: BatchEvents,
    running: Arc<AtomicBool>,
    config: BatchLaneConfig,
}

impl BatchLane {
    pub fn new(
        rx: mpsc::Receiver<BatchLaneInput>,
        storage: Storage,
        proof_tx: mpsc::Sender<ProofJob>,
        events: BatchEvents,
        running: Arc<AtomicBool>,
        config: BatchLaneConfig,
    ) -> Self {
        Self {
            rx,
            stop: BatchLaneStop::default(),
            storage,
            proof_tx,
            events,
            running,
            config,
        }
    }

    pub fn spawn(self) -> (JoinHandle<BatchLaneError>, BatchLaneStop) {
        let stop = self.stop.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut lane = self;
            match lane.run_forever() {
                Err(err) => err,
                Ok(()) => unreachable!("batch lane run loop is expected to be non-terminating"),
            }
        });
        (handle, stop)
    }

    fn run_forever(&mut self) -> Result<(), BatchLaneError> {
        self.recover_unproven_batches()?;
        let mut deadline: Option<Instant> = None;
        let mut metrics =
            BatchLaneMetrics::new(self.config.metrics_enabled, self.config.metrics_log_interval);

        while !self.stop.is_shutdown_requested() {
            metrics.on_loop_start();

            let queue_started = metrics.phase_started_at();
            let handled = self.process_queue_chunk(&mut deadline, &mut metrics)?;
            metrics.on_queue_phase_end(queue_started, handled as u64);

            let seal_started = metrics.phase_started_at();
            let sealed = self.seal_if_due(&mut deadline, &mut metrics)?;
            metrics.on_seal_phase_end(seal_started);

            if handled == 0 && !sealed {
                let sleep_started = metrics.phase_started_at();
                thread::sleep(self.config.idle_poll_interval);
                metrics.on_idle_sleep_end(sleep_started);
            }
            metrics.maybe_log_window();
        }

        metrics.log_final();
        Err(BatchLaneError::ShutdownRequested)
    }

    // Batches left pending or proving by an earlier run never reached a
    // terminal proof state; hand them back to the proof lane.
    fn recover_unproven_batches(&mut self) -> Result<(), BatchLaneError> {
        for status in [BatchStatus::Pending, BatchStatus::Proving] {
            let batches = self
                .storage
                .batches_with_status(status, RECOVERY_SCAN_LIMIT)
                .map_err(|source| BatchLaneError::Recovery { source })?;
            for batch in batches {
                let tx_digests = self
                    .storage
                    .batch_tx_digests(batch.batch_id)
                    .map_err(|source| BatchLaneError::Recovery { source })?;
                info!(
                    batch_id = batch.batch_id,
                    status = %batch.status,
                    "re-enqueueing unproven batch"
                );
                let job = ProofJob {
                    batch_id: batch.batch_id,
                    inputs: BatchInputs {
                        old_root: batch.old_state_root,
                        new_root: batch.new_state_root,
                        tx_digests,
                    },
                    respond_to: None,
                };
                self.proof_tx
                    .blocking_send(job)
                    .map_err(|_| BatchLaneError::ProofLaneClosed)?;
            }
        }
        Ok(())
    }

    fn process_queue_chunk(
        &mut self,
        deadline: &mut Option<Instant>,
        metrics: &mut BatchLaneMetrics,
    ) -> Result<usize, BatchLaneError> {
        let mut handled = 0_usize;
        let max_chunk = self.config.max_submissions_per_chunk.max(1);

        while handled < max_chunk {
            match self.rx.try_recv() {
                Ok(BatchLaneInput::Submit(pending)) => {
                    self.handle_submission(pending, deadline)?;
                    handled = handled.saturating_add(1);
                }
                Ok(BatchLaneInput::Trigger(request)) => {
                    // Manual triggers seal regardless of the running flag.
                    self.run_batch_cycle(Some(request.respond_to), "manual", deadline, metrics)?;
                    handled = handled.saturating_add(1);
                }
                Err(mpsc::error::TryRecvError::Empty) => return Ok(handled),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if handled == 0 {
                        return Err(BatchLaneError::ChannelClosed);
                    }
                    return Ok(handled);
                }
            }
        }
        Ok(handled)
    }

    fn handle_submission(
        &mut self,
        pending: PendingSubmission,
        deadline: &mut Option<Instant>,
    ) -> Result<(), BatchLaneError> {
        match self.storage.add_transaction(&pending.draft) {
            Ok(tx_hash) => {
                if deadline.is_none() {
                    *deadline = Some(Instant::now());
                }
                debug!(tx_hash = %tx_hash, "accepted pending transaction");
                let _ = pending.respond_to.send(Ok(SubmitOutcome {
                    tx_hash,
                    duplicate: false,
                }));
                Ok(())
            }
            Err(LedgerError::DuplicateTransaction { tx_hash }) => {
                let _ = pending.respond_to.send(Ok(SubmitOutcome {
                    tx_hash,
                    duplicate: true,
                }));
                Ok(())
            }
            Err(source) => {
                let _ = pending
                    .respond_to
                    .send(Err(SequencerError::internal(format!("db error: {source}"))));
                Err(BatchLaneError::SubmitTransaction { source })
            }
        }
    }

    fn seal_if_due(
        &mut self,
        deadline: &mut Option<Instant>,
        metrics: &mut BatchLaneMetrics,
    ) -> Result<bool, BatchLaneError> {
        if !self.running.load(Ordering::Relaxed) {
            return Ok(false);
        }

        let pending = self
            .storage
            .count_pending()
            .map_err(|source| BatchLaneError::CountPendingTransactions { source })?;
        if pending == 0 {
            *deadline = None;
            return Ok(false);
        }
        if deadline.is_none() {
            // Covers transactions recovered from a previous run, where no
            // submission armed the window.
            *deadline = Some(Instant::now());
        }

        if pending >= self.config.batch_size.max(1) as u64 {
            return self.run_batch_cycle(None, "size", deadline, metrics);
        }
        if self.timer_fired(deadline) {
            return self.run_batch_cycle(None, "timer", deadline, metrics);
        }
        Ok(false)
    }

    fn timer_fired(&self, deadline: &Option<Instant>) -> bool {
        if self.config.batch_timeout.is_zero() {
            return false;
        }
        match deadline {
            Some(armed_at) => armed_at.elapsed() >= self.config.batch_timeout,
            None => false,
        }
    }

    fn run_batch_cycle(
        &mut self,
        respond_to: Option<oneshot::Sender<Result<Option<BatchRecord>, SequencerError>>>,
        trigger: &'static str,
        deadline: &mut Option<Instant>,
        metrics: &mut BatchLaneMetrics,
    ) -> Result<bool, BatchLaneError> {
        let head = self
            .storage
            .chain_head()
            .map_err(|source| BatchLaneError::LoadChainHead { source })?;
        let txs = self
            .storage
            .pending_transactions(self.config.batch_size.max(1))
            .map_err(|source| BatchLaneError::LoadPendingTransactions { source })?;
        if txs.is_empty() {
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(Ok(None));
            }
            *deadline = None;
            return Ok(false);
        }

        let digests: Vec<B256> = txs.iter().map(|record| record.tx_hash).collect();
        let new_root = advance_root(head.root, &digests);
        let sealed = match self.storage.seal_batch(&head, &txs, new_root) {
            Ok(sealed) => sealed,
            Err(LedgerError::ChainMismatch {
                actual_root,
                actual_height,
                ..
            }) => {
                // The head moved between the read and the write. The seal
                // rolled back; the next pass re-reads and retries.
                warn!(
                    trigger,
                    actual_height,
                    actual_root = %actual_root,
                    "chain head changed under the batch cycle, retrying"
                );
                if let Some(respond_to) = respond_to {
                    let _ = respond_to.send(Err(SequencerError::internal(
                        "chain head changed during sealing, retry",
                    )));
                }
                return Ok(false);
            }
            Err(source) => {
                if let Some(respond_to) = respond_to {
                    let _ = respond_to
                        .send(Err(SequencerError::internal(format!("db error: {source}"))));
                }
                return Err(BatchLaneError::SealBatch { source });
            }
        };

        info!(
            batch_id = sealed.batch_id,
            height = sealed.height,
            tx_count = sealed.tx_digests.len() as u64,
            trigger,
            "sealed batch"
        );
        self.events.publish(BatchEvent::sealed(&sealed));

        let job = ProofJob {
            batch_id: sealed.batch_id,
            inputs: BatchInputs {
                old_root: sealed.old_root,
                new_root: sealed.new_root,
                tx_digests: sealed.tx_digests,
            },
            respond_to,
        };
        self.proof_tx
            .blocking_send(job)
            .map_err(|_| BatchLaneError::ProofLaneClosed)?;
        metrics.on_sealed(trigger);

        *deadline = if self.has_pending()? {
            Some(Instant::now())
        } else {
            None
        };
        Ok(true)
    }

    fn has_pending(&mut self) -> Result<bool, BatchLaneError> {
        let count = self
            .storage
            .count_pending()
            .map_err(|source| BatchLaneError::CountPendingTransactions { source })?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::profiling::BatchLaneMetrics;
    use super::{
        BatchLane, BatchLaneConfig, BatchLaneError, BatchLaneInput, BatchLaneStop,
        PendingSubmission, SequencerError, SubmitOutcome,
    };
    use crate::batch_lane::TriggerRequest;
    use crate::events::{BatchEvent, BatchEvents};
    use crate::prover::ProofJob;
    use crate::storage::Storage;
    use alloy_primitives::{Address, Bytes, B256, U256};
    use rollup_core::state::GENESIS_ROOT;
    use rollup_core::tx::TxDraft;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tokio::sync::{mpsc, oneshot};

    struct LaneHarness {
        tx: mpsc::Sender<BatchLaneInput>,
        proof_rx: mpsc::Receiver<ProofJob>,
        events: BatchEvents,
        running: Arc<AtomicBool>,
        stop: BatchLaneStop,
        handle: tokio::task::JoinHandle<BatchLaneError>,
    }

    fn temp_db_path(name: &str) -> String {
        let mut path = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        path.push(format!("sequencer-batch-lane-{name}-{unique}.sqlite"));
        path_to_string(path)
    }

    fn path_to_string(path: PathBuf) -> String {
        path.to_string_lossy().into_owned()
    }

    fn default_test_config() -> BatchLaneConfig {
        BatchLaneConfig {
            batch_size: 100,
            batch_timeout: Duration::ZERO,
            max_submissions_per_chunk: 16,
            idle_poll_interval: Duration::from_millis(2),
            metrics_enabled: false,
            metrics_log_interval: Duration::from_secs(60),
        }
    }

    fn open_storage(db_path: &str) -> Storage {
        let mut storage = Storage::open(db_path, "NORMAL").expect("open storage");
        storage.ensure_genesis(GENESIS_ROOT).expect("ensure genesis");
        storage
    }

    fn start_lane(db_path: &str, config: BatchLaneConfig, running: bool) -> LaneHarness {
        let storage = open_storage(db_path);
        let (tx, rx) = mpsc::channel::<BatchLaneInput>(128);
        let (proof_tx, proof_rx) = mpsc::channel::<ProofJob>(128);
        let events = BatchEvents::new(16);
        let running = Arc::new(AtomicBool::new(running));
        let lane = BatchLane::new(
            rx,
            storage,
            proof_tx,
            events.clone(),
            Arc::clone(&running),
            config,
        );
        let (handle, stop) = lane.spawn();
        LaneHarness {
            tx,
            proof_rx,
            events,
            running,
            stop,
            handle,
        }
    }

    fn sample_draft(seed: u8) -> TxDraft {
        TxDraft {
            sender: Address::from_slice(&[seed; 20]),
            recipient: Address::from_slice(&[seed.wrapping_add(1); 20]),
            value: U256::from(1000_u64),
            payload: Bytes::from(vec![seed]),
            nonce: 0,
        }
    }

    fn make_submission(
        seed: u8,
    ) -> (
        PendingSubmission,
        oneshot::Receiver<Result<SubmitOutcome, SequencerError>>,
    ) {
        let (respond_to, recv) = oneshot::channel();
        (
            PendingSubmission {
                draft: sample_draft(seed),
                respond_to,
                received_at: SystemTime::now(),
            },
            recv,
        )
    }

    fn read_count(db_path: &str, table: &str) -> i64 {
        let conn = Storage::open_connection(db_path, "NORMAL").expect("open sqlite reader");
        let sql = format!("SELECT COUNT(*) FROM {table}");
        conn.query_row(sql.as_str(), [], |row| row.get(0))
            .expect("count rows")
    }

    fn read_pending_count(db_path: &str) -> i64 {
        let conn = Storage::open_connection(db_path, "NORMAL").expect("open sqlite reader");
        conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )
        .expect("count pending rows")
    }

    async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let started = tokio::time::Instant::now();
        while started.elapsed() < timeout {
            if predicate() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        predicate()
    }

    async fn shutdown_lane(stop: &BatchLaneStop, handle: tokio::task::JoinHandle<BatchLaneError>) {
        stop.request_shutdown();
        let joined = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("wait for lane shutdown");
        let err = joined.expect("join lane task");
        assert!(matches!(err, BatchLaneError::ShutdownRequested));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submission_ack_carries_the_content_hash() {
        let db_path = temp_db_path("submit-ack");
        let harness = start_lane(&db_path, default_test_config(), true);
        let (pending, recv) = make_submission(0x11);
        let expected_hash = pending.draft.hash();

        harness
            .tx
            .send(BatchLaneInput::Submit(pending))
            .await
            .expect("send submission");
        let ack = tokio::time::timeout(Duration::from_secs(2), recv)
            .await
            .expect("wait for ack")
            .expect("ack channel open");
        let rows = read_count(&db_path, "transactions");
        shutdown_lane(&harness.stop, harness.handle).await;

        let outcome = ack.expect("submission accepted");
        assert_eq!(outcome.tx_hash, expected_hash);
        assert!(!outcome.duplicate);
        assert_eq!(rows, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_submission_acks_without_a_second_row() {
        let db_path = temp_db_path("submit-duplicate");
        let harness = start_lane(&db_path, default_test_config(), true);

        let (first, first_recv) = make_submission(0x22);
        harness
            .tx
            .send(BatchLaneInput::Submit(first))
            .await
            .expect("send first submission");
        let first_ack = tokio::time::timeout(Duration::from_secs(2), first_recv)
            .await
            .expect("wait for first ack")
            .expect("ack channel open")
            .expect("first submission accepted");

        let (second, second_recv) = make_submission(0x22);
        harness
            .tx
            .send(BatchLaneInput::Submit(second))
            .await
            .expect("send second submission");
        let second_ack = tokio::time::timeout(Duration::from_secs(2), second_recv)
            .await
            .expect("wait for second ack")
            .expect("ack channel open")
            .expect("duplicate submission still acks");
        let rows = read_count(&db_path, "transactions");
        shutdown_lane(&harness.stop, harness.handle).await;

        assert!(!first_ack.duplicate);
        assert!(second_ack.duplicate);
        assert_eq!(second_ack.tx_hash, first_ack.tx_hash);
        assert_eq!(rows, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn size_threshold_seals_and_hands_the_batch_to_the_prover() {
        let db_path = temp_db_path("seal-size");
        let mut config = default_test_config();
        config.batch_size = 2;
        let mut harness = start_lane(&db_path, config, true);
        let mut events_rx = harness.events.subscribe();

        for seed in [0x11, 0x22] {
            let (pending, _recv) = make_submission(seed);
            harness
                .tx
                .send(BatchLaneInput::Submit(pending))
                .await
                .expect("send submission");
        }

        let job = tokio::time::timeout(Duration::from_secs(2), harness.proof_rx.recv())
            .await
            .expect("wait for proof job")
            .expect("proof lane open");
        let event = tokio::time::timeout(Duration::from_secs(2), events_rx.recv())
            .await
            .expect("wait for sealed event")
            .expect("events open");
        let batches = read_count(&db_path, "batches");
        let roots = read_count(&db_path, "state_roots");
        shutdown_lane(&harness.stop, harness.handle).await;

        assert_eq!(job.batch_id, 1);
        assert_eq!(job.inputs.old_root, GENESIS_ROOT);
        assert_eq!(job.inputs.tx_digests.len(), 2);
        assert!(job.respond_to.is_none());
        assert!(matches!(
            event,
            BatchEvent::BatchSealed {
                batch_id: 1,
                height: 1,
                tx_count: 2,
                ..
            }
        ));
        assert_eq!(batches, 1);
        assert_eq!(roots, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_seals_a_partial_batch() {
        let db_path = temp_db_path("seal-timeout");
        let mut config = default_test_config();
        config.batch_timeout = Duration::from_millis(30);
        let mut harness = start_lane(&db_path, config, true);

        let (pending, _recv) = make_submission(0x33);
        harness
            .tx
            .send(BatchLaneInput::Submit(pending))
            .await
            .expect("send submission");

        let job = tokio::time::timeout(Duration::from_secs(2), harness.proof_rx.recv())
            .await
            .expect("wait for proof job")
            .expect("proof lane open");
        shutdown_lane(&harness.stop, harness.handle).await;

        assert_eq!(job.inputs.tx_digests.len(), 1);
        assert_eq!(read_count(&db_path, "batches"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sealed_batches_continue_the_root_chain() {
        let db_path = temp_db_path("seal-chain");
        let mut config = default_test_config();
        config.batch_size = 1;
        let mut harness = start_lane(&db_path, config, true);

        for seed in [0x11, 0x22] {
            let (pending, _recv) = make_submission(seed);
            harness
                .tx
                .send(BatchLaneInput::Submit(pending))
                .await
                .expect("send submission");
        }

        let first = tokio::time::timeout(Duration::from_secs(2), harness.proof_rx.recv())
            .await
            .expect("wait for first job")
            .expect("proof lane open");
        let second = tokio::time::timeout(Duration::from_secs(2), harness.proof_rx.recv())
            .await
            .expect("wait for second job")
            .expect("proof lane open");
        shutdown_lane(&harness.stop, harness.handle).await;

        assert_eq!(first.inputs.old_root, GENESIS_ROOT);
        assert_eq!(second.inputs.old_root, first.inputs.new_root);
        assert_eq!(second.batch_id, first.batch_id + 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn manual_trigger_seals_while_autonomous_batching_is_stopped() {
        let db_path = temp_db_path("manual-trigger");
        let mut harness = start_lane(&db_path, default_test_config(), false);

        let (pending, recv) = make_submission(0x44);
        harness
            .tx
            .send(BatchLaneInput::Submit(pending))
            .await
            .expect("send submission");
        tokio::time::timeout(Duration::from_secs(2), recv)
            .await
            .expect("wait for ack")
            .expect("ack channel open")
            .expect("submission accepted");

        let (respond_to, _trigger_recv) = oneshot::channel();
        harness
            .tx
            .send(BatchLaneInput::Trigger(TriggerRequest { respond_to }))
            .await
            .expect("send trigger");

        let job = tokio::time::timeout(Duration::from_secs(2), harness.proof_rx.recv())
            .await
            .expect("wait for proof job")
            .expect("proof lane open");
        let batches = read_count(&db_path, "batches");
        shutdown_lane(&harness.stop, harness.handle).await;

        assert_eq!(job.inputs.tx_digests.len(), 1);
        assert!(
            job.respond_to.is_some(),
            "manual trigger ack travels with the proof job"
        );
        assert_eq!(batches, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn manual_trigger_caps_the_batch_at_the_size_limit() {
        let db_path = temp_db_path("trigger-cap");
        let mut config = default_test_config();
        config.batch_size = 3;
        let mut harness = start_lane(&db_path, config, false);

        for seed in [0x11, 0x22, 0x33, 0x44] {
            let (pending, recv) = make_submission(seed);
            harness
                .tx
                .send(BatchLaneInput::Submit(pending))
                .await
                .expect("send submission");
            tokio::time::timeout(Duration::from_secs(2), recv)
                .await
                .expect("wait for ack")
                .expect("ack channel open")
                .expect("submission accepted");
        }

        let (respond_to, _trigger_recv) = oneshot::channel();
        harness
            .tx
            .send(BatchLaneInput::Trigger(TriggerRequest { respond_to }))
            .await
            .expect("send trigger");

        let job = tokio::time::timeout(Duration::from_secs(2), harness.proof_rx.recv())
            .await
            .expect("wait for proof job")
            .expect("proof lane open");
        let pending_rows = read_pending_count(&db_path);
        let batches = read_count(&db_path, "batches");
        shutdown_lane(&harness.stop, harness.handle).await;

        let expected: Vec<B256> = [0x11u8, 0x22, 0x33]
            .iter()
            .map(|seed| sample_draft(*seed).hash())
            .collect();
        assert_eq!(job.inputs.tx_digests, expected, "oldest three seal first");
        assert_eq!(pending_rows, 1, "fourth transaction stays pending");
        assert_eq!(batches, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn manual_trigger_acks_none_on_an_empty_pool() {
        let db_path = temp_db_path("empty-trigger");
        let harness = start_lane(&db_path, default_test_config(), true);

        let (respond_to, trigger_recv) = oneshot::channel();
        harness
            .tx
            .send(BatchLaneInput::Trigger(TriggerRequest { respond_to }))
            .await
            .expect("send trigger");
        let ack = tokio::time::timeout(Duration::from_secs(2), trigger_recv)
            .await
            .expect("wait for trigger ack")
            .expect("ack channel open");
        let batches = read_count(&db_path, "batches");
        shutdown_lane(&harness.stop, harness.handle).await;

        assert!(matches!(ack, Ok(None)));
        assert_eq!(batches, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stopped_lane_resumes_sealing_when_started() {
        let db_path = temp_db_path("resume");
        let mut config = default_test_config();
        config.batch_size = 1;
        let harness = start_lane(&db_path, config, false);

        let (pending, recv) = make_submission(0x55);
        harness
            .tx
            .send(BatchLaneInput::Submit(pending))
            .await
            .expect("send submission");
        tokio::time::timeout(Duration::from_secs(2), recv)
            .await
            .expect("wait for ack")
            .expect("ack channel open")
            .expect("submission accepted");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            read_count(&db_path, "batches"),
            0,
            "stopped lane must not seal on its own"
        );

        harness.running.store(true, Ordering::Relaxed);
        let sealed = wait_until(Duration::from_secs(2), || {
            read_count(&db_path, "batches") == 1
        })
        .await;
        shutdown_lane(&harness.stop, harness.handle).await;

        assert!(sealed, "expected a batch after the lane was started");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unproven_batches_are_reenqueued_at_startup() {
        let db_path = temp_db_path("recovery");
        let sealed = {
            let mut storage = open_storage(&db_path);
            storage
                .add_transaction(&sample_draft(0x66))
                .expect("add transaction");
            let head = storage.chain_head().expect("chain head");
            let txs = storage.pending_transactions(8).expect("pending");
            let digests: Vec<B256> = txs.iter().map(|record| record.tx_hash).collect();
            let new_root = rollup_core::state::advance_root(head.root, &digests);
            storage.seal_batch(&head, &txs, new_root).expect("seal")
        };

        let mut harness = start_lane(&db_path, default_test_config(), true);
        let job = tokio::time::timeout(Duration::from_secs(2), harness.proof_rx.recv())
            .await
            .expect("wait for recovered job")
            .expect("proof lane open");
        shutdown_lane(&harness.stop, harness.handle).await;

        assert_eq!(job.batch_id, sealed.batch_id);
        assert_eq!(job.inputs.old_root, sealed.old_root);
        assert_eq!(job.inputs.new_root, sealed.new_root);
        assert_eq!(job.inputs.tx_digests, sealed.tx_digests);
        assert!(job.respond_to.is_none());
    }

    #[test]
    fn queue_chunk_reports_channel_closed_when_disconnected() {
        let db_path = temp_db_path("closed-channel");
        let storage = open_storage(&db_path);
        let (tx, rx) = mpsc::channel::<BatchLaneInput>(1);
        let (proof_tx, _proof_rx) = mpsc::channel::<ProofJob>(1);
        drop(tx);
        let mut lane = BatchLane::new(
            rx,
            storage,
            proof_tx,
            BatchEvents::new(1),
            Arc::new(AtomicBool::new(true)),
            default_test_config(),
        );
        let mut deadline = None;
        let mut metrics = BatchLaneMetrics::new(false, Duration::from_secs(60));

        let err = lane
            .process_queue_chunk(&mut deadline, &mut metrics)
            .unwrap_err();
        assert!(matches!(err, BatchLaneError::ChannelClosed));
    }

    #[test]
    fn queue_chunk_flushes_accepted_submissions_before_disconnect() {
        let db_path = temp_db_path("flush-before-disconnect");
        let storage = open_storage(&db_path);
        let (tx, rx) = mpsc::channel::<BatchLaneInput>(2);
        let (proof_tx, _proof_rx) = mpsc::channel::<ProofJob>(1);
        let (pending, _recv) = make_submission(0x77);
        tx.blocking_send(BatchLaneInput::Submit(pending))
            .expect("enqueue submission");
        drop(tx);
        let mut lane = BatchLane::new(
            rx,
            storage,
            proof_tx,
            BatchEvents::new(1),
            Arc::new(AtomicBool::new(true)),
            default_test_config(),
        );
        let mut deadline = None;
        let mut metrics = BatchLaneMetrics::new(false, Duration::from_secs(60));

        let handled = lane
            .process_queue_chunk(&mut deadline, &mut metrics)
            .expect("flush accepted submissions before disconnect");
        assert_eq!(handled, 1);
        assert_eq!(read_count(&db_path, "transactions"), 1);

        let err = lane
            .process_queue_chunk(&mut deadline, &mut metrics)
            .unwrap_err();
        assert!(matches!(err, BatchLaneError::ChannelClosed));
    }
}
