// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy_primitives::B256;
use tracing_subscriber::EnvFilter;

use rollup_core::proof::{MockProofEngine, ProofEngine, ProofKind, ZkProofEngine};
use rollup_core::state::GENESIS_ROOT;
use sequencer::anchor::{AnchorWorker, AnchorWorkerConfig, AnchorWorkerError, MemoryAnchor};
use sequencer::api::AppState;
use sequencer::batch_lane::{BatchLane, BatchLaneConfig, BatchLaneError, BatchLaneInput};
use sequencer::events::BatchEvents;
use sequencer::prover::{ProofJob, ProofLane, ProofLaneError};
use sequencer::storage;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DB_PATH: &str = "sequencer.db";
const DEFAULT_QUEUE_CAP: usize = 1024;
const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 100;
const DEFAULT_BATCH_SIZE: usize = 8;
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_SUBMISSIONS_PER_CHUNK: usize = 64;
const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(2);
const DEFAULT_LANE_METRICS_LOG_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_EVENT_BUFFER: usize = 256;
const DEFAULT_MAX_BODY_BYTES: usize = 128 * 1024;
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 32 * 1024;
const DEFAULT_SQLITE_SYNCHRONOUS: &str = "NORMAL";
const DEFAULT_PROOF_MODE: &str = "mock";
const DEFAULT_ANCHOR_MODE: &str = "memory";
const DEFAULT_ANCHOR_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_ANCHOR_PAGE_SIZE: usize = 16;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let mut lane_storage = storage::Storage::open(&config.db_path, &config.sqlite_synchronous)?;
    let head = lane_storage.ensure_genesis(config.genesis_root)?;
    tracing::info!(
        height = head.height,
        root = %format!("{:#x}", head.root),
        "chain head loaded"
    );

    let (proof_kind, engine) = config.build_proof_engine()?;
    tracing::info!(proof_mode = proof_kind.as_str(), "proof engine ready");

    let events = BatchEvents::new(config.event_buffer);
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            tracing::debug!(?event, "batch event");
        }
    });

    let running = Arc::new(AtomicBool::new(config.autostart));

    let (tx, rx) = tokio::sync::mpsc::channel::<BatchLaneInput>(config.queue_capacity);
    let (proof_tx, proof_rx) = tokio::sync::mpsc::channel::<ProofJob>(config.queue_capacity);

    let prover_storage = storage::Storage::open(&config.db_path, &config.sqlite_synchronous)?;
    let proof_lane = ProofLane::new(
        proof_rx,
        prover_storage,
        engine,
        events.clone(),
        config.idle_poll_interval,
    );
    let (mut proof_lane_handle, proof_lane_stop) = proof_lane.spawn();

    let batch_lane = BatchLane::new(
        rx,
        lane_storage,
        proof_tx,
        events.clone(),
        running.clone(),
        BatchLaneConfig {
            batch_size: config.batch_size,
            batch_timeout: config.batch_timeout,
            max_submissions_per_chunk: config.max_submissions_per_chunk,
            idle_poll_interval: config.idle_poll_interval,
            metrics_enabled: config.lane_metrics_enabled,
            metrics_log_interval: config.lane_metrics_log_interval,
        },
    );
    let (mut batch_lane_handle, batch_lane_stop) = batch_lane.spawn();

    let anchor = match config.anchor_mode.as_str() {
        "disabled" => None,
        "memory" => {
            let anchor_storage =
                storage::Storage::open(&config.db_path, &config.sqlite_synchronous)?;
            let worker = AnchorWorker::new(
                AnchorWorkerConfig {
                    poll_interval: config.anchor_poll_interval,
                    page_size: config.anchor_page_size,
                },
                anchor_storage,
                MemoryAnchor::new(),
                events.clone(),
            );
            tracing::info!("memory anchor worker started");
            Some(worker.spawn())
        }
        other => return Err(format!("unknown anchor mode: {other} (expected memory or disabled)").into()),
    };

    let reader_storage = storage::Storage::open(&config.db_path, &config.sqlite_synchronous)?;
    let state = Arc::new(AppState {
        lane_tx: tx,
        reader: Arc::new(Mutex::new(reader_storage)),
        running,
        proof_kind,
        queue_timeout: Duration::from_millis(config.queue_timeout_ms),
        max_payload_bytes: config.max_payload_bytes,
    });

    let app = sequencer::api::router(state, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;

    tracing::info!(address = %config.http_addr, "listening");
    tokio::select! {
        server_result = axum::serve(listener, app) => {
            // Stop flags first: a lane that exits drops its downstream sender,
            // and the next worker must already be shutting down when it sees
            // the closed channel.
            batch_lane_stop.request_shutdown();
            proof_lane_stop.request_shutdown();
            if let Some((_, anchor_stop)) = &anchor {
                anchor_stop.request_shutdown();
            }
            match batch_lane_handle.await {
                Ok(BatchLaneError::ShutdownRequested) => {}
                Ok(err) => return Err(format!("batch lane exited during shutdown: {err}").into()),
                Err(join_err) => {
                    return Err(format!("batch lane join error during shutdown: {join_err}").into())
                }
            }
            match proof_lane_handle.await {
                Ok(ProofLaneError::ShutdownRequested) => {}
                Ok(err) => return Err(format!("proof lane exited during shutdown: {err}").into()),
                Err(join_err) => {
                    return Err(format!("proof lane join error during shutdown: {join_err}").into())
                }
            }
            if let Some((anchor_handle, _)) = anchor {
                match anchor_handle.await {
                    Ok(AnchorWorkerError::ShutdownRequested) => {}
                    Ok(err) => {
                        return Err(format!("anchor worker exited during shutdown: {err}").into())
                    }
                    Err(join_err) => {
                        return Err(
                            format!("anchor worker join error during shutdown: {join_err}").into()
                        )
                    }
                }
            }
            server_result?;
        }
        lane_result = &mut batch_lane_handle => {
            match lane_result {
                Ok(err) => return Err(format!("batch lane exited: {err}").into()),
                Err(join_err) => return Err(format!("batch lane join error: {join_err}").into()),
            }
        }
        prover_result = &mut proof_lane_handle => {
            match prover_result {
                Ok(err) => return Err(format!("proof lane exited: {err}").into()),
                Err(join_err) => return Err(format!("proof lane join error: {join_err}").into()),
            }
        }
    }

    Ok(())
}

struct Config {
    http_addr: String,
    db_path: String,
    queue_capacity: usize,
    queue_timeout_ms: u64,
    batch_size: usize,
    /// Duration::ZERO disables the timer trigger.
    batch_timeout: Duration,
    max_submissions_per_chunk: usize,
    idle_poll_interval: Duration,
    lane_metrics_enabled: bool,
    lane_metrics_log_interval: Duration,
    event_buffer: usize,
    max_body_bytes: usize,
    max_payload_bytes: usize,
    sqlite_synchronous: String,
    proof_mode: String,
    genesis_root: B256,
    autostart: bool,
    anchor_mode: String,
    anchor_poll_interval: Duration,
    anchor_page_size: usize,
}

impl Config {
    fn from_env() -> Result<Self, String> {
        Ok(Self {
            http_addr: env_string("SEQ_HTTP_ADDR", DEFAULT_HTTP_ADDR),
            db_path: env_string("SEQ_DB_PATH", DEFAULT_DB_PATH),
            queue_capacity: env_usize("SEQ_QUEUE_CAP", DEFAULT_QUEUE_CAP).max(1),
            queue_timeout_ms: env_u64("SEQ_QUEUE_TIMEOUT_MS", DEFAULT_QUEUE_TIMEOUT_MS),
            batch_size: env_usize("SEQ_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            batch_timeout: Duration::from_millis(env_u64(
                "SEQ_BATCH_TIMEOUT_MS",
                DEFAULT_BATCH_TIMEOUT.as_millis() as u64,
            )),
            max_submissions_per_chunk: env_usize(
                "SEQ_MAX_SUBMISSIONS_PER_CHUNK",
                DEFAULT_MAX_SUBMISSIONS_PER_CHUNK,
            )
            .max(1),
            idle_poll_interval: Duration::from_millis(
                env_u64(
                    "SEQ_IDLE_POLL_INTERVAL_MS",
                    DEFAULT_IDLE_POLL_INTERVAL.as_millis() as u64,
                )
                .max(1),
            ),
            lane_metrics_enabled: env_bool("SEQ_LANE_METRICS", false),
            lane_metrics_log_interval: Duration::from_millis(
                env_u64(
                    "SEQ_LANE_METRICS_LOG_INTERVAL_MS",
                    DEFAULT_LANE_METRICS_LOG_INTERVAL.as_millis() as u64,
                )
                .max(1),
            ),
            event_buffer: env_usize("SEQ_EVENT_BUFFER", DEFAULT_EVENT_BUFFER).max(1),
            max_body_bytes: env_usize("SEQ_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
            max_payload_bytes: env_usize("SEQ_MAX_PAYLOAD_BYTES", DEFAULT_MAX_PAYLOAD_BYTES),
            sqlite_synchronous: env_string("SEQ_SQLITE_SYNCHRONOUS", DEFAULT_SQLITE_SYNCHRONOUS),
            proof_mode: env_string("SEQ_PROOF_MODE", DEFAULT_PROOF_MODE),
            genesis_root: match std::env::var("SEQ_GENESIS_ROOT") {
                Ok(value) => parse_root(&value)?,
                Err(_) => GENESIS_ROOT,
            },
            autostart: env_bool("SEQ_AUTOSTART", true),
            anchor_mode: env_string("SEQ_ANCHOR_MODE", DEFAULT_ANCHOR_MODE),
            anchor_poll_interval: Duration::from_millis(
                env_u64(
                    "SEQ_ANCHOR_POLL_INTERVAL_MS",
                    DEFAULT_ANCHOR_POLL_INTERVAL.as_millis() as u64,
                )
                .max(1),
            ),
            anchor_page_size: env_usize("SEQ_ANCHOR_PAGE_SIZE", DEFAULT_ANCHOR_PAGE_SIZE).max(1),
        })
    }

    fn build_proof_engine(&self) -> Result<(ProofKind, Box<dyn ProofEngine>), String> {
        match self.proof_mode.as_str() {
            "mock" => Ok((ProofKind::Mock, Box::new(MockProofEngine::new()))),
            "plonky2" | "zk" => {
                let started = Instant::now();
                let engine = ZkProofEngine::compile();
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "proving circuit compiled"
                );
                Ok((ProofKind::Zk, Box::new(engine)))
            }
            other => Err(format!("unknown proof mode: {other} (expected mock or plonky2)")),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn parse_root(value: &str) -> Result<B256, String> {
    if !value.starts_with("0x") {
        return Err("state root must be 0x-prefixed hex".to_string());
    }
    let bytes =
        alloy_primitives::hex::decode(value).map_err(|e| format!("invalid state root hex: {e}"))?;
    if bytes.len() != 32 {
        return Err("state root must be 32 bytes".to_string());
    }
    Ok(B256::from_slice(&bytes))
}
