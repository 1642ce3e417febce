// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::info;

use alloy_primitives::{Address, U256};

use crate::batch_lane::{BatchLaneInput, PendingSubmission, TriggerRequest};
use crate::storage::{BatchRecord, ProofRecord, Storage, TransactionRecord};
use rollup_core::proof::ProofKind;
use rollup_core::tx::TxDraft;

pub use error::ApiError;

const DEFAULT_PAGE_LIMIT: usize = 100;
const MAX_PAGE_LIMIT: usize = 1_000;

#[derive(Clone)]
pub struct AppState {
    pub lane_tx: mpsc::Sender<BatchLaneInput>,
    pub reader: Arc<Mutex<Storage>>,
    pub running: Arc<AtomicBool>,
    pub proof_kind: ProofKind,
    pub queue_timeout: Duration,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct TxRequest {
    from: String,
    to: String,
    value: String,
    nonce: u64,
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct TxResponse {
    ok: bool,
    tx_hash: String,
    duplicate: bool,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct TxPoolResponse {
    ok: bool,
    count: usize,
    transactions: Vec<TxView>,
}

#[derive(Debug, Serialize)]
struct BatchesResponse {
    ok: bool,
    count: usize,
    batches: Vec<BatchView>,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    ok: bool,
    batch: BatchView,
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    ok: bool,
    batch: Option<BatchView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ProofResponse {
    ok: bool,
    proof: ProofView,
}

#[derive(Debug, Serialize)]
struct StateResponse {
    ok: bool,
    height: u64,
    state_root: String,
    pending_transactions: u64,
    is_running: bool,
    proof_mode: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    ok: bool,
    pending_transactions: u64,
    total_transactions: u64,
    total_batches: u64,
    proven_batches: u64,
    failed_batches: u64,
    submitted_batches: u64,
    confirmed_batches: u64,
    total_proofs: u64,
    chain_height: u64,
    state_root: String,
    is_running: bool,
    proof_mode: String,
}

#[derive(Debug, Serialize)]
struct AccountResponse {
    ok: bool,
    account: AccountView,
}

#[derive(Debug, Serialize)]
struct AccountView {
    address: String,
    balance: String,
    nonce: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    ok: bool,
    is_running: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
    version: &'static str,
    proof_mode: String,
}

#[derive(Debug, Serialize)]
struct TxView {
    tx_hash: String,
    from: String,
    to: String,
    value: String,
    nonce: u64,
    data: String,
    status: String,
    batch_id: Option<u64>,
    created_at_ms: i64,
}

impl From<TransactionRecord> for TxView {
    fn from(record: TransactionRecord) -> Self {
        Self {
            tx_hash: encode_hex(&record.tx_hash),
            from: record.sender.to_string(),
            to: record.recipient.to_string(),
            value: record.value.to_string(),
            nonce: record.nonce,
            data: alloy_primitives::hex::encode_prefixed(&record.payload),
            status: record.status.as_str().to_string(),
            batch_id: record.batch_id,
            created_at_ms: record.created_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchView {
    batch_id: u64,
    old_state_root: String,
    new_state_root: String,
    tx_count: u32,
    status: String,
    proof_hash: Option<String>,
    anchor_tx_ref: Option<String>,
    created_at_ms: i64,
}

impl From<BatchRecord> for BatchView {
    fn from(record: BatchRecord) -> Self {
        Self {
            batch_id: record.batch_id,
            old_state_root: encode_hex(&record.old_state_root),
            new_state_root: encode_hex(&record.new_state_root),
            tx_count: record.tx_count,
            status: record.status.as_str().to_string(),
            proof_hash: record.proof_hash.as_ref().map(encode_hex),
            anchor_tx_ref: record.anchor_tx_ref,
            created_at_ms: record.created_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct ProofView {
    proof_id: u64,
    batch_id: u64,
    kind: String,
    payload: String,
    public_signals: Vec<String>,
    proof_hash: String,
    generation_time_ms: u64,
    verified: bool,
    created_at_ms: i64,
}

impl From<ProofRecord> for ProofView {
    fn from(record: ProofRecord) -> Self {
        Self {
            proof_id: record.proof_id,
            batch_id: record.batch_id,
            kind: record.kind.as_str().to_string(),
            payload: alloy_primitives::hex::encode_prefixed(&record.payload),
            public_signals: record.public_signals,
            proof_hash: encode_hex(&record.proof_hash),
            generation_time_ms: record.generation_time_ms,
            verified: record.verified,
            created_at_ms: record.created_at_ms,
        }
    }
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/transactions", post(submit_tx))
        .route("/txpool", get(list_txpool))
        .route("/batch/trigger", post(trigger_batch))
        .route("/batches", get(list_batches))
        .route("/batches/{batch_id}", get(get_batch))
        .route("/proofs/{batch_id}", get(get_proof))
        .route("/accounts/{address}", get(get_account))
        .route("/state", get(get_state))
        .route("/stats", get(get_stats))
        .route("/start", post(start_batching))
        .route("/stop", post(stop_batching))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: "rollup-sequencer",
        version: env!("CARGO_PKG_VERSION"),
        proof_mode: state.proof_kind.as_str().to_string(),
    })
}

async fn submit_tx(
    State(state): State<Arc<AppState>>,
    req: Result<Json<TxRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<TxResponse>, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;

    let sender = parse_address(&req.from).map_err(ApiError::bad_request)?;
    let recipient = parse_address(&req.to).map_err(ApiError::bad_request)?;
    let value = parse_u256(&req.value).map_err(ApiError::bad_request)?;
    let payload = match req.data.as_deref() {
        Some(data) => decode_hex_0x(data).map_err(ApiError::bad_request)?,
        None => Vec::new(),
    };
    if payload.len() > state.max_payload_bytes {
        return Err(ApiError::bad_request(format!(
            "transaction payload too large: max {} bytes, got {} bytes",
            state.max_payload_bytes,
            payload.len()
        )));
    }

    let draft = TxDraft {
        sender,
        recipient,
        value,
        payload: payload.into(),
        nonce: req.nonce,
    };

    let (respond_to, recv) = oneshot::channel();
    let submission = PendingSubmission {
        draft,
        respond_to,
        received_at: SystemTime::now(),
    };

    enqueue(&state, BatchLaneInput::Submit(submission)).await?;

    let outcome = recv
        .await
        .map_err(|_| ApiError::internal_error("batch lane dropped response"))?
        .map_err(ApiError::from)?;

    info!(
        tx_hash = %encode_hex(&outcome.tx_hash),
        duplicate = outcome.duplicate,
        "transaction accepted"
    );

    Ok(Json(TxResponse {
        ok: true,
        tx_hash: encode_hex(&outcome.tx_hash),
        duplicate: outcome.duplicate,
    }))
}

async fn trigger_batch(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let (respond_to, recv) = oneshot::channel();
    enqueue(&state, BatchLaneInput::Trigger(TriggerRequest { respond_to })).await?;

    let batch = recv
        .await
        .map_err(|_| ApiError::internal_error("batch lane dropped response"))?
        .map_err(ApiError::from)?;

    if let Some(batch) = &batch {
        info!(batch_id = batch.batch_id, status = %batch.status, "manual batch trigger completed");
    }

    let message = batch.is_none().then_some("no pending transactions");
    Ok(Json(TriggerResponse {
        ok: true,
        batch: batch.map(BatchView::from),
        message,
    }))
}

async fn list_txpool(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<TxPoolResponse>, ApiError> {
    let limit = page_limit(&params);
    let transactions = with_reader(&state, move |storage| storage.pending_transactions(limit)).await?;
    Ok(Json(TxPoolResponse {
        ok: true,
        count: transactions.len(),
        transactions: transactions.into_iter().map(TxView::from).collect(),
    }))
}

async fn list_batches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> Result<Json<BatchesResponse>, ApiError> {
    let limit = page_limit(&params);
    let batches = with_reader(&state, move |storage| storage.batches_page(limit)).await?;
    Ok(Json(BatchesResponse {
        ok: true,
        count: batches.len(),
        batches: batches.into_iter().map(BatchView::from).collect(),
    }))
}

async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<u64>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = with_reader(&state, move |storage| storage.batch(batch_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("batch {batch_id} not found")))?;
    Ok(Json(BatchResponse {
        ok: true,
        batch: batch.into(),
    }))
}

async fn get_proof(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<u64>,
) -> Result<Json<ProofResponse>, ApiError> {
    let proof = with_reader(&state, move |storage| storage.proof_for_batch(batch_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no proof recorded for batch {batch_id}")))?;
    Ok(Json(ProofResponse {
        ok: true,
        proof: proof.into(),
    }))
}

async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address).map_err(ApiError::bad_request)?;
    let account = with_reader(&state, move |storage| storage.account(address)).await?;
    // Addresses the ledger never touched read as empty accounts, not 404s.
    let view = match account {
        Some(record) => AccountView {
            address: record.address.to_string(),
            balance: record.balance.to_string(),
            nonce: record.nonce,
            updated_at_ms: Some(record.updated_at_ms),
        },
        None => AccountView {
            address: address.to_string(),
            balance: U256::ZERO.to_string(),
            nonce: 0,
            updated_at_ms: None,
        },
    };
    Ok(Json(AccountResponse {
        ok: true,
        account: view,
    }))
}

async fn get_state(State(state): State<Arc<AppState>>) -> Result<Json<StateResponse>, ApiError> {
    let (head, pending) = with_reader(&state, |storage| {
        let head = storage.chain_head()?;
        let pending = storage.count_pending()?;
        Ok((head, pending))
    })
    .await?;

    Ok(Json(StateResponse {
        ok: true,
        height: head.height,
        state_root: encode_hex(&head.root),
        pending_transactions: pending,
        is_running: state.running.load(Ordering::Relaxed),
        proof_mode: state.proof_kind.as_str().to_string(),
    }))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let snapshot = with_reader(&state, |storage| storage.snapshot()).await?;

    Ok(Json(StatsResponse {
        ok: true,
        pending_transactions: snapshot.stats.pending_transactions,
        total_transactions: snapshot.stats.total_transactions,
        total_batches: snapshot.stats.total_batches,
        proven_batches: snapshot.stats.proven_batches,
        failed_batches: snapshot.stats.failed_batches,
        submitted_batches: snapshot.stats.submitted_batches,
        confirmed_batches: snapshot.stats.confirmed_batches,
        total_proofs: snapshot.stats.total_proofs,
        chain_height: snapshot.head.height,
        state_root: encode_hex(&snapshot.head.root),
        is_running: state.running.load(Ordering::Relaxed),
        proof_mode: state.proof_kind.as_str().to_string(),
    }))
}

async fn start_batching(State(state): State<Arc<AppState>>) -> Json<ControlResponse> {
    state.running.store(true, Ordering::Relaxed);
    info!("autonomous batching started");
    Json(ControlResponse {
        ok: true,
        is_running: true,
    })
}

async fn stop_batching(State(state): State<Arc<AppState>>) -> Json<ControlResponse> {
    state.running.store(false, Ordering::Relaxed);
    info!("autonomous batching stopped");
    Json(ControlResponse {
        ok: true,
        is_running: false,
    })
}

async fn enqueue(state: &AppState, input: BatchLaneInput) -> Result<(), ApiError> {
    match state.lane_tx.send_timeout(input, state.queue_timeout).await {
        Ok(()) => Ok(()),
        Err(SendTimeoutError::Timeout(_)) => Err(ApiError::overloaded("queue full")),
        Err(SendTimeoutError::Closed(_)) => Err(ApiError::internal_error("batch lane unavailable")),
    }
}

fn page_limit(params: &PageParams) -> usize {
    params.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

fn decode_hex_0x(value: &str) -> Result<Vec<u8>, String> {
    if !value.starts_with("0x") {
        return Err("hex string must start with 0x".to_string());
    }
    alloy_primitives::hex::decode(value).map_err(|err| format!("invalid hex: {err}"))
}

fn parse_address(value: &str) -> Result<Address, String> {
    let bytes = decode_hex_0x(value)?;
    if bytes.len() != 20 {
        return Err("address must be 20 bytes".to_string());
    }
    Ok(Address::from_slice(&bytes))
}

fn parse_u256(value: &str) -> Result<U256, String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|err| format!("invalid value: {err}"))
}

fn encode_hex(value: &alloy_primitives::B256) -> String {
    alloy_primitives::hex::encode_prefixed(value.as_slice())
}

/// Read-side queries run on the blocking pool so handlers never hold the
/// storage lock on an async thread.
async fn with_reader<T, F>(state: &AppState, query: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Storage) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let reader = Arc::clone(&state.reader);
    let result = tokio::task::spawn_blocking(move || {
        let mut storage = reader.lock().expect("reader storage mutex poisoned");
        query(&mut storage)
    })
    .await
    .map_err(|_| ApiError::internal_error("storage reader task failed"))?;
    result.map_err(|err| ApiError::internal_error(format!("db error: {err}")))
}
