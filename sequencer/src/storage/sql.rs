// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use rusqlite::{params, Connection, OptionalExtension, Result, Row, Transaction};

use rollup_core::tx::TxDraft;
use alloy_primitives::B256;

const SQL_INSERT_TRANSACTION: &str = include_str!("queries/insert_transaction.sql");
const SQL_SELECT_PENDING_TRANSACTIONS: &str =
    include_str!("queries/select_pending_transactions.sql");
const SQL_SELECT_BATCH: &str = include_str!("queries/select_batch.sql");
const SQL_SELECT_BATCHES_PAGE: &str = include_str!("queries/select_batches_page.sql");
const SQL_SELECT_BATCHES_WITH_STATUS: &str =
    include_str!("queries/select_batches_with_status.sql");
const SQL_SELECT_PROOF_FOR_BATCH: &str = include_str!("queries/select_proof_for_batch.sql");

const SQL_COUNT_TRANSACTIONS_WITH_STATUS: &str =
    "SELECT COUNT(*) FROM transactions WHERE status = ?1";
const SQL_COUNT_TRANSACTIONS: &str = "SELECT COUNT(*) FROM transactions";
const SQL_COUNT_PROOFS: &str = "SELECT COUNT(*) FROM proofs";
const SQL_COUNT_BATCHES_BY_STATUS: &str =
    "SELECT status, COUNT(*) FROM batches GROUP BY status";
const SQL_INSERT_BATCH: &str = "INSERT INTO batches \
     (old_state_root, new_state_root, tx_count, status, created_at_ms) \
     VALUES (?1, ?2, ?3, 'pending', ?4)";
const SQL_MARK_TRANSACTION_BATCHED: &str = "UPDATE transactions \
     SET status = 'batched', batch_id = ?1 \
     WHERE tx_hash = ?2 AND status = 'pending'";
const SQL_SELECT_BATCH_STATUS: &str = "SELECT status FROM batches WHERE batch_id = ?1";
const SQL_UPDATE_BATCH_STATUS: &str = "UPDATE batches \
     SET status = ?2, \
         proof_hash = COALESCE(?3, proof_hash), \
         anchor_tx_ref = COALESCE(?4, anchor_tx_ref) \
     WHERE batch_id = ?1";
const SQL_MARK_BATCH_TRANSACTIONS_CONFIRMED: &str = "UPDATE transactions \
     SET status = 'confirmed' \
     WHERE batch_id = ?1 AND status = 'batched'";
const SQL_INSERT_STATE_ROOT: &str = "INSERT INTO state_roots \
     (height, state_root, batch_id, created_at_ms) VALUES (?1, ?2, ?3, ?4)";
const SQL_SELECT_CHAIN_HEAD: &str =
    "SELECT state_root, height FROM state_roots ORDER BY height DESC LIMIT 1";
const SQL_SELECT_STATE_ROOT_AT: &str = "SELECT state_root FROM state_roots WHERE height = ?1";
const SQL_SELECT_BATCH_TX_DIGESTS: &str =
    "SELECT tx_hash FROM transactions WHERE batch_id = ?1 ORDER BY rowid ASC";
const SQL_INSERT_PROOF: &str = "INSERT INTO proofs \
     (batch_id, kind, payload, public_signals, proof_hash, generation_time_ms, \
      verified, created_at_ms) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";
const SQL_SELECT_ACCOUNT: &str =
    "SELECT address, balance, nonce, updated_at_ms FROM accounts WHERE address = ?1";
const SQL_UPSERT_ACCOUNT: &str = "INSERT INTO accounts \
     (address, balance, nonce, updated_at_ms) VALUES (?1, ?2, ?3, ?4) \
     ON CONFLICT (address) DO UPDATE SET \
         balance = excluded.balance, \
         nonce = excluded.nonce, \
         updated_at_ms = excluded.updated_at_ms";

#[derive(Debug, Clone)]
pub(super) struct TransactionRow {
    pub tx_hash: Vec<u8>,
    pub sender: Vec<u8>,
    pub recipient: Vec<u8>,
    pub value: Vec<u8>,
    pub payload: Vec<u8>,
    pub nonce: i64,
    pub status: String,
    pub batch_id: Option<i64>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub(super) struct BatchRow {
    pub batch_id: i64,
    pub old_state_root: Vec<u8>,
    pub new_state_root: Vec<u8>,
    pub tx_count: i64,
    pub status: String,
    pub proof_hash: Option<Vec<u8>>,
    pub anchor_tx_ref: Option<String>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub(super) struct ProofRow {
    pub proof_id: i64,
    pub batch_id: i64,
    pub kind: String,
    pub payload: Vec<u8>,
    pub public_signals: String,
    pub proof_hash: Vec<u8>,
    pub generation_time_ms: i64,
    pub verified: i64,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub(super) struct AccountRow {
    pub address: Vec<u8>,
    pub balance: Vec<u8>,
    pub nonce: i64,
    pub updated_at_ms: i64,
}

pub(super) fn sql_insert_transaction(
    conn: &Connection,
    draft: &TxDraft,
    tx_hash: B256,
    created_at_ms: i64,
) -> Result<usize> {
    let value_be = draft.value.to_be_bytes::<32>();
    let mut stmt = conn.prepare_cached(SQL_INSERT_TRANSACTION)?;
    stmt.execute(params![
        tx_hash.as_slice(),
        draft.sender.as_slice(),
        draft.recipient.as_slice(),
        value_be.as_slice(),
        draft.payload.as_ref(),
        u64_to_i64(draft.nonce),
        created_at_ms,
    ])
}

pub(super) fn sql_select_pending_transactions(
    conn: &Connection,
    limit: i64,
) -> Result<Vec<TransactionRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_PENDING_TRANSACTIONS)?;
    let mapped = stmt.query_map(params![limit], convert_row_to_transaction_row)?;
    mapped.collect()
}

pub(super) fn sql_count_transactions_with_status(
    conn: &Connection,
    status: &str,
) -> Result<i64> {
    conn.query_row(SQL_COUNT_TRANSACTIONS_WITH_STATUS, params![status], |row| {
        row.get(0)
    })
}

pub(super) fn sql_count_transactions(conn: &Connection) -> Result<i64> {
    conn.query_row(SQL_COUNT_TRANSACTIONS, [], |row| row.get(0))
}

pub(super) fn sql_count_proofs(conn: &Connection) -> Result<i64> {
    conn.query_row(SQL_COUNT_PROOFS, [], |row| row.get(0))
}

pub(super) fn sql_count_batches_by_status(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare_cached(SQL_COUNT_BATCHES_BY_STATUS)?;
    let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    mapped.collect()
}

pub(super) fn sql_insert_batch(
    tx: &Transaction<'_>,
    old_state_root: &[u8],
    new_state_root: &[u8],
    tx_count: i64,
    created_at_ms: i64,
) -> Result<usize> {
    tx.execute(
        SQL_INSERT_BATCH,
        params![old_state_root, new_state_root, tx_count, created_at_ms],
    )
}

pub(super) fn sql_mark_transaction_batched(
    tx: &Transaction<'_>,
    batch_id: i64,
    tx_hash: &[u8],
) -> Result<usize> {
    let mut stmt = tx.prepare_cached(SQL_MARK_TRANSACTION_BATCHED)?;
    stmt.execute(params![batch_id, tx_hash])
}

pub(super) fn sql_select_batch_status(
    conn: &Connection,
    batch_id: i64,
) -> Result<Option<String>> {
    conn.query_row(SQL_SELECT_BATCH_STATUS, params![batch_id], |row| row.get(0))
        .optional()
}

pub(super) fn sql_update_batch_status(
    conn: &Connection,
    batch_id: i64,
    status: &str,
    proof_hash: Option<&[u8]>,
    anchor_tx_ref: Option<&str>,
) -> Result<usize> {
    conn.execute(
        SQL_UPDATE_BATCH_STATUS,
        params![batch_id, status, proof_hash, anchor_tx_ref],
    )
}

pub(super) fn sql_mark_batch_transactions_confirmed(
    conn: &Connection,
    batch_id: i64,
) -> Result<usize> {
    conn.execute(SQL_MARK_BATCH_TRANSACTIONS_CONFIRMED, params![batch_id])
}

pub(super) fn sql_insert_state_root(
    tx: &Transaction<'_>,
    height: i64,
    state_root: &[u8],
    batch_id: Option<i64>,
    created_at_ms: i64,
) -> Result<usize> {
    tx.execute(
        SQL_INSERT_STATE_ROOT,
        params![height, state_root, batch_id, created_at_ms],
    )
}

pub(super) fn sql_select_chain_head(conn: &Connection) -> Result<(Vec<u8>, i64)> {
    conn.query_row(SQL_SELECT_CHAIN_HEAD, [], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })
}

pub(super) fn sql_select_state_root_at(
    conn: &Connection,
    height: i64,
) -> Result<Option<Vec<u8>>> {
    conn.query_row(SQL_SELECT_STATE_ROOT_AT, params![height], |row| row.get(0))
        .optional()
}

pub(super) fn sql_select_batch(conn: &Connection, batch_id: i64) -> Result<Option<BatchRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_BATCH)?;
    stmt.query_row(params![batch_id], convert_row_to_batch_row)
        .optional()
}

pub(super) fn sql_select_batches_page(conn: &Connection, limit: i64) -> Result<Vec<BatchRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_BATCHES_PAGE)?;
    let mapped = stmt.query_map(params![limit], convert_row_to_batch_row)?;
    mapped.collect()
}

pub(super) fn sql_select_batches_with_status(
    conn: &Connection,
    status: &str,
    limit: i64,
) -> Result<Vec<BatchRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_BATCHES_WITH_STATUS)?;
    let mapped = stmt.query_map(params![status, limit], convert_row_to_batch_row)?;
    mapped.collect()
}

pub(super) fn sql_select_batch_tx_digests(
    conn: &Connection,
    batch_id: i64,
) -> Result<Vec<Vec<u8>>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_BATCH_TX_DIGESTS)?;
    let mapped = stmt.query_map(params![batch_id], |row| row.get(0))?;
    mapped.collect()
}

#[allow(clippy::too_many_arguments)]
pub(super) fn sql_insert_proof(
    conn: &Connection,
    batch_id: i64,
    kind: &str,
    payload: &[u8],
    public_signals: &str,
    proof_hash: &[u8],
    generation_time_ms: i64,
    verified: bool,
    created_at_ms: i64,
) -> Result<usize> {
    conn.execute(
        SQL_INSERT_PROOF,
        params![
            batch_id,
            kind,
            payload,
            public_signals,
            proof_hash,
            generation_time_ms,
            verified as i64,
            created_at_ms,
        ],
    )
}

pub(super) fn sql_select_proof_for_batch(
    conn: &Connection,
    batch_id: i64,
) -> Result<Option<ProofRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_PROOF_FOR_BATCH)?;
    stmt.query_row(params![batch_id], convert_row_to_proof_row)
        .optional()
}

pub(super) fn sql_select_account(
    conn: &Connection,
    address: &[u8],
) -> Result<Option<AccountRow>> {
    conn.query_row(SQL_SELECT_ACCOUNT, params![address], convert_row_to_account_row)
        .optional()
}

pub(super) fn sql_upsert_account(
    tx: &Transaction<'_>,
    address: &[u8],
    balance: &[u8],
    nonce: i64,
    updated_at_ms: i64,
) -> Result<usize> {
    let mut stmt = tx.prepare_cached(SQL_UPSERT_ACCOUNT)?;
    stmt.execute(params![address, balance, nonce, updated_at_ms])
}

fn convert_row_to_transaction_row(row: &Row<'_>) -> Result<TransactionRow> {
    Ok(TransactionRow {
        tx_hash: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        value: row.get(3)?,
        payload: row.get(4)?,
        nonce: row.get(5)?,
        status: row.get(6)?,
        batch_id: row.get(7)?,
        created_at_ms: row.get(8)?,
    })
}

fn convert_row_to_batch_row(row: &Row<'_>) -> Result<BatchRow> {
    Ok(BatchRow {
        batch_id: row.get(0)?,
        old_state_root: row.get(1)?,
        new_state_root: row.get(2)?,
        tx_count: row.get(3)?,
        status: row.get(4)?,
        proof_hash: row.get(5)?,
        anchor_tx_ref: row.get(6)?,
        created_at_ms: row.get(7)?,
    })
}

fn convert_row_to_proof_row(row: &Row<'_>) -> Result<ProofRow> {
    Ok(ProofRow {
        proof_id: row.get(0)?,
        batch_id: row.get(1)?,
        kind: row.get(2)?,
        payload: row.get(3)?,
        public_signals: row.get(4)?,
        proof_hash: row.get(5)?,
        generation_time_ms: row.get(6)?,
        verified: row.get(7)?,
        created_at_ms: row.get(8)?,
    })
}

fn convert_row_to_account_row(row: &Row<'_>) -> Result<AccountRow> {
    Ok(AccountRow {
        address: row.get(0)?,
        balance: row.get(1)?,
        nonce: row.get(2)?,
        updated_at_ms: row.get(3)?,
    })
}

fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
