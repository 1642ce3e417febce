// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use rusqlite::{Connection, Result, Transaction, TransactionBehavior};
use rusqlite_migration::{Migrations, M};
use std::time::{SystemTime, UNIX_EPOCH};

use super::sql::{
    sql_count_batches_by_status, sql_count_proofs, sql_count_transactions,
    sql_count_transactions_with_status, sql_insert_batch, sql_insert_proof,
    sql_insert_state_root, sql_insert_transaction, sql_mark_batch_transactions_confirmed,
    sql_mark_transaction_batched, sql_select_account, sql_select_batch, sql_select_batch_status,
    sql_select_batch_tx_digests, sql_select_batches_page, sql_select_batches_with_status,
    sql_select_chain_head, sql_select_pending_transactions, sql_select_proof_for_batch,
    sql_select_state_root_at, sql_update_batch_status, sql_upsert_account, AccountRow, BatchRow,
    ProofRow, TransactionRow,
};
use super::{
    AccountRecord, BatchRecord, LedgerError, LedgerSnapshot, LedgerStats, ProofRecord,
    SealedBatch, StorageOpenError, TransactionRecord,
};
use alloy_primitives::{Address, B256, U256};
use rollup_core::batch::BatchStatus;
use rollup_core::proof::Proof;
use rollup_core::state::ChainHead;
use rollup_core::tx::TxDraft;

const MIGRATION_0001_SCHEMA: &str = include_str!("migrations/0001_schema.sql");
const MIGRATION_0002_INDEXES: &str = include_str!("migrations/0002_indexes.sql");

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &str, synchronous: &str) -> std::result::Result<Self, StorageOpenError> {
        let conn = Self::open_connection_with_migrations(path, synchronous)?;
        Ok(Self { conn })
    }

    pub fn open_connection(
        path: &str,
        synchronous: &str,
    ) -> std::result::Result<Connection, StorageOpenError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", synchronous)?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    pub fn open_connection_with_migrations(
        path: &str,
        synchronous: &str,
    ) -> std::result::Result<Connection, StorageOpenError> {
        let mut conn = Self::open_connection(path, synchronous)?;
        Self::run_migrations(&mut conn)?;
        Ok(conn)
    }

    pub fn run_migrations(conn: &mut Connection) -> std::result::Result<(), StorageOpenError> {
        Migrations::new(vec![
            M::up(MIGRATION_0001_SCHEMA),
            M::up(MIGRATION_0002_INDEXES),
        ])
        .to_latest(conn)?;
        Ok(())
    }

    // Writes the height-0 root on first boot; afterwards only checks that the
    // configured genesis still matches the persisted chain.
    pub fn ensure_genesis(&mut self, genesis_root: B256) -> Result<ChainHead, LedgerError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        match sql_select_state_root_at(&tx, 0)? {
            Some(bytes) => {
                let stored = convert_root_blob(&bytes);
                if stored != genesis_root {
                    return Err(LedgerError::GenesisMismatch {
                        stored,
                        configured: genesis_root,
                    });
                }
            }
            None => {
                sql_insert_state_root(&tx, 0, genesis_root.as_slice(), None, now_unix_ms())?;
            }
        }
        let head = query_chain_head(&tx)?;
        tx.commit()?;
        Ok(head)
    }

    pub fn add_transaction(&mut self, draft: &TxDraft) -> Result<B256, LedgerError> {
        let tx_hash = draft.hash();
        match sql_insert_transaction(&self.conn, draft, tx_hash, now_unix_ms()) {
            Ok(_) => Ok(tx_hash),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LedgerError::DuplicateTransaction { tx_hash })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn pending_transactions(&mut self, limit: usize) -> Result<Vec<TransactionRecord>> {
        let rows = sql_select_pending_transactions(&self.conn, u64_to_i64(limit as u64))?;
        Ok(rows.into_iter().map(convert_transaction_row).collect())
    }

    pub fn count_pending(&mut self) -> Result<u64> {
        let count = sql_count_transactions_with_status(&self.conn, "pending")?;
        Ok(i64_to_u64(count))
    }

    pub fn chain_head(&mut self) -> Result<ChainHead> {
        query_chain_head(&self.conn)
    }

    // One atomic step of the pipeline: the batch row, the status flip of every
    // included transaction, the next state root and the account movements all
    // commit together or not at all. The head is re-validated inside the write
    // transaction so the check and the writes observe the same snapshot.
    pub fn seal_batch(
        &mut self,
        expected_head: &ChainHead,
        txs: &[TransactionRecord],
        new_root: B256,
    ) -> Result<SealedBatch, LedgerError> {
        assert!(!txs.is_empty(), "seal_batch requires at least one transaction");

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        check_chain_head_matches(&tx, expected_head)?;

        let now_ms = now_unix_ms();
        sql_insert_batch(
            &tx,
            expected_head.root.as_slice(),
            new_root.as_slice(),
            u64_to_i64(txs.len() as u64),
            now_ms,
        )?;
        let batch_id = tx.last_insert_rowid();

        for record in txs {
            let changed = sql_mark_transaction_batched(&tx, batch_id, record.tx_hash.as_slice())?;
            if changed != 1 {
                return Err(LedgerError::Sqlite(rusqlite::Error::StatementChangedRows(
                    changed,
                )));
            }
        }

        let height = expected_head.height.saturating_add(1);
        sql_insert_state_root(
            &tx,
            u64_to_i64(height),
            new_root.as_slice(),
            Some(batch_id),
            now_ms,
        )?;
        apply_account_movements(&tx, txs, now_ms)?;

        tx.commit()?;
        Ok(SealedBatch {
            batch_id: i64_to_u64(batch_id),
            old_root: expected_head.root,
            new_root,
            height,
            tx_digests: txs.iter().map(|record| record.tx_hash).collect(),
        })
    }

    pub fn update_batch_status(
        &mut self,
        batch_id: u64,
        next: BatchStatus,
        proof_hash: Option<B256>,
        anchor_tx_ref: Option<&str>,
    ) -> Result<BatchRecord, LedgerError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = sql_select_batch_status(&tx, u64_to_i64(batch_id))?
            .ok_or(LedgerError::BatchNotFound { batch_id })?;
        let current: BatchStatus = current.parse().expect("batch row: unknown status");
        if !current.can_advance_to(next) {
            return Err(LedgerError::InvalidTransition {
                batch_id,
                from: current,
                to: next,
            });
        }

        let hash_slice = proof_hash.as_ref().map(|hash| hash.as_slice());
        let changed = sql_update_batch_status(
            &tx,
            u64_to_i64(batch_id),
            next.as_str(),
            hash_slice,
            anchor_tx_ref,
        )?;
        if changed != 1 {
            return Err(LedgerError::Sqlite(rusqlite::Error::StatementChangedRows(
                changed,
            )));
        }
        // Confirmation settles the batch's transactions in the same commit.
        if next == BatchStatus::Confirmed {
            sql_mark_batch_transactions_confirmed(&tx, u64_to_i64(batch_id))?;
        }

        let row = sql_select_batch(&tx, u64_to_i64(batch_id))?
            .ok_or(LedgerError::BatchNotFound { batch_id })?;
        tx.commit()?;
        Ok(convert_batch_row(row))
    }

    pub fn save_proof(
        &mut self,
        batch_id: u64,
        proof: &Proof,
        verified: bool,
    ) -> Result<u64, LedgerError> {
        let signals = serde_json::to_string(&proof.public_signals)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        match sql_insert_proof(
            &self.conn,
            u64_to_i64(batch_id),
            proof.kind.as_str(),
            &proof.payload,
            &signals,
            proof.hash.as_slice(),
            u64_to_i64(proof.generation_time_ms),
            verified,
            now_unix_ms(),
        ) {
            Ok(_) => Ok(i64_to_u64(self.conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LedgerError::DuplicateProof { batch_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn proof_for_batch(&mut self, batch_id: u64) -> Result<Option<ProofRecord>> {
        let row = sql_select_proof_for_batch(&self.conn, u64_to_i64(batch_id))?;
        Ok(row.map(convert_proof_row))
    }

    pub fn batch(&mut self, batch_id: u64) -> Result<Option<BatchRecord>> {
        let row = sql_select_batch(&self.conn, u64_to_i64(batch_id))?;
        Ok(row.map(convert_batch_row))
    }

    pub fn batches_page(&mut self, limit: usize) -> Result<Vec<BatchRecord>> {
        let rows = sql_select_batches_page(&self.conn, u64_to_i64(limit as u64))?;
        Ok(rows.into_iter().map(convert_batch_row).collect())
    }

    pub fn batches_with_status(
        &mut self,
        status: BatchStatus,
        limit: usize,
    ) -> Result<Vec<BatchRecord>> {
        let rows = sql_select_batches_with_status(
            &self.conn,
            status.as_str(),
            u64_to_i64(limit as u64),
        )?;
        Ok(rows.into_iter().map(convert_batch_row).collect())
    }

    pub fn batch_tx_digests(&mut self, batch_id: u64) -> Result<Vec<B256>> {
        let rows = sql_select_batch_tx_digests(&self.conn, u64_to_i64(batch_id))?;
        Ok(rows.iter().map(|blob| convert_root_blob(blob)).collect())
    }

    pub fn account(&mut self, address: Address) -> Result<Option<AccountRecord>> {
        let row = sql_select_account(&self.conn, address.as_slice())?;
        Ok(row.map(convert_account_row))
    }

    pub fn snapshot(&mut self) -> Result<LedgerSnapshot> {
        let mut stats = LedgerStats {
            pending_transactions: i64_to_u64(sql_count_transactions_with_status(
                &self.conn, "pending",
            )?),
            total_transactions: i64_to_u64(sql_count_transactions(&self.conn)?),
            total_proofs: i64_to_u64(sql_count_proofs(&self.conn)?),
            ..LedgerStats::default()
        };
        for (status, count) in sql_count_batches_by_status(&self.conn)? {
            let count = i64_to_u64(count);
            stats.total_batches = stats.total_batches.saturating_add(count);
            match status.as_str() {
                "proven" => stats.proven_batches = count,
                "failed" => stats.failed_batches = count,
                "submitted" => stats.submitted_batches = count,
                "confirmed" => stats.confirmed_batches = count,
                _ => {}
            }
        }
        let head = query_chain_head(&self.conn)?;
        Ok(LedgerSnapshot { stats, head })
    }
}

fn check_chain_head_matches(tx: &Transaction<'_>, expected: &ChainHead) -> Result<(), LedgerError> {
    let actual = query_chain_head(tx)?;
    if actual != *expected {
        return Err(LedgerError::ChainMismatch {
            expected_root: expected.root,
            expected_height: expected.height,
            actual_root: actual.root,
            actual_height: actual.height,
        });
    }
    Ok(())
}

fn query_chain_head(conn: &Connection) -> Result<ChainHead> {
    let (root, height) = sql_select_chain_head(conn)?;
    Ok(ChainHead {
        root: convert_root_blob(&root),
        height: i64_to_u64(height),
    })
}

fn apply_account_movements(
    tx: &Transaction<'_>,
    txs: &[TransactionRecord],
    now_ms: i64,
) -> Result<()> {
    // Balances are bookkeeping only; debits saturate at zero instead of
    // rejecting the transaction.
    for record in txs {
        let sender = query_account_or_default(tx, record.sender)?;
        let debited = sender.balance.saturating_sub(record.value);
        let next_nonce = sender.nonce.max(record.nonce.saturating_add(1));
        upsert_account(tx, record.sender, debited, next_nonce, now_ms)?;

        let recipient = query_account_or_default(tx, record.recipient)?;
        let credited = recipient.balance.saturating_add(record.value);
        upsert_account(tx, record.recipient, credited, recipient.nonce, now_ms)?;
    }
    Ok(())
}

fn query_account_or_default(tx: &Transaction<'_>, address: Address) -> Result<AccountRecord> {
    let row = sql_select_account(tx, address.as_slice())?;
    Ok(row.map(convert_account_row).unwrap_or(AccountRecord {
        address,
        balance: U256::ZERO,
        nonce: 0,
        updated_at_ms: 0,
    }))
}

fn upsert_account(
    tx: &Transaction<'_>,
    address: Address,
    balance: U256,
    nonce: u64,
    now_ms: i64,
) -> Result<()> {
    let balance_be = balance.to_be_bytes::<32>();
    sql_upsert_account(
        tx,
        address.as_slice(),
        balance_be.as_slice(),
        u64_to_i64(nonce),
        now_ms,
    )?;
    Ok(())
}

fn convert_transaction_row(row: TransactionRow) -> TransactionRecord {
    assert_eq!(row.tx_hash.len(), 32, "transaction row: tx_hash must be 32 bytes");
    assert_eq!(row.sender.len(), 20, "transaction row: sender must be 20 bytes");
    assert_eq!(
        row.recipient.len(),
        20,
        "transaction row: recipient must be 20 bytes"
    );
    assert_eq!(row.value.len(), 32, "transaction row: value must be 32 bytes");
    TransactionRecord {
        tx_hash: B256::from_slice(&row.tx_hash),
        sender: Address::from_slice(&row.sender),
        recipient: Address::from_slice(&row.recipient),
        value: U256::from_be_slice(&row.value),
        payload: row.payload,
        nonce: i64_to_u64(row.nonce),
        status: row.status.parse().expect("transaction row: unknown status"),
        batch_id: row.batch_id.map(i64_to_u64),
        created_at_ms: row.created_at_ms,
    }
}

fn convert_batch_row(row: BatchRow) -> BatchRecord {
    BatchRecord {
        batch_id: i64_to_u64(row.batch_id),
        old_state_root: convert_root_blob(&row.old_state_root),
        new_state_root: convert_root_blob(&row.new_state_root),
        tx_count: i64_to_u32(row.tx_count),
        status: row.status.parse().expect("batch row: unknown status"),
        proof_hash: row.proof_hash.as_deref().map(convert_root_blob),
        anchor_tx_ref: row.anchor_tx_ref,
        created_at_ms: row.created_at_ms,
    }
}

fn convert_proof_row(row: ProofRow) -> ProofRecord {
    ProofRecord {
        proof_id: i64_to_u64(row.proof_id),
        batch_id: i64_to_u64(row.batch_id),
        kind: row.kind.parse().expect("proof row: unknown kind"),
        payload: row.payload,
        public_signals: serde_json::from_str(&row.public_signals)
            .expect("proof row: malformed public signals"),
        proof_hash: convert_root_blob(&row.proof_hash),
        generation_time_ms: i64_to_u64(row.generation_time_ms),
        verified: row.verified != 0,
        created_at_ms: row.created_at_ms,
    }
}

fn convert_account_row(row: AccountRow) -> AccountRecord {
    assert_eq!(row.address.len(), 20, "account row: address must be 20 bytes");
    assert_eq!(row.balance.len(), 32, "account row: balance must be 32 bytes");
    AccountRecord {
        address: Address::from_slice(&row.address),
        balance: U256::from_be_slice(&row.balance),
        nonce: i64_to_u64(row.nonce),
        updated_at_ms: row.updated_at_ms,
    }
}

fn convert_root_blob(blob: &[u8]) -> B256 {
    assert_eq!(blob.len(), 32, "root blob must be 32 bytes");
    B256::from_slice(blob)
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_u64(value: i64) -> u64 {
    value.max(0) as u64
}

fn i64_to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::Storage;
    use crate::storage::sql::sql_count_transactions_with_status;
    use crate::storage::LedgerError;
    use alloy_primitives::{Address, Bytes, B256, U256};
    use rollup_core::batch::BatchStatus;
    use rollup_core::proof::{BatchInputs, MockProofEngine, ProofEngine};
    use rollup_core::state::{advance_root, GENESIS_ROOT};
    use rollup_core::tx::{TxDraft, TxStatus};
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db_path(name: &str) -> String {
        let mut path = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        path.push(format!("sequencer-storage-{name}-{unique}.sqlite"));
        path_to_string(path)
    }

    fn path_to_string(path: PathBuf) -> String {
        path.to_string_lossy().into_owned()
    }

    fn open_with_genesis(name: &str) -> Storage {
        let mut storage = Storage::open(&temp_db_path(name), "NORMAL").expect("open storage");
        storage.ensure_genesis(GENESIS_ROOT).expect("ensure genesis");
        storage
    }

    fn sample_draft(seed: u8) -> TxDraft {
        TxDraft {
            sender: Address::from_slice(&[seed; 20]),
            recipient: Address::from_slice(&[seed.wrapping_add(1); 20]),
            value: U256::from(100_u64 * u64::from(seed)),
            payload: Bytes::from(vec![seed]),
            nonce: 0,
        }
    }

    fn seal_one_batch(storage: &mut Storage, seeds: &[u8]) -> crate::storage::SealedBatch {
        for seed in seeds {
            storage
                .add_transaction(&sample_draft(*seed))
                .expect("add transaction");
        }
        let head = storage.chain_head().expect("chain head");
        let pending = storage
            .pending_transactions(seeds.len())
            .expect("pending snapshot");
        let digests: Vec<B256> = pending.iter().map(|record| record.tx_hash).collect();
        let new_root = advance_root(head.root, &digests);
        storage
            .seal_batch(&head, &pending, new_root)
            .expect("seal batch")
    }

    #[test]
    fn genesis_is_written_once_and_validated_after() {
        let db_path = temp_db_path("genesis");
        let mut storage = Storage::open(&db_path, "NORMAL").expect("open storage");

        let head = storage.ensure_genesis(GENESIS_ROOT).expect("first boot");
        assert_eq!(head.height, 0);
        assert_eq!(head.root, GENESIS_ROOT);

        let head = storage.ensure_genesis(GENESIS_ROOT).expect("second boot");
        assert_eq!(head.height, 0);

        let err = storage
            .ensure_genesis(B256::with_last_byte(9))
            .expect_err("configured genesis diverges");
        assert!(matches!(err, LedgerError::GenesisMismatch { .. }));
    }

    #[test]
    fn duplicate_submissions_are_rejected_by_content_hash() {
        let mut storage = open_with_genesis("duplicates");
        let draft = sample_draft(0x11);

        let tx_hash = storage.add_transaction(&draft).expect("first insert");
        assert_eq!(tx_hash, draft.hash());

        let err = storage
            .add_transaction(&draft)
            .expect_err("second insert is a duplicate");
        assert!(
            matches!(err, LedgerError::DuplicateTransaction { tx_hash: dup } if dup == tx_hash)
        );
        assert_eq!(storage.count_pending().expect("count"), 1);
    }

    #[test]
    fn seal_batch_commits_batch_roots_and_accounts_atomically() {
        let mut storage = open_with_genesis("seal");
        let sealed = seal_one_batch(&mut storage, &[0x11, 0x22]);

        assert_eq!(sealed.batch_id, 1);
        assert_eq!(sealed.height, 1);
        assert_eq!(sealed.old_root, GENESIS_ROOT);
        assert_eq!(sealed.tx_digests.len(), 2);

        let head = storage.chain_head().expect("chain head");
        assert_eq!(head.height, 1);
        assert_eq!(head.root, sealed.new_root);
        assert_eq!(storage.count_pending().expect("count"), 0);

        let batch = storage
            .batch(sealed.batch_id)
            .expect("read batch")
            .expect("batch exists");
        assert_eq!(batch.status, BatchStatus::Pending);
        assert_eq!(batch.tx_count, 2);
        assert_eq!(batch.old_state_root, GENESIS_ROOT);
        assert_eq!(batch.new_state_root, sealed.new_root);

        // Recipient of the 0x11 draft was credited, sender nonce advanced.
        let draft = sample_draft(0x11);
        let recipient = storage
            .account(draft.recipient)
            .expect("read recipient")
            .expect("recipient exists");
        assert_eq!(recipient.balance, draft.value);
        let sender = storage
            .account(draft.sender)
            .expect("read sender")
            .expect("sender exists");
        assert_eq!(sender.balance, U256::ZERO);
        assert_eq!(sender.nonce, 1);
    }

    #[test]
    fn seal_batch_rejects_a_stale_chain_head() {
        let mut storage = open_with_genesis("stale-head");
        let stale_head = storage.chain_head().expect("chain head");
        seal_one_batch(&mut storage, &[0x11]);

        storage
            .add_transaction(&sample_draft(0x33))
            .expect("add transaction");
        let pending = storage.pending_transactions(8).expect("pending");
        let digests: Vec<B256> = pending.iter().map(|record| record.tx_hash).collect();
        let new_root = advance_root(stale_head.root, &digests);

        let err = storage
            .seal_batch(&stale_head, &pending, new_root)
            .expect_err("stale head must be rejected");
        assert!(matches!(err, LedgerError::ChainMismatch { .. }));

        // Nothing from the rejected seal is visible.
        assert_eq!(storage.count_pending().expect("count"), 1);
        assert_eq!(storage.chain_head().expect("head").height, 1);
    }

    #[test]
    fn batch_status_walks_the_lifecycle_and_rejects_invalid_steps() {
        let mut storage = open_with_genesis("lifecycle");
        let sealed = seal_one_batch(&mut storage, &[0x11]);
        let proof_hash = B256::with_last_byte(7);

        storage
            .update_batch_status(sealed.batch_id, BatchStatus::Proving, None, None)
            .expect("pending -> proving");
        let proven = storage
            .update_batch_status(sealed.batch_id, BatchStatus::Proven, Some(proof_hash), None)
            .expect("proving -> proven");
        assert_eq!(proven.proof_hash, Some(proof_hash));

        let submitted = storage
            .update_batch_status(
                sealed.batch_id,
                BatchStatus::Submitted,
                None,
                Some("anchor-7"),
            )
            .expect("proven -> submitted");
        assert_eq!(submitted.anchor_tx_ref, Some("anchor-7".to_string()));
        assert_eq!(submitted.proof_hash, Some(proof_hash));

        let confirmed = storage
            .update_batch_status(sealed.batch_id, BatchStatus::Confirmed, None, None)
            .expect("submitted -> confirmed");
        assert_eq!(confirmed.status, BatchStatus::Confirmed);
        // The batch's transactions settled together with the batch.
        assert_eq!(
            sql_count_transactions_with_status(&storage.conn, "confirmed")
                .expect("count confirmed"),
            1
        );

        let err = storage
            .update_batch_status(sealed.batch_id, BatchStatus::Proving, None, None)
            .expect_err("confirmed is terminal");
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: BatchStatus::Confirmed,
                to: BatchStatus::Proving,
                ..
            }
        ));

        let err = storage
            .update_batch_status(999, BatchStatus::Proving, None, None)
            .expect_err("unknown batch");
        assert!(matches!(err, LedgerError::BatchNotFound { batch_id: 999 }));
    }

    #[test]
    fn proofs_round_trip_and_are_unique_per_batch() {
        let mut storage = open_with_genesis("proof-round-trip");
        let sealed = seal_one_batch(&mut storage, &[0x11]);

        let inputs = BatchInputs {
            old_root: sealed.old_root,
            new_root: sealed.new_root,
            tx_digests: sealed.tx_digests.clone(),
        };
        let proof = MockProofEngine::new().generate(&inputs).expect("generate");

        let proof_id = storage
            .save_proof(sealed.batch_id, &proof, true)
            .expect("save proof");
        assert_eq!(proof_id, 1);

        let err = storage
            .save_proof(sealed.batch_id, &proof, true)
            .expect_err("one proof per batch");
        assert!(matches!(err, LedgerError::DuplicateProof { .. }));

        let record = storage
            .proof_for_batch(sealed.batch_id)
            .expect("read proof")
            .expect("proof exists");
        assert_eq!(record.batch_id, sealed.batch_id);
        assert_eq!(record.kind, proof.kind);
        assert_eq!(record.payload, proof.payload);
        assert_eq!(record.public_signals, proof.public_signals);
        assert_eq!(record.proof_hash, proof.hash);
        assert!(record.verified);

        assert!(storage
            .proof_for_batch(sealed.batch_id + 1)
            .expect("missing proof")
            .is_none());
    }

    #[test]
    fn batch_digests_keep_the_sealed_order() {
        let mut storage = open_with_genesis("digest-order");
        let sealed = seal_one_batch(&mut storage, &[0x11, 0x22, 0x33]);

        let digests = storage
            .batch_tx_digests(sealed.batch_id)
            .expect("read digests");
        assert_eq!(digests, sealed.tx_digests);
    }

    #[test]
    fn snapshot_aggregates_pool_batches_and_proofs() {
        let mut storage = open_with_genesis("snapshot");

        // Fresh store: everything zero, head at genesis.
        let snapshot = storage.snapshot().expect("fresh snapshot");
        assert_eq!(snapshot.stats, crate::storage::LedgerStats::default());
        assert_eq!(snapshot.head.height, 0);
        assert_eq!(snapshot.head.root, GENESIS_ROOT);

        let sealed = seal_one_batch(&mut storage, &[0x11]);
        storage
            .add_transaction(&sample_draft(0x44))
            .expect("add pending transaction");
        storage
            .update_batch_status(sealed.batch_id, BatchStatus::Proving, None, None)
            .expect("set proving");
        storage
            .update_batch_status(sealed.batch_id, BatchStatus::Proven, None, None)
            .expect("set proven");

        let snapshot = storage.snapshot().expect("snapshot");
        assert_eq!(snapshot.stats.pending_transactions, 1);
        assert_eq!(snapshot.stats.total_transactions, 2);
        assert_eq!(snapshot.stats.total_batches, 1);
        assert_eq!(snapshot.stats.proven_batches, 1);
        assert_eq!(snapshot.stats.failed_batches, 0);
        assert_eq!(snapshot.head.height, 1);
    }

    #[test]
    fn pending_transactions_report_their_status_and_batch() {
        let mut storage = open_with_genesis("record-fields");
        let draft = sample_draft(0x11);
        storage.add_transaction(&draft).expect("add transaction");

        let pending = storage.pending_transactions(8).expect("pending");
        assert_eq!(pending.len(), 1);
        let record = &pending[0];
        assert_eq!(record.tx_hash, draft.hash());
        assert_eq!(record.sender, draft.sender);
        assert_eq!(record.recipient, draft.recipient);
        assert_eq!(record.value, draft.value);
        assert_eq!(record.payload, draft.payload.to_vec());
        assert_eq!(record.status, TxStatus::Pending);
        assert_eq!(record.batch_id, None);
    }
}
