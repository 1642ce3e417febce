// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use crate::storage::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchLaneError {
    #[error("batch lane input channel closed")]
    ChannelClosed,
    #[error("batch lane shutdown requested")]
    ShutdownRequested,
    #[error("proof lane disconnected")]
    ProofLaneClosed,
    #[error("cannot load chain head")]
    LoadChainHead {
        #[source]
        source: rusqlite::Error,
    },
    #[error("cannot load pending transactions")]
    LoadPendingTransactions {
        #[source]
        source: rusqlite::Error,
    },
    #[error("cannot count pending transactions")]
    CountPendingTransactions {
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to persist submitted transaction")]
    SubmitTransaction {
        #[source]
        source: LedgerError,
    },
    #[error("failed to seal batch")]
    SealBatch {
        #[source]
        source: LedgerError,
    },
    #[error("startup batch recovery failed")]
    Recovery {
        #[source]
        source: rusqlite::Error,
    },
}
