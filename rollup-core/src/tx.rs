// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDraft {
    pub sender: Address,
    pub recipient: Address,
    pub value: U256,
    pub payload: Bytes,
    pub nonce: u64,
}

impl TxDraft {
    // Fixed-width fields go first so the trailing variable-length payload
    // cannot collide with another encoding.
    pub fn hash(&self) -> B256 {
        let mut preimage = Vec::with_capacity(20 + 20 + 32 + 8 + self.payload.len());
        preimage.extend_from_slice(self.sender.as_slice());
        preimage.extend_from_slice(self.recipient.as_slice());
        preimage.extend_from_slice(&self.value.to_be_bytes::<32>());
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        preimage.extend_from_slice(&self.payload);
        keccak256(&preimage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Batched,
    /// Set when the batch carrying the transaction is confirmed on the
    /// anchor chain.
    Confirmed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Batched => "batched",
            Self::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transaction status: {0}")]
pub struct ParseTxStatusError(String);

impl FromStr for TxStatus {
    type Err = ParseTxStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "batched" => Ok(Self::Batched),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(ParseTxStatusError(other.to_string())),
        }
    }
}
