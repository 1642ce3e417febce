// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Lifecycle of a sealed batch. Failed and Confirmed are terminal; a failed
// batch keeps its transactions, they are never returned to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Proving,
    Proven,
    Failed,
    Submitted,
    Confirmed,
}

impl BatchStatus {
    pub fn can_advance_to(&self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Proving)
                | (Self::Proving, Self::Proven)
                | (Self::Proving, Self::Failed)
                | (Self::Proven, Self::Submitted)
                | (Self::Submitted, Self::Confirmed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Proving => "proving",
            Self::Proven => "proven",
            Self::Failed => "failed",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown batch status: {0}")]
pub struct ParseBatchStatusError(String);

impl FromStr for BatchStatus {
    type Err = ParseBatchStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "proving" => Ok(Self::Proving),
            "proven" => Ok(Self::Proven),
            "failed" => Ok(Self::Failed),
            "submitted" => Ok(Self::Submitted),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(ParseBatchStatusError(other.to_string())),
        }
    }
}
