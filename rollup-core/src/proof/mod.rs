// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

mod mock;
mod zk;

use alloy_primitives::{keccak256, B256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use mock::MockProofEngine;
pub use zk::ZkProofEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofKind {
    Mock,
    Zk,
}

impl ProofKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Zk => "plonky2",
        }
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown proof kind: {0}")]
pub struct ParseProofKindError(String);

impl FromStr for ProofKind {
    type Err = ParseProofKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mock" => Ok(Self::Mock),
            "zk" | "plonky2" => Ok(Self::Zk),
            other => Err(ParseProofKindError(other.to_string())),
        }
    }
}

// Everything an engine needs to attest to one batch transition. Digests are
// in batch order; the transition binds to that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInputs {
    pub old_root: B256,
    pub new_root: B256,
    pub tx_digests: Vec<B256>,
}

impl BatchInputs {
    pub fn tx_count(&self) -> u32 {
        self.tx_digests.len() as u32
    }

    pub fn batch_digest(&self) -> B256 {
        let mut preimage = Vec::with_capacity(32 * self.tx_digests.len());
        for digest in &self.tx_digests {
            preimage.extend_from_slice(digest.as_slice());
        }
        keccak256(&preimage)
    }

    // Signal layout every engine exposes: old root, new root, tx count.
    pub fn expected_signals(&self) -> Vec<String> {
        vec![
            format!("{:#x}", self.old_root),
            format!("{:#x}", self.new_root),
            self.tx_count().to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub kind: ProofKind,
    pub payload: Vec<u8>,
    pub public_signals: Vec<String>,
    pub hash: B256,
    pub generation_time_ms: u64,
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("circuit artifacts not available")]
    CircuitNotReady,
    #[error("witness: {reason}")]
    Witness { reason: String },
    #[error("prover: {reason}")]
    Prover { reason: String },
    #[error("proof serialization: {reason}")]
    Serialization { reason: String },
}

pub trait ProofEngine: Send {
    fn kind(&self) -> ProofKind;

    fn generate(&self, inputs: &BatchInputs) -> Result<Proof, ProofError>;

    // Ok(false) for any proof that does not attest to `inputs`; Err is
    // reserved for an engine that cannot verify at all.
    fn verify(&self, proof: &Proof, inputs: &BatchInputs) -> Result<bool, ProofError>;
}

#[cfg(test)]
mod tests {
    use super::{BatchInputs, ProofKind};
    use alloy_primitives::B256;

    fn inputs() -> BatchInputs {
        BatchInputs {
            old_root: B256::with_last_byte(1),
            new_root: B256::with_last_byte(2),
            tx_digests: vec![B256::with_last_byte(3), B256::with_last_byte(4)],
        }
    }

    #[test]
    fn signals_restate_roots_and_count() {
        let signals = inputs().expected_signals();
        assert_eq!(signals.len(), 3);
        assert!(signals[0].starts_with("0x"));
        assert!(signals[0].ends_with("01"));
        assert!(signals[1].ends_with("02"));
        assert_eq!(signals[2], "2");
    }

    #[test]
    fn batch_digest_is_order_sensitive() {
        let forward = inputs();
        let mut reversed = inputs();
        reversed.tx_digests.reverse();
        assert_ne!(forward.batch_digest(), reversed.batch_digest());
    }

    #[test]
    fn kind_round_trips_and_accepts_the_short_alias() {
        assert_eq!("mock".parse::<ProofKind>(), Ok(ProofKind::Mock));
        assert_eq!("plonky2".parse::<ProofKind>(), Ok(ProofKind::Zk));
        assert_eq!("zk".parse::<ProofKind>(), Ok(ProofKind::Zk));
        assert!("groth16".parse::<ProofKind>().is_err());
        assert_eq!(ProofKind::Zk.as_str(), "plonky2");
    }
}
