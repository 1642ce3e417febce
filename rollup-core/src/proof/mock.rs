// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::proof::{BatchInputs, Proof, ProofEngine, ProofError, ProofKind};

// Deterministic stand-in for a real prover: the payload is a signed-nothing
// attestation of the transition, verification recomputes and compares it.
#[derive(Debug, Default)]
pub struct MockProofEngine;

impl MockProofEngine {
    pub fn new() -> Self {
        Self
    }

    fn attestation(inputs: &BatchInputs) -> MockAttestation {
        MockAttestation {
            old_root: format!("{:#x}", inputs.old_root),
            new_root: format!("{:#x}", inputs.new_root),
            tx_count: inputs.tx_count(),
            batch_digest: format!("{:#x}", inputs.batch_digest()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct MockAttestation {
    old_root: String,
    new_root: String,
    tx_count: u32,
    batch_digest: String,
}

impl ProofEngine for MockProofEngine {
    fn kind(&self) -> ProofKind {
        ProofKind::Mock
    }

    fn generate(&self, inputs: &BatchInputs) -> Result<Proof, ProofError> {
        let started = Instant::now();
        let payload = serde_json::to_vec(&Self::attestation(inputs)).map_err(|e| {
            ProofError::Serialization {
                reason: e.to_string(),
            }
        })?;

        Ok(Proof {
            kind: ProofKind::Mock,
            hash: keccak256(&payload),
            public_signals: inputs.expected_signals(),
            payload,
            generation_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn verify(&self, proof: &Proof, inputs: &BatchInputs) -> Result<bool, ProofError> {
        if proof.kind != ProofKind::Mock {
            return Ok(false);
        }
        if proof.hash != keccak256(&proof.payload) {
            return Ok(false);
        }
        if proof.public_signals != inputs.expected_signals() {
            return Ok(false);
        }

        let attestation: MockAttestation = match serde_json::from_slice(&proof.payload) {
            Ok(a) => a,
            Err(_) => return Ok(false),
        };
        Ok(attestation == Self::attestation(inputs))
    }
}
