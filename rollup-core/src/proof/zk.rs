// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

use alloy_primitives::{keccak256, B256};
use std::time::Instant;
use tracing::debug;

use plonky2::{
    field::goldilocks_field::GoldilocksField,
    field::types::{Field, PrimeField64},
    hash::{hash_types::HashOutTarget, poseidon::PoseidonHash},
    iop::{
        target::Target,
        witness::{PartialWitness, WitnessWrite},
    },
    plonk::{
        circuit_builder::CircuitBuilder,
        circuit_data::{CircuitConfig, CircuitData},
        config::{Hasher, PoseidonGoldilocksConfig},
        proof::ProofWithPublicInputs,
    },
};

use crate::proof::{BatchInputs, Proof, ProofEngine, ProofError, ProofKind};

const D: usize = 2;
type C = PoseidonGoldilocksConfig;
type F = GoldilocksField;

// A 32-byte root enters the circuit as 8 big-endian u32 limbs; u32 values
// are always canonical Goldilocks elements.
const ROOT_LIMBS: usize = 8;

// Public input layout, in registration order.
const OLD_ROOT_OFFSET: usize = 0;
const NEW_ROOT_OFFSET: usize = ROOT_LIMBS;
const TX_COUNT_OFFSET: usize = 2 * ROOT_LIMBS;
const COMMITMENT_OFFSET: usize = 2 * ROOT_LIMBS + 1;
const PUBLIC_INPUTS: usize = COMMITMENT_OFFSET + 4;

struct BatchTargets {
    old_root: [Target; ROOT_LIMBS],
    new_root: [Target; ROOT_LIMBS],
    tx_count: Target,
    // Private witness; the public commitment binds the proof to it.
    batch_digest: [Target; ROOT_LIMBS],
}

struct CircuitArtifacts {
    data: CircuitData<F, C, D>,
    targets: BatchTargets,
}

// Proves knowledge of a batch digest whose Poseidon commitment together
// with the old root, new root and tx count matches the public inputs.
pub struct ZkProofEngine {
    artifacts: Option<CircuitArtifacts>,
}

impl ZkProofEngine {
    pub fn compile() -> Self {
        let started = Instant::now();
        let config = CircuitConfig::standard_recursion_config();
        let mut builder = CircuitBuilder::<F, D>::new(config);

        let old_root: [Target; ROOT_LIMBS] =
            std::array::from_fn(|_| builder.add_virtual_public_input());
        let new_root: [Target; ROOT_LIMBS] =
            std::array::from_fn(|_| builder.add_virtual_public_input());
        let tx_count = builder.add_virtual_public_input();
        let batch_digest: [Target; ROOT_LIMBS] =
            std::array::from_fn(|_| builder.add_virtual_target());

        let commitment = builder
            .hash_n_to_hash_no_pad::<PoseidonHash>(commitment_preimage_targets(
                &old_root,
                &new_root,
                tx_count,
                &batch_digest,
            ));
        builder.register_public_inputs(&commitment.elements);

        let data = builder.build::<C>();
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            public_inputs = PUBLIC_INPUTS,
            "batch transition circuit compiled"
        );

        Self {
            artifacts: Some(CircuitArtifacts {
                data,
                targets: BatchTargets {
                    old_root,
                    new_root,
                    tx_count,
                    batch_digest,
                },
            }),
        }
    }

    // An engine whose circuit artifacts were never produced; every prove or
    // verify call reports CircuitNotReady.
    pub fn without_artifacts() -> Self {
        Self { artifacts: None }
    }

    pub fn is_ready(&self) -> bool {
        self.artifacts.is_some()
    }
}

fn commitment_preimage_targets(
    old_root: &[Target; ROOT_LIMBS],
    new_root: &[Target; ROOT_LIMBS],
    tx_count: Target,
    batch_digest: &[Target; ROOT_LIMBS],
) -> Vec<Target> {
    let mut preimage = Vec::with_capacity(3 * ROOT_LIMBS + 1);
    preimage.extend_from_slice(old_root);
    preimage.extend_from_slice(new_root);
    preimage.push(tx_count);
    preimage.extend_from_slice(batch_digest);
    preimage
}

fn root_limbs(root: &B256) -> [u32; ROOT_LIMBS] {
    let bytes = root.as_slice();
    std::array::from_fn(|i| {
        u32::from_be_bytes([
            bytes[4 * i],
            bytes[4 * i + 1],
            bytes[4 * i + 2],
            bytes[4 * i + 3],
        ])
    })
}

// old root limbs, new root limbs, tx count; matches registration order.
fn expected_scalar_inputs(inputs: &BatchInputs) -> Vec<u64> {
    let mut values = Vec::with_capacity(TX_COUNT_OFFSET + 1);
    values.extend(root_limbs(&inputs.old_root).map(u64::from));
    values.extend(root_limbs(&inputs.new_root).map(u64::from));
    values.push(u64::from(inputs.tx_count()));
    values
}

fn expected_commitment(inputs: &BatchInputs) -> [F; 4] {
    let mut preimage = Vec::with_capacity(3 * ROOT_LIMBS + 1);
    preimage.extend(root_limbs(&inputs.old_root).map(F::from_canonical_u32));
    preimage.extend(root_limbs(&inputs.new_root).map(F::from_canonical_u32));
    preimage.push(F::from_canonical_u32(inputs.tx_count()));
    preimage.extend(root_limbs(&inputs.batch_digest()).map(F::from_canonical_u32));
    PoseidonHash::hash_no_pad(&preimage).elements
}

impl ProofEngine for ZkProofEngine {
    fn kind(&self) -> ProofKind {
        ProofKind::Zk
    }

    fn generate(&self, inputs: &BatchInputs) -> Result<Proof, ProofError> {
        let artifacts = self.artifacts.as_ref().ok_or(ProofError::CircuitNotReady)?;
        let started = Instant::now();

        let mut pw = PartialWitness::<F>::new();
        let targets = &artifacts.targets;
        let mut assign = |target: Target, limb: u32| {
            pw.set_target(target, F::from_canonical_u32(limb))
                .map_err(|e| ProofError::Witness {
                    reason: e.to_string(),
                })
        };
        for (target, limb) in targets.old_root.iter().zip(root_limbs(&inputs.old_root)) {
            assign(*target, limb)?;
        }
        for (target, limb) in targets.new_root.iter().zip(root_limbs(&inputs.new_root)) {
            assign(*target, limb)?;
        }
        assign(targets.tx_count, inputs.tx_count())?;
        for (target, limb) in targets
            .batch_digest
            .iter()
            .zip(root_limbs(&inputs.batch_digest()))
        {
            assign(*target, limb)?;
        }
        drop(assign);

        let proof = artifacts.data.prove(pw).map_err(|e| ProofError::Prover {
            reason: e.to_string(),
        })?;
        let payload = bincode::serialize(&proof).map_err(|e| ProofError::Serialization {
            reason: e.to_string(),
        })?;

        Ok(Proof {
            kind: ProofKind::Zk,
            hash: keccak256(&payload),
            public_signals: inputs.expected_signals(),
            payload,
            generation_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn verify(&self, proof: &Proof, inputs: &BatchInputs) -> Result<bool, ProofError> {
        let artifacts = self.artifacts.as_ref().ok_or(ProofError::CircuitNotReady)?;

        if proof.kind != ProofKind::Zk {
            return Ok(false);
        }
        if proof.hash != keccak256(&proof.payload) {
            return Ok(false);
        }
        if proof.public_signals != inputs.expected_signals() {
            return Ok(false);
        }

        let decoded: ProofWithPublicInputs<F, C, D> = match bincode::deserialize(&proof.payload) {
            Ok(decoded) => decoded,
            Err(_) => return Ok(false),
        };
        if decoded.public_inputs.len() != PUBLIC_INPUTS {
            return Ok(false);
        }

        let scalars: Vec<u64> = decoded.public_inputs[..COMMITMENT_OFFSET]
            .iter()
            .map(|f| f.to_canonical_u64())
            .collect();
        if scalars != expected_scalar_inputs(inputs) {
            return Ok(false);
        }
        if decoded.public_inputs[COMMITMENT_OFFSET..] != expected_commitment(inputs) {
            return Ok(false);
        }

        Ok(artifacts.data.verify(decoded).is_ok())
    }
}
