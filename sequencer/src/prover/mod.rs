// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

mod worker;

pub use worker::{ProofJob, ProofLane, ProofLaneError, ProofLaneStop};
