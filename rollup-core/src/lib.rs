// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

//! Domain model shared by the sequencer: transactions, batches, the state
//! root chain and the proof engines that attest to batch transitions.

pub mod batch;
pub mod proof;
pub mod state;
pub mod tx;
