// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

mod client;
mod worker;

pub use client::{AnchorClient, AnchorError, AnchorReceipt, MemoryAnchor};
pub use worker::{AnchorWorker, AnchorWorkerConfig, AnchorWorkerError, AnchorWorkerStop};
