// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

//! Rollup sequencer with a batching pipeline and proof-backed state roots.
//!
//! Flow: API -> batch lane -> SQLite -> proof lane -> anchor.
//! The batch lane is the single writer that defines transaction order.
pub mod anchor;
pub mod api;
pub mod batch_lane;
pub mod events;
pub mod prover;
pub mod storage;
