// (c) The rollup-sequencer authors
// SPDX-License-Identifier: Apache-2.0

mod error;
mod lane;
mod profiling;
mod types;

pub use error::BatchLaneError;
pub use lane::{BatchLane, BatchLaneConfig, BatchLaneStop};
pub use types::{
    BatchLaneInput, PendingSubmission, SequencerError, SubmitOutcome, TriggerRequest,
};
