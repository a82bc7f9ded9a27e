// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The asynchronous checking pipeline.
//!
//! Execution records fan out into detection tasks, workers run detectors
//! against them, and responses correlate back to the originating rows.
//! Every consumer here is a [`vigil_broker::Handler`]: it takes raw bytes,
//! owns one delivery start to finish, and returns a disposition, so no
//! error ever escapes a consumer loop. Idempotent store writes and CAS
//! status transitions stand in for ordering guarantees.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod dispatcher;
mod ingest;
mod planner;
mod results;
mod worker;

pub use dispatcher::{DispatchError, Dispatcher};
pub use ingest::IngestionConsumer;
pub use planner::plan;
pub use results::ResultConsumer;
pub use worker::{DetectError, Detector, Observation, Worker, WorkerConfig};

#[cfg(any(test, feature = "test-support"))]
pub use worker::FakeDetector;
