// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store gateway: repository-style access to the four durable entities.
//!
//! All mutating operations run inside a single database transaction per
//! logical event; idempotent upserts and CAS status transitions make the
//! at-least-once broker contract safe. The Postgres implementation lives
//! in [`pg`]; [`MemStore`] mirrors its semantics for tests.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod gateway;
#[cfg(any(test, feature = "test-support"))]
mod mem;
pub mod pg;

pub use error::StoreError;
pub use gateway::{IngestOutcome, RecordOutcome, StoreGateway, TimeWindow};
#[cfg(any(test, feature = "test-support"))]
pub use mem::MemStore;
pub use pg::PgStore;
