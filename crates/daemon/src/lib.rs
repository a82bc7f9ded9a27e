// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checking engine daemon library.
//!
//! Exposes the configuration surface and the lifecycle supervisor so
//! embedders can host the pipeline with their own detector
//! implementations.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
mod supervisor;

pub use config::{Config, ConfigError};
pub use supervisor::{LifecycleError, Supervisor, WorkerQueue, WorkerSpec};
