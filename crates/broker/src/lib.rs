// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed publish/consume over a topic-routed AMQP broker.
//!
//! One connection per role, one channel per consumer/producer. All
//! messages are published persistent; consumers use manual acknowledgement
//! with bounded prefetch and ack only after the owning database
//! transaction has committed. On disconnect the client reconnects with
//! bounded exponential backoff and re-declares topology idempotently.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod backoff;
mod client;
mod config;
mod consume;
mod error;
#[cfg(any(test, feature = "test-support"))]
mod fake;
mod publish;
pub mod topology;

pub use backoff::Backoff;
pub use client::Broker;
pub use config::{BrokerSettings, Credentials, DeadLetterRoute, QueuePolicy, Role};
pub use consume::{delivery_attempts, run_consumer, ConsumeOptions, Disposition, Handler};
pub use error::BrokerError;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeDeadLetter, FakePublisher};
pub use publish::{DeadLetterSink, LapinDeadLetter, LapinPublisher, Publisher};
