// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker error taxonomy. Everything here is transient from the
//! pipeline's point of view: the caller nacks and lets redelivery retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connect failed: {0}")]
    Connect(#[source] lapin::Error),

    #[error("channel open failed: {0}")]
    Channel(#[source] lapin::Error),

    #[error("topology declaration failed: {0}")]
    Topology(#[source] lapin::Error),

    #[error("publish failed: {0}")]
    Publish(#[source] lapin::Error),

    #[error("broker did not confirm publish to {routing_key}")]
    Unconfirmed { routing_key: String },

    #[error("{operation} exceeded its timeout")]
    Timeout { operation: &'static str },

    #[error("consume failed: {0}")]
    Consume(#[source] lapin::Error),

    #[error("shutting down")]
    ShuttingDown,
}
