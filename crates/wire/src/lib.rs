// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task envelope codec for broker messages.
//!
//! Wire format: JSON payloads with canonical RFC 3339 UTC timestamps at
//! microsecond precision. Four shapes cross the broker: execution records
//! from the upstream producer, api/agent tasks to workers, and detection
//! responses back from workers. This crate is the only place raw broker
//! bytes are parsed or produced.
//!
//! Inbound decoding is forward-compatible: unknown fields are ignored.
//! Outbound encoding never emits unknown fields.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod record;
mod response;
mod task;
pub mod timestamp;

pub use codec::{
    decode_record, decode_response, decode_task, encode_record, encode_response, encode_task,
    WireError, ROUTE_AGENT_RESPONSE, ROUTE_AGENT_TASK, ROUTE_API_RESPONSE, ROUTE_API_TASK,
};
pub use record::{Detections, ExecutionBody, ExecutionRecord, OperationHeader};
pub use response::DetectionResponse;
pub use task::DetectionTask;
