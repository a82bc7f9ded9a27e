// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encode/decode entry points and routing keys.

use serde::Serialize;
use thiserror::Error;

use crate::record::ExecutionRecord;
use crate::response::DetectionResponse;
use crate::task::DetectionTask;

// Routing keys for dispatcher tasks and worker responses. Part of the
// wire contract, alongside the envelope shapes.
pub const ROUTE_API_TASK: &str = "checking.api.task";
pub const ROUTE_AGENT_TASK: &str = "checking.agent.task";
pub const ROUTE_API_RESPONSE: &str = "checking.api.response";
pub const ROUTE_AGENT_RESPONSE: &str = "checking.agent.response";

/// Codec errors
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload failed to parse as the named shape. Not retriable; the
    /// consumer dead-letters the original bytes.
    #[error("malformed {shape} payload: {source}")]
    Malformed {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An outbound envelope failed to serialize. Indicates a programming
    /// error in envelope construction, not bad input.
    #[error("failed to encode {shape}: {source}")]
    Encode {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn decode<T: serde::de::DeserializeOwned>(
    shape: &'static str,
    payload: &[u8],
) -> Result<T, WireError> {
    serde_json::from_slice(payload).map_err(|source| WireError::Malformed { shape, source })
}

fn encode<T: Serialize>(shape: &'static str, value: &T) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(value).map_err(|source| WireError::Encode { shape, source })
}

pub fn decode_record(payload: &[u8]) -> Result<ExecutionRecord, WireError> {
    decode("execution-record", payload)
}

pub fn decode_task(payload: &[u8]) -> Result<DetectionTask, WireError> {
    decode("detection-task", payload)
}

pub fn decode_response(payload: &[u8]) -> Result<DetectionResponse, WireError> {
    decode("detection-response", payload)
}

pub fn encode_record(record: &ExecutionRecord) -> Result<Vec<u8>, WireError> {
    encode("execution-record", record)
}

pub fn encode_task(task: &DetectionTask) -> Result<Vec<u8>, WireError> {
    encode("detection-task", task)
}

pub fn encode_response(response: &DetectionResponse) -> Result<Vec<u8>, WireError> {
    encode("detection-response", response)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
