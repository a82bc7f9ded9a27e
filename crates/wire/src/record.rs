// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution record: the message the upstream emulation tool publishes
//! for every command one of its agents ran.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vigil_core::{DetectionType, LinkId, OperationId, ResultData};

/// The campaign the execution belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHeader {
    pub id: OperationId,
    pub name: String,
    #[serde(with = "crate::timestamp")]
    pub started_at: DateTime<Utc>,
}

/// The command result itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBody {
    pub link_id: LinkId,
    pub agent_host: String,
    pub agent_paw: String,
    pub command: String,
    pub pid: i64,
    pub status: i32,
    pub result_data: ResultData,
    #[serde(with = "crate::timestamp")]
    pub agent_reported_at: DateTime<Utc>,
    pub link_state: String,
}

/// Two-level detection request map: `{type: {platform: config}}`.
///
/// BTreeMaps keep iteration deterministic, so a replayed record plans the
/// same task sequence.
pub type Detections = BTreeMap<DetectionType, BTreeMap<String, Value>>;

/// One adversary-emulation execution, with the detections requested for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub operation: OperationHeader,
    pub execution: ExecutionBody,
    /// Empty or missing means a valid execution with no detection tasks.
    #[serde(default)]
    pub detections: Detections,
    /// Original producer payload, carried through opaquely for audit.
    #[serde(default)]
    pub raw_message: Value,
}
