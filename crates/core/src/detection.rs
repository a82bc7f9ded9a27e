// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Detection task taxonomy and state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error for string conversions of the enums in this module.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Where a detection task runs.
///
/// `Api` tasks go to SIEM/EDR API workers; the OS variants go to host
/// agent workers. Variants are declared alphabetically so the derived
/// `Ord` matches lexicographic ordering of the wire names, which the
/// planner relies on for deterministic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionType {
    Api,
    Darwin,
    Linux,
    Windows,
}

impl DetectionType {
    pub const ALL: [DetectionType; 4] = [
        DetectionType::Api,
        DetectionType::Darwin,
        DetectionType::Linux,
        DetectionType::Windows,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionType::Api => "api",
            DetectionType::Darwin => "darwin",
            DetectionType::Linux => "linux",
            DetectionType::Windows => "windows",
        }
    }

    /// True for task types consumed from the agent task queue.
    pub fn is_agent(&self) -> bool {
        !matches!(self, DetectionType::Api)
    }
}

impl std::str::FromStr for DetectionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(DetectionType::Api),
            "darwin" => Ok(DetectionType::Darwin),
            "linux" => Ok(DetectionType::Linux),
            "windows" => Ok(DetectionType::Windows),
            other => Err(ParseEnumError { kind: "detection type", value: other.to_string() }),
        }
    }
}

crate::simple_display! {
    DetectionType {
        Api => "api",
        Darwin => "darwin",
        Linux => "linux",
        Windows => "windows",
    }
}

/// Status of a detection execution.
///
/// `pending → running → {completed, failed}` or `pending → cancelled`.
/// Terminal states are sticky: the store's CAS transition is the only
/// mutation path and refuses to leave a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl DetectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStatus::Pending => "pending",
            DetectionStatus::Running => "running",
            DetectionStatus::Completed => "completed",
            DetectionStatus::Failed => "failed",
            DetectionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DetectionStatus::Completed | DetectionStatus::Failed | DetectionStatus::Cancelled
        )
    }
}

impl std::str::FromStr for DetectionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DetectionStatus::Pending),
            "running" => Ok(DetectionStatus::Running),
            "completed" => Ok(DetectionStatus::Completed),
            "failed" => Ok(DetectionStatus::Failed),
            "cancelled" => Ok(DetectionStatus::Cancelled),
            other => Err(ParseEnumError { kind: "detection status", value: other.to_string() }),
        }
    }
}

crate::simple_display! {
    DetectionStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// How a worker's detection attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Error,
    Timeout,
}

impl Outcome {
    /// The terminal status this outcome maps the owning detection
    /// execution to. `detected = false` does not imply failure; only the
    /// outcome decides.
    pub fn terminal_status(&self) -> DetectionStatus {
        match self {
            Outcome::Ok => DetectionStatus::Completed,
            Outcome::Error | Outcome::Timeout => DetectionStatus::Failed,
        }
    }
}

crate::simple_display! {
    Outcome {
        Ok => "ok",
        Error => "error",
        Timeout => "timeout",
    }
}

/// Tri-state detection verdict.
///
/// On the wire this is `true`, `false`, or `null` (unknown); in the store
/// it is a nullable boolean. Anything else is rejected by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detected {
    Yes,
    No,
    Unknown,
}

impl Detected {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Detected::Yes => Some(true),
            Detected::No => Some(false),
            Detected::Unknown => None,
        }
    }

    pub fn from_bool(value: Option<bool>) -> Self {
        match value {
            Some(true) => Detected::Yes,
            Some(false) => Detected::No,
            None => Detected::Unknown,
        }
    }
}

impl Serialize for Detected {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self.as_bool() {
            Some(b) => serializer.serialize_bool(b),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Detected {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Option::<bool>::deserialize(deserializer)?;
        Ok(Detected::from_bool(value))
    }
}

crate::simple_display! {
    Detected {
        Yes => "true",
        No => "false",
        Unknown => "unknown",
    }
}

#[cfg(test)]
#[path = "detection_tests.rs"]
mod tests;
