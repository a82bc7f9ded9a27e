// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error taxonomy.

use thiserror::Error;
use vigil_core::DetectionStatus;

/// Errors surfaced by the store gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: uuid::Uuid },

    /// CAS transition failed: the row is not in any of the expected states.
    /// Carries the state actually observed so callers can tell a tolerated
    /// duplicate (already terminal) from a logic bug.
    #[error("detection execution {id} is {actual}, not in the expected source states")]
    Conflict { id: uuid::Uuid, actual: DetectionStatus },

    /// A domain invariant was violated (unique, foreign-key, or check
    /// constraint rejected the write).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Connectivity or timeout; safe to retry after broker redelivery.
    #[error("transient store failure: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Classify a sqlx error into the gateway taxonomy.
    pub(crate) fn from_sqlx(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => {
                // 23xxx: integrity constraint violation class.
                match db.code().as_deref() {
                    Some(code) if code.starts_with("23") => {
                        StoreError::Constraint(db.message().to_string())
                    }
                    _ => StoreError::Transient(e.to_string()),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Transient(e.to_string()),
            _ => StoreError::Transient(e.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
