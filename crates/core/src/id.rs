// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes.
//!
//! Every identifier in the system is a 128-bit UUID. The newtypes exist so
//! a `TaskId` can never be handed to a function expecting a `LinkId`; they
//! serialize transparently as plain UUID strings.

/// Define a newtype ID wrapper around [`uuid::Uuid`].
///
/// Generates `new()` for random v4 generation, `from_uuid()`/`as_uuid()`,
/// `short()` for log-friendly truncation, `Display`, `FromStr`,
/// `From<Uuid>`, and serde-transparent impls.
///
/// ```ignore
/// define_uuid_id! {
///     /// Doc comment for the ID type.
///     pub struct TaskId;
/// }
/// ```
#[macro_export]
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random (v4) ID.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(id: uuid::Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }

            /// First segment of the hyphenated form, for log lines.
            pub fn short(&self) -> String {
                let s = self.0.to_string();
                s.split('-').next().unwrap_or(&s).to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> uuid::Uuid {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_uuid_id! {
    /// External identifier of an upstream emulation campaign.
    ///
    /// Supplied by the producer; the unique key every execution references.
    pub struct OperationId;
}

define_uuid_id! {
    /// Internal identifier of one stored execution row.
    pub struct ExecutionId;
}

define_uuid_id! {
    /// Upstream identifier of one command result, unique per operation.
    pub struct LinkId;
}

define_uuid_id! {
    /// Internal identifier of one planned detection attempt.
    pub struct DetectionExecutionId;
}

define_uuid_id! {
    /// Internal identifier of one appended detection result.
    pub struct DetectionResultId;
}

define_uuid_id! {
    /// Identifier of a single task message on the broker.
    pub struct TaskId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
