// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical timestamp serialization.
//!
//! Outbound messages always carry RFC 3339 UTC with exactly microsecond
//! precision (`2026-03-01T12:00:00.000000Z`); inbound parsing accepts any
//! RFC 3339 offset and normalizes to UTC.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn to_canonical(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&to_canonical(dt))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))?;
    Ok(parsed.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "timestamp_tests.rs"]
mod tests;
