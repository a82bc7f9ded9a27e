// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker connection settings.

use std::time::Duration;

/// Connection roles. Each role gets its own credentials (and therefore
/// its own broker-side permissions) and at most one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Ingestion,
    Dispatcher,
    Worker,
    Results,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Ingestion => "ingestion",
            Role::Dispatcher => "dispatcher",
            Role::Worker => "worker",
            Role::Results => "results",
        })
    }
}

/// Per-role broker credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

/// Optional queue policy arguments applied at declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuePolicy {
    /// `x-message-ttl`, milliseconds.
    pub message_ttl_ms: Option<u32>,
    /// `x-max-length`.
    pub max_length: Option<u32>,
}

/// Where rejected messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRoute {
    pub exchange: String,
    pub routing_key: String,
}

impl Default for DeadLetterRoute {
    fn default() -> Self {
        Self {
            exchange: crate::topology::DEAD_LETTER_EXCHANGE.to_string(),
            routing_key: crate::topology::DEAD_LETTER_ROUTING_KEY.to_string(),
        }
    }
}

/// Process-level broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub ingestion: Credentials,
    pub dispatcher: Credentials,
    pub worker: Credentials,
    pub results: Credentials,
    /// Bounded in-flight window per consumer.
    pub prefetch: u16,
    pub publish_timeout: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub queue_policy: QueuePolicy,
    pub dead_letter: DeadLetterRoute,
}

impl BrokerSettings {
    pub fn credentials(&self, role: Role) -> &Credentials {
        match role {
            Role::Ingestion => &self.ingestion,
            Role::Dispatcher => &self.dispatcher,
            Role::Worker => &self.worker,
            Role::Results => &self.results,
        }
    }

    /// AMQP URI for a role. Credentials and vhost are percent-encoded.
    pub fn amqp_uri(&self, role: Role) -> String {
        let creds = self.credentials(role);
        format!(
            "amqp://{}:{}@{}:{}/{}",
            percent_encode(&creds.user),
            percent_encode(&creds.pass),
            self.host,
            self.port,
            percent_encode(&self.vhost),
        )
    }
}

/// Percent-encode everything outside RFC 3986 unreserved characters.
fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
