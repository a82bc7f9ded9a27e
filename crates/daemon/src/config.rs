// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process configuration, loaded from the environment and validated at
//! startup.

use std::time::Duration;

use thiserror::Error;

use vigil_broker::{BrokerSettings, Credentials, DeadLetterRoute, QueuePolicy};

use crate::env;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {name}")]
    Missing { name: &'static str },

    #[error("environment variable {name} has unusable value {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("configuration rejected: {0}")]
    Policy(String),
}

/// Worker-pool tuning shared by every worker the daemon hosts.
#[derive(Debug, Clone)]
pub struct WorkerTuning {
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub retry_delay: Duration,
    pub detector_timeout: Duration,
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerSettings,
    pub database_url: String,
    pub db_pool_min: u32,
    pub db_pool_max: u32,
    /// Per-transaction budget in the store gateway.
    pub db_timeout: Duration,
    /// Bounded in-process pool per consumer.
    pub pool_size: usize,
    pub worker: WorkerTuning,
    /// Default detection retry budget handed to the planner.
    pub default_max_retries: i32,
    pub shutdown_grace: Duration,
    /// Broker-enforced ack deadline; checked against the worst-case
    /// worker timeline below.
    pub ack_deadline: Duration,
    pub poison_threshold: u32,
}

fn role_credentials(
    user_var: &'static str,
    pass_var: &'static str,
) -> Result<Credentials, ConfigError> {
    Ok(Credentials { user: env::required(user_var)?, pass: env::required(pass_var)? })
}

impl Config {
    /// Load and validate. Fails fast on missing credentials, unparsable
    /// values, or a rejected timing policy.
    pub fn load() -> Result<Self, ConfigError> {
        let broker = BrokerSettings {
            host: env::string_or("VIGIL_AMQP_HOST", "localhost"),
            port: env::parsed_or("VIGIL_AMQP_PORT", 5672)?,
            vhost: env::string_or("VIGIL_AMQP_VHOST", "/"),
            ingestion: role_credentials("VIGIL_AMQP_INGEST_USER", "VIGIL_AMQP_INGEST_PASS")?,
            dispatcher: role_credentials("VIGIL_AMQP_DISPATCH_USER", "VIGIL_AMQP_DISPATCH_PASS")?,
            worker: role_credentials("VIGIL_AMQP_WORKER_USER", "VIGIL_AMQP_WORKER_PASS")?,
            results: role_credentials("VIGIL_AMQP_RESULTS_USER", "VIGIL_AMQP_RESULTS_PASS")?,
            prefetch: env::parsed_or("VIGIL_PREFETCH", 16)?,
            publish_timeout: env::millis_or("VIGIL_PUBLISH_TIMEOUT_MS", Duration::from_secs(5))?,
            reconnect_min: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            queue_policy: QueuePolicy {
                message_ttl_ms: env::parsed_opt("VIGIL_MESSAGE_TTL_MS")?,
                max_length: env::parsed_opt("VIGIL_QUEUE_MAX_LENGTH")?,
            },
            dead_letter: DeadLetterRoute {
                exchange: env::string_or(
                    "VIGIL_DEAD_LETTER_EXCHANGE",
                    vigil_broker::topology::DEAD_LETTER_EXCHANGE,
                ),
                routing_key: env::string_or(
                    "VIGIL_DEAD_LETTER_ROUTING_KEY",
                    vigil_broker::topology::DEAD_LETTER_ROUTING_KEY,
                ),
            },
        };

        let config = Self {
            broker,
            database_url: env::required("VIGIL_DATABASE_URL")?,
            db_pool_min: env::parsed_or("VIGIL_DB_POOL_MIN", 1)?,
            db_pool_max: env::parsed_or("VIGIL_DB_POOL_MAX", 16)?,
            db_timeout: env::millis_or("VIGIL_DB_TIMEOUT_MS", Duration::from_secs(10))?,
            pool_size: env::parsed_or("VIGIL_POOL_SIZE", 16)?,
            worker: WorkerTuning {
                jitter_min: env::millis_or("VIGIL_JITTER_MIN_MS", Duration::from_millis(100))?,
                jitter_max: env::millis_or("VIGIL_JITTER_MAX_MS", Duration::from_millis(500))?,
                retry_delay: env::millis_or("VIGIL_RETRY_DELAY_MS", Duration::from_secs(1))?,
                detector_timeout: env::millis_or(
                    "VIGIL_DETECTOR_TIMEOUT_MS",
                    Duration::from_secs(30),
                )?,
            },
            default_max_retries: env::parsed_or("VIGIL_MAX_RETRIES", 3)?,
            shutdown_grace: env::millis_or("VIGIL_SHUTDOWN_GRACE_MS", Duration::from_secs(10))?,
            ack_deadline: env::millis_or("VIGIL_ACK_DEADLINE_MS", Duration::from_secs(1800))?,
            poison_threshold: env::parsed_or("VIGIL_POISON_THRESHOLD", 5)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Worst-case time one task can legitimately stay unacked.
    ///
    /// A worker makes `max_retries + 1` detector calls (the initial
    /// attempt plus every retry), with a delay before each retry, after
    /// the jitter sleep. A shorter ack deadline would let the broker
    /// redeliver a task whose worker is still inside its retry budget.
    pub fn worst_case_task_time(&self) -> Duration {
        let attempts = self.default_max_retries as u32 + 1;
        self.worker.jitter_max
            + self.worker.detector_timeout * attempts
            + self.worker.retry_delay * self.default_max_retries as u32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.jitter_min > self.worker.jitter_max {
            return Err(ConfigError::Policy(format!(
                "jitter_min {}ms exceeds jitter_max {}ms",
                self.worker.jitter_min.as_millis(),
                self.worker.jitter_max.as_millis(),
            )));
        }
        if self.db_pool_min > self.db_pool_max {
            return Err(ConfigError::Policy(format!(
                "db pool min {} exceeds max {}",
                self.db_pool_min, self.db_pool_max,
            )));
        }
        if self.default_max_retries < 0 {
            return Err(ConfigError::Policy("max_retries must be non-negative".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Policy("pool size must be at least 1".to_string()));
        }
        let worst = self.worst_case_task_time();
        if self.ack_deadline <= worst {
            return Err(ConfigError::Policy(format!(
                "ack deadline {}ms does not cover the worst-case task time {}ms \
                 (jitter_max + (max_retries + 1) x detector_timeout + max_retries x retry_delay)",
                self.ack_deadline.as_millis(),
                worst.as_millis(),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
