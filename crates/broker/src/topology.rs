// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exchange, queue, and binding declarations.
//!
//! One topic exchange, five durable queues, plus the dead-letter side
//! channel. Declaration is idempotent: every reconnect re-declares the
//! same topology with the same arguments.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};

use crate::config::{BrokerSettings, QueuePolicy};
use crate::BrokerError;

pub const EXCHANGE: &str = "vigil.topic";

pub const QUEUE_INSTRUCTIONS: &str = "instructions";
pub const QUEUE_API_TASKS: &str = "api.tasks";
pub const QUEUE_AGENT_TASKS: &str = "agent.tasks";
pub const QUEUE_API_RESPONSES: &str = "api.responses";
pub const QUEUE_AGENT_RESPONSES: &str = "agent.responses";

/// Any producer's `<tool>.execution.result` lands on the instructions queue.
pub const BIND_INSTRUCTIONS: &str = "*.execution.result";

pub const DEAD_LETTER_EXCHANGE: &str = "vigil.dlx";
pub const DEAD_LETTER_QUEUE: &str = "vigil.rejected";
pub const DEAD_LETTER_ROUTING_KEY: &str = "vigil.rejected";

/// The five (queue, binding) pairs on the topic exchange.
pub const BINDINGS: [(&str, &str); 5] = [
    (QUEUE_INSTRUCTIONS, BIND_INSTRUCTIONS),
    (QUEUE_API_TASKS, vigil_wire::ROUTE_API_TASK),
    (QUEUE_AGENT_TASKS, vigil_wire::ROUTE_AGENT_TASK),
    (QUEUE_API_RESPONSES, vigil_wire::ROUTE_API_RESPONSE),
    (QUEUE_AGENT_RESPONSES, vigil_wire::ROUTE_AGENT_RESPONSE),
];

fn durable() -> QueueDeclareOptions {
    QueueDeclareOptions { durable: true, auto_delete: false, ..Default::default() }
}

fn policy_args(policy: &QueuePolicy) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(ttl) = policy.message_ttl_ms {
        args.insert("x-message-ttl".into(), AMQPValue::LongUInt(ttl));
    }
    if let Some(max) = policy.max_length {
        args.insert("x-max-length".into(), AMQPValue::LongUInt(max));
    }
    args
}

/// Declare the exchange, the five queues with their bindings, and the
/// dead-letter exchange/queue. Safe to call on every reconnect.
pub async fn declare_topology(
    channel: &Channel,
    settings: &BrokerSettings,
) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            EXCHANGE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::Topology)?;

    for (queue, binding) in BINDINGS {
        channel
            .queue_declare(queue, durable(), policy_args(&settings.queue_policy))
            .await
            .map_err(BrokerError::Topology)?;
        channel
            .queue_bind(queue, EXCHANGE, binding, QueueBindOptions::default(), FieldTable::default())
            .await
            .map_err(BrokerError::Topology)?;
    }

    channel
        .exchange_declare(
            &settings.dead_letter.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::Topology)?;
    channel
        .queue_declare(DEAD_LETTER_QUEUE, durable(), FieldTable::default())
        .await
        .map_err(BrokerError::Topology)?;
    channel
        .queue_bind(
            DEAD_LETTER_QUEUE,
            &settings.dead_letter.exchange,
            &settings.dead_letter.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::Topology)?;

    Ok(())
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
