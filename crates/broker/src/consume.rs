// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual-ack consumer loop.
//!
//! Drives one durable queue: bounded prefetch, a bounded in-process pool,
//! poison detection, and disposition-based acknowledgement. Handlers never
//! see lapin types; they get bytes and return a [`Disposition`].

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::AMQPValue;
use lapin::BasicProperties;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::client::Broker;
use crate::publish::DeadLetterSink;
use crate::BrokerError;

/// What to do with a delivery after handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Done; remove from the queue.
    Ack,
    /// Transient failure; return to the queue for redelivery.
    Requeue,
    /// Refused; forward the original bytes to the dead-letter route, then
    /// remove from the queue.
    DeadLetter { tag: &'static str, detail: String },
}

/// A consumer's message handler. One invocation per delivery; the loop
/// guarantees no two invocations share a delivery.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Queue-facing name, used for consumer tags and log lines.
    fn name(&self) -> &str;

    /// Process one payload. Must not panic; every failure maps to a
    /// disposition.
    async fn handle(&self, payload: &[u8]) -> Disposition;
}

/// Per-consumer loop options.
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub queue: &'static str,
    /// Bounded in-flight window at the broker.
    pub prefetch: u16,
    /// Bounded handler pool in this process.
    pub pool_size: usize,
    /// Dead-letter a delivery once the broker has redelivered it this
    /// many times without success.
    pub poison_threshold: u32,
}

/// How many times the broker has handed out this message.
///
/// Prefers the quorum-queue `x-delivery-count` header, falls back to the
/// `x-death` event count, then to the redelivered flag (which can only
/// witness one prior attempt).
pub fn delivery_attempts(properties: &BasicProperties, redelivered: bool) -> u32 {
    fn as_count(value: &AMQPValue) -> Option<u32> {
        match value {
            AMQPValue::LongLongInt(n) => Some(*n as u32),
            AMQPValue::LongInt(n) => Some(*n as u32),
            AMQPValue::LongUInt(n) => Some(*n),
            _ => None,
        }
    }

    if let Some(headers) = properties.headers() {
        let inner = headers.inner();
        if let Some(count) =
            inner.iter().find(|(k, _)| k.as_str() == "x-delivery-count").and_then(|(_, v)| as_count(v))
        {
            return count;
        }
        if let Some(AMQPValue::FieldArray(events)) =
            inner.iter().find(|(k, _)| k.as_str() == "x-death").map(|(_, v)| v)
        {
            let total: u32 = events
                .as_slice()
                .iter()
                .filter_map(|entry| match entry {
                    AMQPValue::FieldTable(t) => t
                        .inner()
                        .iter()
                        .find(|(k, _)| k.as_str() == "count")
                        .and_then(|(_, v)| as_count(v)),
                    _ => None,
                })
                .sum();
            if total > 0 {
                return total;
            }
        }
    }
    u32::from(redelivered)
}

/// Consume a queue until shutdown.
///
/// Reconnects (via the role's [`Broker`]) whenever the consumer stream
/// ends or errors; unacked deliveries are redelivered by the broker. On
/// shutdown the consumer is dropped first (no new deliveries), then
/// in-flight handlers are awaited; the supervisor bounds that drain.
pub async fn run_consumer(
    broker: Arc<Broker>,
    dead_letter: Arc<dyn DeadLetterSink>,
    handler: Arc<dyn Handler>,
    options: ConsumeOptions,
    shutdown: CancellationToken,
) {
    let pool = Arc::new(Semaphore::new(options.pool_size));
    let tracker = TaskTracker::new();

    // Channel-level failures on a live connection pace themselves here;
    // connection failures back off inside Broker::channel.
    let retry_pause = std::time::Duration::from_millis(500);

    'reconnect: while !shutdown.is_cancelled() {
        let channel = match broker.channel().await {
            Ok(channel) => channel,
            Err(BrokerError::ShuttingDown) => break,
            Err(e) => {
                error!(consumer = handler.name(), error = %e, "channel setup failed");
                tokio::time::sleep(retry_pause).await;
                continue;
            }
        };
        if let Err(e) = channel.basic_qos(options.prefetch, BasicQosOptions::default()).await {
            warn!(consumer = handler.name(), error = %e, "basic_qos failed");
            tokio::time::sleep(retry_pause).await;
            continue;
        }

        let mut consumer = match channel
            .basic_consume(
                options.queue,
                handler.name(),
                BasicConsumeOptions::default(),
                Default::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                warn!(consumer = handler.name(), error = %e, "basic_consume failed");
                tokio::time::sleep(retry_pause).await;
                continue;
            }
        };
        info!(consumer = handler.name(), queue = options.queue, "consuming");

        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break 'reconnect,
                next = consumer.next() => next,
            };
            match delivery {
                Some(Ok(delivery)) => {
                    let permit = tokio::select! {
                        _ = shutdown.cancelled() => break 'reconnect,
                        permit = Arc::clone(&pool).acquire_owned() => permit,
                    };
                    let Ok(permit) = permit else { break 'reconnect };
                    let handler = Arc::clone(&handler);
                    let dead_letter = Arc::clone(&dead_letter);
                    let threshold = options.poison_threshold;
                    tracker.spawn(async move {
                        let _permit = permit;
                        process_delivery(delivery, handler, dead_letter, threshold).await;
                    });
                }
                Some(Err(e)) => {
                    warn!(consumer = handler.name(), error = %e, "consume stream error");
                    continue 'reconnect;
                }
                None => {
                    warn!(consumer = handler.name(), "consume stream ended");
                    continue 'reconnect;
                }
            }
        }
    }

    // Stop accepting work, then drain what is already in flight. Anything
    // unacked after the supervisor's grace period is redelivered later.
    tracker.close();
    tracker.wait().await;
    info!(consumer = handler.name(), "consumer stopped");
}

async fn process_delivery(
    delivery: Delivery,
    handler: Arc<dyn Handler>,
    dead_letter: Arc<dyn DeadLetterSink>,
    poison_threshold: u32,
) {
    let attempts = delivery_attempts(&delivery.properties, delivery.redelivered);
    let disposition = if attempts >= poison_threshold {
        warn!(consumer = handler.name(), attempts, "poison message, dead-lettering");
        Disposition::DeadLetter {
            tag: "poison",
            detail: format!("redelivered {attempts} times"),
        }
    } else {
        handler.handle(&delivery.data).await
    };

    match disposition {
        Disposition::Ack => {
            if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
                warn!(consumer = handler.name(), error = %e, "ack failed");
            }
        }
        Disposition::Requeue => {
            let options = BasicNackOptions { requeue: true, ..Default::default() };
            if let Err(e) = delivery.acker.nack(options).await {
                warn!(consumer = handler.name(), error = %e, "nack failed");
            }
        }
        Disposition::DeadLetter { tag, detail } => {
            // Ack only once the dead-letter route owns the payload;
            // otherwise requeue and let redelivery try again.
            match dead_letter.reject(&delivery.data, tag, &detail).await {
                Ok(()) => {
                    if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
                        warn!(consumer = handler.name(), error = %e, "ack failed");
                    }
                }
                Err(e) => {
                    warn!(consumer = handler.name(), error = %e, tag, "dead-letter publish failed");
                    let options = BasicNackOptions { requeue: true, ..Default::default() };
                    if let Err(e) = delivery.acker.nack(options).await {
                        warn!(consumer = handler.name(), error = %e, "nack failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "consume_tests.rs"]
mod tests;
