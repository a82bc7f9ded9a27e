// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent publishing, with publisher confirms and a timeout budget.

use std::sync::Arc;

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel};
use tracing::debug;

use crate::client::Broker;
use crate::config::DeadLetterRoute;
use crate::topology::EXCHANGE;
use crate::BrokerError;

/// Publish seam between the engine and the broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a persistent message to the topic exchange. Returns only
    /// after the broker confirms it owns the message.
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Side channel for messages the engine refuses to process.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Forward the original payload with an error tag and detail headers.
    async fn reject(
        &self,
        payload: &[u8],
        error_tag: &str,
        detail: &str,
    ) -> Result<(), BrokerError>;
}

fn persistent_json() -> BasicProperties {
    // delivery_mode 2 = persistent.
    BasicProperties::default()
        .with_delivery_mode(2)
        .with_content_type("application/json".into())
}

async fn confirmed_publish(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    payload: &[u8],
    properties: BasicProperties,
    timeout: std::time::Duration,
) -> Result<(), BrokerError> {
    let publish = async {
        let confirm = channel
            .basic_publish(exchange, routing_key, BasicPublishOptions::default(), payload, properties)
            .await
            .map_err(BrokerError::Publish)?
            .await
            .map_err(BrokerError::Publish)?;
        if confirm.is_nack() {
            return Err(BrokerError::Unconfirmed { routing_key: routing_key.to_string() });
        }
        Ok(())
    };
    tokio::time::timeout(timeout, publish)
        .await
        .map_err(|_| BrokerError::Timeout { operation: "publish" })?
}

/// Channel-caching publisher over a role connection.
///
/// The channel is lazily opened and replaced after any publish error, so a
/// caller retrying on broker redelivery gets a healthy channel.
pub struct LapinPublisher {
    broker: Arc<Broker>,
    timeout: std::time::Duration,
    channel: tokio::sync::Mutex<Option<Channel>>,
}

impl LapinPublisher {
    pub fn new(broker: Arc<Broker>, timeout: std::time::Duration) -> Self {
        Self { broker, timeout, channel: tokio::sync::Mutex::new(None) }
    }

    async fn channel(&self) -> Result<Channel, BrokerError> {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }
        let channel = self.broker.channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(BrokerError::Channel)?;
        *guard = Some(channel.clone());
        Ok(channel)
    }

    async fn invalidate(&self) {
        self.channel.lock().await.take();
    }
}

#[async_trait]
impl Publisher for LapinPublisher {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        let result = confirmed_publish(
            &channel,
            EXCHANGE,
            routing_key,
            payload,
            persistent_json(),
            self.timeout,
        )
        .await;
        if result.is_err() {
            self.invalidate().await;
        } else {
            debug!(routing_key, bytes = payload.len(), "published");
        }
        result
    }
}

/// Dead-letter publisher. Tags the original bytes with what went wrong.
pub struct LapinDeadLetter {
    publisher: LapinPublisher,
    route: DeadLetterRoute,
}

impl LapinDeadLetter {
    pub fn new(broker: Arc<Broker>, route: DeadLetterRoute, timeout: std::time::Duration) -> Self {
        Self { publisher: LapinPublisher::new(broker, timeout), route }
    }
}

#[async_trait]
impl DeadLetterSink for LapinDeadLetter {
    async fn reject(
        &self,
        payload: &[u8],
        error_tag: &str,
        detail: &str,
    ) -> Result<(), BrokerError> {
        let mut headers = FieldTable::default();
        headers.insert("x-error-tag".into(), AMQPValue::LongString(error_tag.into()));
        headers.insert("x-error-detail".into(), AMQPValue::LongString(detail.into()));
        let properties = persistent_json().with_headers(headers);

        let channel = self.publisher.channel().await?;
        let result = confirmed_publish(
            &channel,
            &self.route.exchange,
            &self.route.routing_key,
            payload,
            properties,
            self.publisher.timeout,
        )
        .await;
        if result.is_err() {
            self.publisher.invalidate().await;
        }
        result
    }
}
