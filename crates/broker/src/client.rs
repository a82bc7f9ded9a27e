// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Role-scoped broker connection with reconnect.

use std::sync::Arc;

use lapin::{Channel, Connection, ConnectionProperties, ConnectionState};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::config::{BrokerSettings, Role};
use crate::topology;
use crate::BrokerError;

/// One broker connection for one role.
///
/// Holds at most one live AMQP connection; channels are opened per
/// consumer/producer and never shared across tasks. [`Broker::channel`]
/// transparently reconnects with bounded exponential backoff and
/// re-declares topology, so callers just ask for a fresh channel whenever
/// theirs dies.
pub struct Broker {
    settings: Arc<BrokerSettings>,
    role: Role,
    shutdown: CancellationToken,
    connection: tokio::sync::Mutex<Option<Connection>>,
}

impl Broker {
    pub fn new(settings: Arc<BrokerSettings>, role: Role, shutdown: CancellationToken) -> Self {
        Self { settings, role, shutdown, connection: tokio::sync::Mutex::new(None) }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Open a channel with topology declared, connecting (or reconnecting)
    /// first if needed. Blocks through the backoff schedule until the
    /// broker is reachable or shutdown is requested.
    pub async fn channel(&self) -> Result<Channel, BrokerError> {
        let mut guard = self.connection.lock().await;

        let needs_connect = match guard.as_ref() {
            Some(conn) => conn.status().state() != ConnectionState::Connected,
            None => true,
        };
        if needs_connect {
            *guard = Some(self.connect_with_backoff().await?);
        }

        let conn = guard.as_ref().ok_or(BrokerError::ShuttingDown)?;
        let channel = conn.create_channel().await.map_err(BrokerError::Channel)?;
        topology::declare_topology(&channel, &self.settings).await?;
        Ok(channel)
    }

    async fn connect_with_backoff(&self) -> Result<Connection, BrokerError> {
        let uri = self.settings.amqp_uri(self.role);
        let mut backoff =
            Backoff::new(self.settings.reconnect_min, self.settings.reconnect_max);

        loop {
            if self.shutdown.is_cancelled() {
                return Err(BrokerError::ShuttingDown);
            }
            match Connection::connect(&uri, ConnectionProperties::default()).await {
                Ok(conn) => {
                    info!(role = %self.role, host = %self.settings.host, "broker connected");
                    return Ok(conn);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        role = %self.role,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "broker connect failed, backing off"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Err(BrokerError::ShuttingDown),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Close the connection. Unacked deliveries return to their queues.
    pub async fn close(&self) {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.take() {
            if let Err(e) = conn.close(200, "shutting down").await {
                warn!(role = %self.role, error = %e, "broker close failed");
            }
        }
    }
}
