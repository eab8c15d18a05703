// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`GatewayConnector`] that opens one bridge WebSocket per tenant connection.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zapline_config::model::BridgeConfig;
use zapline_core::{
    AdapterType, CredentialBlob, GatewayConnection, GatewayConnector, HealthStatus,
    PluginAdapter, TenantId, ZaplineError,
};

use crate::protocol::{ClientFrame, encode_credentials};
use crate::socket::{BridgeSocket, PendingAcks, read_loop, write_loop};

/// Events buffered per connection before the bridge reader waits on the actor.
const EVENT_BUFFER: usize = 64;
/// Frames buffered per connection before senders wait on the writer.
const OUTGOING_BUFFER: usize = 32;

/// Connects tenants through an external WhatsApp Web bridge.
pub struct BridgeConnector {
    url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    /// Parent of every connection's close token.
    shutdown: CancellationToken,
    last_error: Mutex<Option<String>>,
}

impl BridgeConnector {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            shutdown: CancellationToken::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn record_outcome(&self, error: Option<&ZaplineError>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error.map(ToString::to_string);
    }

    async fn open(
        &self,
        tenant_id: &TenantId,
        credentials: Option<CredentialBlob>,
    ) -> Result<GatewayConnection, ZaplineError> {
        let handshake = connect_async(self.url.as_str());
        let (ws, _response) = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| ZaplineError::Timeout {
                duration: self.connect_timeout,
            })?
            .map_err(|e| ZaplineError::Gateway {
                message: format!("bridge handshake with {} failed", self.url),
                source: Some(Box::new(e)),
            })?;
        let (mut sink, stream) = ws.split();

        let start = ClientFrame::Start {
            tenant_id: tenant_id.to_string(),
            credentials: credentials.as_ref().map(encode_credentials),
        };
        let start = serde_json::to_string(&start)
            .map_err(|e| ZaplineError::Internal(format!("failed to encode bridge frame: {e}")))?;
        sink.send(Message::Text(start.into()))
            .await
            .map_err(|e| ZaplineError::Gateway {
                message: "failed to start bridge session".to_string(),
                source: Some(Box::new(e)),
            })?;

        let closed = self.shutdown.child_token();
        let pending: PendingAcks = Arc::new(DashMap::new());
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(write_loop(sink, outgoing_rx, closed.clone()));
        tokio::spawn(read_loop(
            tenant_id.clone(),
            stream,
            events_tx,
            Arc::clone(&pending),
            closed.clone(),
        ));

        let socket = BridgeSocket::new(
            tenant_id.clone(),
            outgoing_tx,
            pending,
            self.request_timeout,
            closed,
        );
        Ok(GatewayConnection {
            socket: Arc::new(socket),
            events: events_rx,
        })
    }
}

#[async_trait]
impl PluginAdapter for BridgeConnector {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        let last_error = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(match last_error {
            Some(error) => HealthStatus::Degraded(format!("last connect failed: {error}")),
            None => HealthStatus::Healthy,
        })
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        info!("closing bridge connections");
        self.shutdown.cancel();
        Ok(())
    }
}

#[async_trait]
impl GatewayConnector for BridgeConnector {
    async fn connect(
        &self,
        tenant_id: &TenantId,
        credentials: Option<CredentialBlob>,
    ) -> Result<GatewayConnection, ZaplineError> {
        if self.shutdown.is_cancelled() {
            return Err(ZaplineError::SocketClosed {
                reason: "bridge connector is shut down".to_string(),
            });
        }
        debug!(
            tenant_id = %tenant_id,
            resuming = credentials.is_some(),
            url = %self.url,
            "opening bridge connection"
        );
        let result = self.open(tenant_id, credentials).await;
        match &result {
            Ok(_) => self.record_outcome(None),
            Err(err) => {
                warn!(tenant_id = %tenant_id, error = %err, "bridge connection failed");
                self.record_outcome(Some(err));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> BridgeConfig {
        BridgeConfig {
            url: url.to_string(),
            connect_timeout_ms: 500,
            request_timeout_ms: 500,
        }
    }

    /// A loopback URL nothing listens on.
    async fn dead_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("ws://127.0.0.1:{port}/ws")
    }

    #[tokio::test]
    async fn unreachable_bridge_degrades_health() {
        let connector = BridgeConnector::new(&config(&dead_url().await));
        assert_eq!(connector.health_check().await.unwrap(), HealthStatus::Healthy);

        let err = connector
            .connect(&TenantId::from("acme"), None)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(
            connector.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
    }

    #[tokio::test]
    async fn shut_down_connector_refuses_connects() {
        let connector = BridgeConnector::new(&config("ws://127.0.0.1:9/ws"));
        connector.shutdown().await.unwrap();
        let err = connector
            .connect(&TenantId::from("acme"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ZaplineError::SocketClosed { .. }));
    }
}
