// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write side of a bridge connection plus its reader and writer tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;
use zapline_core::{GatewayEvent, GatewaySocket, MessageId, TenantId, ZaplineError};

use crate::protocol::{BridgeFrame, ClientFrame, Routed};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sends waiting for their `ack` / `error` frame, keyed by request id.
pub(crate) type PendingAcks = Arc<DashMap<String, oneshot::Sender<Result<MessageId, ZaplineError>>>>;

/// [`GatewaySocket`] over one bridge WebSocket.
///
/// Dropping the socket stops both background tasks, which ends the event
/// stream of the connection.
pub struct BridgeSocket {
    tenant_id: TenantId,
    outgoing: mpsc::Sender<Message>,
    pending: PendingAcks,
    request_timeout: Duration,
    closed: CancellationToken,
}

impl BridgeSocket {
    pub(crate) fn new(
        tenant_id: TenantId,
        outgoing: mpsc::Sender<Message>,
        pending: PendingAcks,
        request_timeout: Duration,
        closed: CancellationToken,
    ) -> Self {
        Self {
            tenant_id,
            outgoing,
            pending,
            request_timeout,
            closed,
        }
    }

    async fn write(&self, frame: &ClientFrame) -> Result<(), ZaplineError> {
        let json = serde_json::to_string(frame)
            .map_err(|e| ZaplineError::Internal(format!("failed to encode bridge frame: {e}")))?;
        self.outgoing
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| ZaplineError::SocketClosed {
                reason: "bridge connection is closed".to_string(),
            })
    }

    /// Writes a frame carrying a fresh request id and waits for its ack.
    async fn request(
        &self,
        frame: impl FnOnce(String) -> ClientFrame,
    ) -> Result<MessageId, ZaplineError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        if let Err(err) = self.write(&frame(request_id.clone())).await {
            self.pending.remove(&request_id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ZaplineError::SocketClosed {
                reason: "bridge connection closed before the send was acknowledged".to_string(),
            }),
            Err(_) => {
                self.pending.remove(&request_id);
                warn!(tenant_id = %self.tenant_id, request_id = %request_id, "bridge send timed out");
                Err(ZaplineError::Timeout {
                    duration: self.request_timeout,
                })
            }
        }
    }
}

impl Drop for BridgeSocket {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl GatewaySocket for BridgeSocket {
    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId, ZaplineError> {
        self.request(|request_id| ClientFrame::SendText {
            request_id,
            to: to.to_string(),
            text: text.to_string(),
        })
        .await
    }

    async fn send_media(
        &self,
        to: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, ZaplineError> {
        self.request(|request_id| ClientFrame::SendMedia {
            request_id,
            to: to.to_string(),
            url: media_url.to_string(),
            caption: caption.map(str::to_string),
        })
        .await
    }

    async fn logout(&self) -> Result<(), ZaplineError> {
        self.write(&ClientFrame::Logout).await?;
        debug!(tenant_id = %self.tenant_id, "logout requested from bridge");
        self.closed.cancel();
        Ok(())
    }

    async fn close(&self) -> Result<(), ZaplineError> {
        self.closed.cancel();
        Ok(())
    }
}

/// Forwards queued frames to the WebSocket until the socket closes.
///
/// Frames queued before the close are still flushed.
pub(crate) async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::Receiver<Message>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            message = outgoing.recv() => match message {
                Some(message) => {
                    if let Err(err) = sink.send(message).await {
                        debug!(error = %err, "bridge write failed");
                        closed.cancel();
                        return;
                    }
                }
                None => break,
            },
            _ = closed.cancelled() => break,
        }
    }

    while let Ok(message) = outgoing.try_recv() {
        if sink.send(message).await.is_err() {
            return;
        }
    }
    if let Err(err) = sink.close().await {
        trace!(error = %err, "bridge close handshake failed");
    }
}

/// Decodes bridge frames into gateway events and send acknowledgements.
///
/// Exits on close, on a `closed` frame or when the socket is dropped. Sends
/// still waiting for an ack fail with `SocketClosed`.
pub(crate) async fn read_loop(
    tenant_id: TenantId,
    mut stream: SplitStream<WsStream>,
    events: mpsc::Sender<GatewayEvent>,
    pending: PendingAcks,
    closed: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            message = stream.next() => message,
        };
        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => {
                debug!(tenant_id = %tenant_id, ?frame, "bridge closed the WebSocket");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                warn!(tenant_id = %tenant_id, error = %err, "bridge read failed");
                break;
            }
            None => break,
        };

        let routed = serde_json::from_str::<BridgeFrame>(text.as_str())
            .map_err(|e| ZaplineError::Gateway {
                message: "undecodable bridge frame".to_string(),
                source: Some(Box::new(e)),
            })
            .and_then(BridgeFrame::route);
        match routed {
            Ok(Routed::Event(event)) => {
                let last = matches!(event, GatewayEvent::Closed(_));
                if events.send(event).await.is_err() || last {
                    break;
                }
            }
            Ok(Routed::Ack {
                request_id,
                message_id,
            }) => match pending.remove(&request_id) {
                Some((_, waiter)) => {
                    let _ = waiter.send(Ok(message_id));
                }
                None => trace!(tenant_id = %tenant_id, request_id = %request_id, "late ack ignored"),
            },
            Ok(Routed::Error {
                request_id: Some(request_id),
                message,
            }) => {
                if let Some((_, waiter)) = pending.remove(&request_id) {
                    let _ = waiter.send(Err(ZaplineError::Rejected { message }));
                }
            }
            Ok(Routed::Error {
                request_id: None,
                message,
            }) => warn!(tenant_id = %tenant_id, message = %message, "bridge reported an error"),
            Err(err) => warn!(tenant_id = %tenant_id, error = %err, "skipping bridge frame"),
        }
    }

    closed.cancel();
    // Dropping the waiters fails every outstanding send.
    pending.clear();
    debug!(tenant_id = %tenant_id, "bridge reader stopped");
}
