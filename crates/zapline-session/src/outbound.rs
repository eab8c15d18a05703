// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pushes replies through a live gateway socket.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use zapline_core::{
    GatewaySocket, MessageId, OutboundMessage, TenantId, ZaplineError, normalize_recipient,
};
use zapline_resilience::Backoff;

/// A message that passed validation, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    pub to: String,
    pub text: Option<String>,
    pub media_url: Option<String>,
}

/// Validates and normalizes an outbound message.
///
/// The recipient must resolve to an address and the message must carry
/// either text or a media URL.
pub fn prepare(message: &OutboundMessage) -> Result<PreparedMessage, ZaplineError> {
    let to = normalize_recipient(&message.recipient)?;
    let text = Some(message.text.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let media_url = message
        .media_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    if text.is_none() && media_url.is_none() {
        return Err(ZaplineError::InvalidInput(
            "message needs text or a media url".to_string(),
        ));
    }
    Ok(PreparedMessage {
        to,
        text,
        media_url,
    })
}

/// Thin wrapper over a socket that retries transient failures.
pub struct OutboundSender<'a> {
    socket: &'a dyn GatewaySocket,
    retry: Backoff,
}

impl<'a> OutboundSender<'a> {
    pub fn new(socket: &'a dyn GatewaySocket, retry: Backoff) -> Self {
        Self { socket, retry }
    }

    /// Sends `message`, retrying transient gateway errors up to the retry budget.
    pub async fn send(&self, message: &OutboundMessage) -> Result<MessageId, ZaplineError> {
        let prepared = prepare(message)?;
        let mut failures = 0;
        loop {
            match self.write(&prepared).await {
                Ok(id) => {
                    debug!(to = %prepared.to, message_id = %id, "outbound message sent");
                    return Ok(id);
                }
                Err(err) => {
                    failures += 1;
                    if !retryable(&err) || self.retry.is_exhausted(failures) {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(failures);
                    warn!(
                        to = %prepared.to,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn write(&self, prepared: &PreparedMessage) -> Result<MessageId, ZaplineError> {
        match (&prepared.media_url, &prepared.text) {
            (Some(url), caption) => {
                self.socket
                    .send_media(&prepared.to, url, caption.as_deref())
                    .await
            }
            (None, Some(text)) => self.socket.send_text(&prepared.to, text).await,
            (None, None) => Err(ZaplineError::InvalidInput(
                "message needs text or a media url".to_string(),
            )),
        }
    }
}

/// A closed socket stays closed; retrying it only delays the caller.
fn retryable(err: &ZaplineError) -> bool {
    err.is_transient() && !matches!(err, ZaplineError::SocketClosed { .. })
}

type Reply = oneshot::Sender<Result<MessageId, ZaplineError>>;

/// Sends of one gateway connection, written in order by a worker task.
///
/// The connection actor hands sends off here so a slow or wedged write never
/// holds up gateway events or teardown. Dropping the queue aborts the worker;
/// callers of sends still queued or in flight then see their reply channel
/// close.
pub(crate) struct OutboundQueue {
    jobs: mpsc::Sender<(OutboundMessage, Reply)>,
    delivered: mpsc::UnboundedReceiver<MessageId>,
    worker: JoinHandle<()>,
    tenant_id: TenantId,
}

impl OutboundQueue {
    pub fn spawn(
        tenant_id: TenantId,
        socket: Arc<dyn GatewaySocket>,
        retry: Backoff,
        capacity: usize,
    ) -> Self {
        let (jobs, mut queued) = mpsc::channel::<(OutboundMessage, Reply)>(capacity.max(1));
        let (delivered_tx, delivered) = mpsc::unbounded_channel();
        let worker_tenant = tenant_id.clone();
        let worker = tokio::spawn(async move {
            let sender = OutboundSender::new(socket.as_ref(), retry);
            while let Some((message, reply)) = queued.recv().await {
                let result = sender.send(&message).await;
                if let Ok(id) = &result {
                    let _ = delivered_tx.send(id.clone());
                }
                if reply.send(result).is_err() {
                    trace!(tenant_id = %worker_tenant, "send finished after its caller left");
                }
            }
        });
        Self {
            jobs,
            delivered,
            worker,
            tenant_id,
        }
    }

    /// Queues a send. A full queue fails the send right away.
    pub fn submit(&self, message: OutboundMessage, reply: Reply) {
        match self.jobs.try_send((message, reply)) {
            Ok(()) => {}
            Err(TrySendError::Full((_, reply))) => {
                warn!(tenant_id = %self.tenant_id, "outbound queue full, rejecting send");
                let _ = reply.send(Err(ZaplineError::RateLimited {
                    key: format!("outbound:{}", self.tenant_id),
                }));
            }
            Err(TrySendError::Closed((_, reply))) => {
                let _ = reply.send(Err(ZaplineError::SocketClosed {
                    reason: "outbound worker stopped".to_string(),
                }));
            }
        }
    }

    /// Yields the id of each message the worker delivered.
    pub async fn delivered(&mut self) -> Option<MessageId> {
        self.delivered.recv().await
    }
}

impl Drop for OutboundQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
