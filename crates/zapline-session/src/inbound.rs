// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound pipeline: filter, rate limit, debounce, hand off, reply.
//!
//! One pipeline serves every tenant. Batches are keyed per tenant and
//! sender, so tenants never share buffers or rate-limit windows unless the
//! limiter is scoped per tenant.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use zapline_config::model::RateLimitScope;
use zapline_core::{InboundBatch, InboundHandler, InboundMessage, OutboundMessage, TenantId};
use zapline_debounce::{AddOutcome, BatchKey, DebounceEngine, Dispatch, FlushCallback};
use zapline_resilience::RateLimiter;

use crate::command::SessionCommand;
use crate::settings::SessionSettings;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Own or empty message; nothing to do.
    Ignored,
    /// Over the rate limit; dropped.
    RateLimited,
    /// Already pending or processed.
    Duplicate,
    Buffered { pending: usize },
    ProcessedImmediately,
}

impl From<AddOutcome> for IngestOutcome {
    fn from(outcome: AddOutcome) -> Self {
        match outcome {
            AddOutcome::Duplicate => IngestOutcome::Duplicate,
            AddOutcome::Buffered { pending } => IngestOutcome::Buffered { pending },
            AddOutcome::ProcessedImmediately => IngestOutcome::ProcessedImmediately,
        }
    }
}

pub struct InboundPipeline {
    limiter: RateLimiter,
    debounce: DebounceEngine,
    handler: Arc<dyn InboundHandler>,
    scope: RateLimitScope,
    dispatch: Dispatch,
}

impl InboundPipeline {
    pub fn new(settings: &SessionSettings, handler: Arc<dyn InboundHandler>) -> Self {
        let debounce = DebounceEngine::new(settings.debounce.clone());
        let dispatch = debounce.settings().default_dispatch();
        Self {
            limiter: RateLimiter::new(settings.rate_limit),
            debounce,
            handler,
            scope: settings.rate_limit_scope,
            dispatch,
        }
    }

    pub fn debounce(&self) -> &DebounceEngine {
        &self.debounce
    }

    fn limit_key(&self, tenant_id: &TenantId, sender: &str) -> String {
        match self.scope {
            RateLimitScope::Sender => format!("{tenant_id}:{sender}"),
            RateLimitScope::Tenant => tenant_id.to_string(),
        }
    }

    /// Runs one message through the pipeline. Replies produced by the
    /// handler go back through `replies` if the session still exists.
    pub(crate) async fn ingest(
        &self,
        tenant_id: &TenantId,
        message: InboundMessage,
        replies: mpsc::WeakSender<SessionCommand>,
    ) -> IngestOutcome {
        if message.from_me {
            trace!(tenant_id = %tenant_id, message_id = %message.id, "ignoring own message");
            return IngestOutcome::Ignored;
        }
        let sender = message.sender.trim();
        if sender.is_empty() || message.text.trim().is_empty() {
            debug!(tenant_id = %tenant_id, message_id = %message.id, "ignoring empty message");
            return IngestOutcome::Ignored;
        }

        if !self.limiter.is_allowed(&self.limit_key(tenant_id, sender)) {
            warn!(tenant_id = %tenant_id, sender = %sender, "inbound message rate limited");
            return IngestOutcome::RateLimited;
        }

        let key = BatchKey::new(tenant_id.clone(), sender);
        let outcome = self
            .debounce
            .add_message(
                key,
                &message.text,
                message.id,
                self.dispatch,
                self.flush_callback(replies),
            )
            .await;
        IngestOutcome::from(outcome)
    }

    /// Drops buffered fragments and the rate-limit window for one sender and
    /// asks the handler to forget its context.
    pub async fn clear_sender(
        &self,
        tenant_id: &TenantId,
        sender: &str,
    ) -> Result<(), zapline_core::ZaplineError> {
        let dropped = self
            .debounce
            .clear_sender(&BatchKey::new(tenant_id.clone(), sender))
            .await;
        if self.scope == RateLimitScope::Sender {
            self.limiter.reset(&self.limit_key(tenant_id, sender));
        }
        debug!(tenant_id = %tenant_id, sender, dropped, "sender context cleared");
        self.handler.clear_context(tenant_id, sender).await
    }

    /// Aborts pending flushes and forgets rate-limit windows for a tenant.
    pub async fn cancel_tenant(&self, tenant_id: &TenantId) {
        let cancelled = self.debounce.cancel_tenant(tenant_id).await;
        self.limiter.reset(tenant_id.as_str());
        self.limiter.reset_prefix(&format!("{tenant_id}:"));
        if cancelled > 0 {
            info!(tenant_id = %tenant_id, cancelled, "pending batches cancelled");
        }
    }

    pub async fn shutdown(&self) {
        self.debounce.cancel_all().await;
    }

    fn flush_callback(&self, replies: mpsc::WeakSender<SessionCommand>) -> FlushCallback {
        let handler = Arc::clone(&self.handler);
        Arc::new(move |batch: InboundBatch| {
            let handler = Arc::clone(&handler);
            let replies = replies.clone();
            async move {
                // The handler may be slow; never hold up the flushing task.
                tokio::spawn(deliver(handler, batch, replies));
            }
            .boxed()
        })
    }
}

async fn deliver(
    handler: Arc<dyn InboundHandler>,
    batch: InboundBatch,
    replies: mpsc::WeakSender<SessionCommand>,
) {
    debug!(
        tenant_id = %batch.tenant_id,
        sender = %batch.sender,
        fragments = batch.fragments.len(),
        "handing batch to handler"
    );
    let reply = match handler.handle_inbound_batch(&batch).await {
        Ok(Some(reply)) if !reply.trim().is_empty() => reply,
        Ok(_) => return,
        Err(err) => {
            error!(tenant_id = %batch.tenant_id, sender = %batch.sender, error = %err, "inbound handler failed");
            return;
        }
    };

    let Some(commands) = replies.upgrade() else {
        warn!(tenant_id = %batch.tenant_id, "session ended before the reply could be sent");
        return;
    };
    let (tx, rx) = oneshot::channel();
    let command = SessionCommand::Send {
        message: OutboundMessage {
            recipient: batch.sender.clone(),
            text: reply,
            media_url: None,
        },
        reply: tx,
    };
    if commands.send(command).await.is_err() {
        warn!(tenant_id = %batch.tenant_id, "session ended before the reply could be sent");
        return;
    }
    drop(commands);
    match rx.await {
        Ok(Ok(id)) => debug!(tenant_id = %batch.tenant_id, message_id = %id, "reply sent"),
        Ok(Err(err)) => {
            warn!(tenant_id = %batch.tenant_id, sender = %batch.sender, error = %err, "reply not sent")
        }
        Err(_) => warn!(tenant_id = %batch.tenant_id, "session dropped the reply"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Notify;
    use tracing_test::traced_test;
    use zapline_core::{MessageId, ZaplineError};

    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        batches: Mutex<Vec<InboundBatch>>,
        cleared: Mutex<Vec<String>>,
        reply: Option<String>,
        notify: Notify,
    }

    #[async_trait]
    impl InboundHandler for RecordingHandler {
        async fn handle_inbound_batch(
            &self,
            batch: &InboundBatch,
        ) -> Result<Option<String>, ZaplineError> {
            self.batches.lock().unwrap().push(batch.clone());
            self.notify.notify_one();
            Ok(self.reply.clone())
        }

        async fn clear_context(&self, _tenant: &TenantId, sender: &str) -> Result<(), ZaplineError> {
            self.cleared.lock().unwrap().push(sender.to_string());
            Ok(())
        }
    }

    fn message(id: &str, sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            id: MessageId::from(id),
            sender: sender.to_string(),
            text: text.to_string(),
            from_me: false,
            push_name: None,
            timestamp: Utc::now(),
        }
    }

    fn settings(max_requests: usize) -> SessionSettings {
        let mut settings = SessionSettings::default();
        settings.rate_limit.max_requests = max_requests;
        settings
    }

    fn no_replies() -> mpsc::WeakSender<SessionCommand> {
        let (tx, _rx) = mpsc::channel(1);
        tx.downgrade()
    }

    #[tokio::test(start_paused = true)]
    async fn own_and_empty_messages_are_ignored() {
        let handler = Arc::new(RecordingHandler::default());
        let pipeline = InboundPipeline::new(&settings(5), handler);
        let tenant = TenantId::from("acme");

        let mut own = message("m1", "5511", "hi");
        own.from_me = true;
        assert_eq!(
            pipeline.ingest(&tenant, own, no_replies()).await,
            IngestOutcome::Ignored
        );
        assert_eq!(
            pipeline
                .ingest(&tenant, message("m2", "5511", "  "), no_replies())
                .await,
            IngestOutcome::Ignored
        );
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn over_limit_messages_are_dropped() {
        let handler = Arc::new(RecordingHandler::default());
        let pipeline = InboundPipeline::new(&settings(2), handler);
        let tenant = TenantId::from("acme");

        for id in ["m1", "m2"] {
            let outcome = pipeline
                .ingest(&tenant, message(id, "5511", "oi"), no_replies())
                .await;
            assert!(matches!(outcome, IngestOutcome::Buffered { .. }));
        }
        assert_eq!(
            pipeline
                .ingest(&tenant, message("m3", "5511", "oi"), no_replies())
                .await,
            IngestOutcome::RateLimited
        );
        assert!(logs_contain("inbound message rate limited"));
        // Another sender has its own window.
        assert!(matches!(
            pipeline
                .ingest(&tenant, message("m4", "5522", "oi"), no_replies())
                .await,
            IngestOutcome::Buffered { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_is_routed_back_to_the_session() {
        let handler = Arc::new(RecordingHandler {
            reply: Some("temos 3 opções".into()),
            ..Default::default()
        });
        let pipeline = InboundPipeline::new(&settings(5), handler.clone());
        let tenant = TenantId::from("acme");
        let (tx, mut rx) = mpsc::channel(4);

        pipeline
            .ingest(&tenant, message("m1", "5511@s.whatsapp.net", "oi"), tx.downgrade())
            .await;
        tokio::time::advance(Duration::from_secs(4)).await;

        match rx.recv().await {
            Some(SessionCommand::Send { message, reply }) => {
                assert_eq!(message.recipient, "5511@s.whatsapp.net");
                assert_eq!(message.text, "temos 3 opções");
                let _ = reply.send(Ok(MessageId::from("out-1")));
            }
            _ => panic!("expected a send command"),
        }
        assert_eq!(handler.batches.lock().unwrap()[0].text, "oi");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_sender_reaches_the_handler() {
        let handler = Arc::new(RecordingHandler::default());
        let pipeline = InboundPipeline::new(&settings(5), handler.clone());
        let tenant = TenantId::from("acme");

        pipeline
            .ingest(&tenant, message("m1", "5511", "oi"), no_replies())
            .await;
        pipeline.clear_sender(&tenant, "5511").await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert!(handler.batches.lock().unwrap().is_empty());
        assert_eq!(handler.cleared.lock().unwrap().as_slice(), ["5511"]);
    }
}
