// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock downstream handler that records batches and optionally replies.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use zapline_core::{InboundBatch, InboundHandler, TenantId, ZaplineError};

/// Captures every flushed batch for assertions.
#[derive(Debug, Default)]
pub struct MockHandler {
    reply: Mutex<Option<String>>,
    fail: Mutex<bool>,
    batches: Mutex<Vec<InboundBatch>>,
    cleared: Mutex<Vec<(TenantId, String)>>,
    notify: Notify,
}

impl MockHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that answers every batch with `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        let handler = Self::default();
        handler.set_reply(Some(reply.into()));
        handler
    }

    pub fn set_reply(&self, reply: Option<String>) {
        *lock(&self.reply) = reply;
    }

    /// Makes every following batch fail.
    pub fn set_failing(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn batches(&self) -> Vec<InboundBatch> {
        lock(&self.batches).clone()
    }

    pub fn batch_count(&self) -> usize {
        lock(&self.batches).len()
    }

    /// Waits until at least `count` batches arrived.
    pub async fn wait_for_batches(&self, count: usize) -> Vec<InboundBatch> {
        loop {
            let notified = self.notify.notified();
            if self.batch_count() >= count {
                return self.batches();
            }
            notified.await;
        }
    }

    /// `(tenant, sender)` pairs whose context was cleared.
    pub fn cleared(&self) -> Vec<(TenantId, String)> {
        lock(&self.cleared).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl InboundHandler for MockHandler {
    async fn handle_inbound_batch(
        &self,
        batch: &InboundBatch,
    ) -> Result<Option<String>, ZaplineError> {
        lock(&self.batches).push(batch.clone());
        self.notify.notify_waiters();
        if *lock(&self.fail) {
            return Err(ZaplineError::Handler {
                message: "mock handler failure".to_string(),
                source: None,
            });
        }
        Ok(lock(&self.reply).clone())
    }

    async fn clear_context(&self, tenant_id: &TenantId, sender: &str) -> Result<(), ZaplineError> {
        lock(&self.cleared).push((tenant_id.clone(), sender.to_string()));
        Ok(())
    }
}
