// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downstream inbound handlers.
//!
//! [`WebhookHandler`] forwards coalesced batches to an HTTP service and relays
//! its reply. [`LoggingHandler`] is used when no downstream URL is configured.

pub mod client;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use zapline_config::model::HandlerConfig;
use zapline_core::{InboundBatch, InboundHandler, TenantId, ZaplineError};

pub use client::WebhookHandler;

/// Logs every batch and never replies.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl InboundHandler for LoggingHandler {
    async fn handle_inbound_batch(
        &self,
        batch: &InboundBatch,
    ) -> Result<Option<String>, ZaplineError> {
        info!(
            tenant_id = %batch.tenant_id,
            sender = %batch.sender,
            fragments = batch.fragments.len(),
            "inbound batch received (no handler configured)"
        );
        Ok(None)
    }

    async fn clear_context(&self, _tenant_id: &TenantId, _sender: &str) -> Result<(), ZaplineError> {
        Ok(())
    }
}

/// Builds the configured inbound handler.
pub fn handler_from_config(config: &HandlerConfig) -> Result<Arc<dyn InboundHandler>, ZaplineError> {
    match config.url.as_deref() {
        Some(url) => {
            info!(url, "forwarding inbound batches to webhook");
            Ok(Arc::new(WebhookHandler::from_config(config, url)?))
        }
        None => Ok(Arc::new(LoggingHandler)),
    }
}
