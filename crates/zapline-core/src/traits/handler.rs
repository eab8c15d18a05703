// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downstream collaborators: inbound handling and tenant resolution.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::types::{InboundBatch, TenantId};

/// Receives coalesced customer messages and optionally produces a reply.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// Handles one flushed batch. `Some(text)` is sent back to the sender.
    async fn handle_inbound_batch(&self, batch: &InboundBatch)
    -> Result<Option<String>, ZaplineError>;

    /// Forgets any conversation context kept for a sender.
    async fn clear_context(&self, tenant_id: &TenantId, sender: &str) -> Result<(), ZaplineError>;
}

/// Maps a business phone number to the tenant that owns it.
#[async_trait]
pub trait TenantResolver: Send + Sync + 'static {
    async fn resolve_tenant_for_sender(
        &self,
        phone_number: &str,
    ) -> Result<Option<TenantId>, ZaplineError>;
}
