// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging gateway traits: opening connections and writing to them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CredentialBlob, GatewayEvent, MessageId, TenantId};

/// Write side of an open gateway connection.
#[async_trait]
pub trait GatewaySocket: Send + Sync {
    /// Sends a text message to a normalized recipient address.
    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId, ZaplineError>;

    /// Sends a media message by URL with an optional caption.
    async fn send_media(
        &self,
        to: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, ZaplineError>;

    /// Unlinks this device from the account. Stored credentials become invalid.
    async fn logout(&self) -> Result<(), ZaplineError>;

    /// Closes the connection without unlinking.
    async fn close(&self) -> Result<(), ZaplineError>;
}

/// An open connection: its socket plus the ordered event stream.
///
/// The stream ending without a `Closed` event counts as a lost connection.
pub struct GatewayConnection {
    pub socket: Arc<dyn GatewaySocket>,
    pub events: mpsc::Receiver<GatewayEvent>,
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection").finish_non_exhaustive()
    }
}

/// Opens WhatsApp connections on behalf of tenants.
#[async_trait]
pub trait GatewayConnector: PluginAdapter {
    /// Opens a connection. With credentials the gateway resumes the linked
    /// device, otherwise it starts pairing and emits QR events.
    async fn connect(
        &self,
        tenant_id: &TenantId,
        credentials: Option<CredentialBlob>,
    ) -> Result<GatewayConnection, ZaplineError>;
}
