// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the session manager, its collaborators and the
//! HTTP surface.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ZaplineError;

/// Identifies one business tenant. At most one live session exists per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    /// Parses a caller-supplied tenant id, rejecting blank values.
    pub fn parse(raw: &str) -> Result<Self, ZaplineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ZaplineError::InvalidInput("tenant id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Unique identifier for a WhatsApp message, assigned by the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle state of a tenant's connection session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Uninitialized,
    Connecting,
    AwaitingQrScan,
    Connected,
    Reconnecting,
    Disconnected,
    Failed,
}

impl SessionState {
    /// Whether a transition from `self` to `next` is part of the lifecycle.
    ///
    /// Any live state may be torn down to `Disconnected` by an explicit
    /// disconnect. `Failed` can only leave through teardown.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, Connecting)
                | (Connecting, AwaitingQrScan | Connected | Failed | Disconnected)
                | (AwaitingQrScan, Connecting | Connected | Failed | Disconnected)
                | (Connected, Reconnecting | Disconnected)
                | (Reconnecting, Connected | AwaitingQrScan | Failed | Disconnected)
                | (Failed, Disconnected)
        )
    }

    /// Terminal states stay put until the tenant is explicitly re-initialized.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }

    /// States in which a repeated initialize reuses the running session.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::AwaitingQrScan
                | SessionState::Connected
                | SessionState::Reconnecting
        )
    }
}

/// User-visible reason code attached to FAILED and DISCONNECTED sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    PairingTimeout,
    ReconnectExhausted,
    HandshakeFailed,
    StorageUnavailable,
    LoggedOut,
    Idle,
}

/// Point-in-time view of a session, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub tenant_id: TenantId,
    pub status: SessionState,
    pub connected: bool,
    pub qr_code: Option<String>,
    pub phone_number: Option<String>,
    pub business_name: Option<String>,
    pub reason: Option<FailureReason>,
    pub reconnect_attempts: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    /// Status reported for a tenant that has never been initialized.
    pub fn uninitialized(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            status: SessionState::Uninitialized,
            connected: false,
            qr_code: None,
            phone_number: None,
            business_name: None,
            reason: None,
            reconnect_attempts: 0,
            last_activity_at: None,
        }
    }
}

/// Opaque authentication material produced by the gateway during pairing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBlob(pub Vec<u8>);

impl CredentialBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialBlob({} bytes)", self.0.len())
    }
}

/// A message received from an end customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    /// Sender address as delivered by the network (JID or bare phone number).
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A reply or proactive message to an end customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: String,
    pub text: String,
    #[serde(default)]
    pub media_url: Option<String>,
}

/// Coalesced inbound text handed to the downstream handler.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundBatch {
    pub tenant_id: TenantId,
    pub sender: String,
    /// Fragments joined in arrival order.
    pub text: String,
    pub fragments: Vec<String>,
    pub message_ids: Vec<MessageId>,
    pub first_received_at: DateTime<Utc>,
}

/// Why a gateway connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Network or protocol drop; the session may resume with stored credentials.
    ConnectionLost(String),
    /// The phone unlinked this device; stored credentials are no longer valid.
    LoggedOut,
    /// The gateway refused the handshake.
    HandshakeFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectionLost(detail) => write!(f, "connection lost: {detail}"),
            CloseReason::LoggedOut => f.write_str("logged out"),
            CloseReason::HandshakeFailed(detail) => write!(f, "handshake failed: {detail}"),
        }
    }
}

/// Ordered events emitted by one gateway connection.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A fresh pairing QR payload. Supersedes any earlier one.
    Qr { code: String },
    /// Pairing or resume completed.
    Connected {
        phone_number: String,
        business_name: Option<String>,
    },
    /// Credentials changed and must be persisted before anything else happens.
    CredentialsUpdated(CredentialBlob),
    /// An inbound customer message.
    Message(InboundMessage),
    /// The connection ended. No further events follow.
    Closed(CloseReason),
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of pluggable adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    CredentialStore,
    Gateway,
}
