// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Zapline session orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::types::{SessionState, TenantId};

/// The primary error type used across all Zapline adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ZaplineError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential storage errors (I/O failure, database failure, corrupt blob).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging gateway errors (socket failure, protocol error).
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The gateway refused a request outright; repeating it will not help.
    #[error("gateway rejected the request: {message}")]
    Rejected { message: String },

    /// The downstream inbound handler failed.
    #[error("handler error: {message}")]
    Handler {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Caller input was rejected before any work happened.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation that needs a live connection found the tenant in another state.
    #[error("tenant {tenant_id} is not connected (state: {state})")]
    NotConnected {
        tenant_id: TenantId,
        state: SessionState,
    },

    /// Pairing gave up after too many QR rotations without a scan.
    #[error("pairing timed out for tenant {tenant_id} after {rotations} QR rotations")]
    PairingTimeout { tenant_id: TenantId, rotations: u32 },

    /// Reconnection gave up after the configured number of consecutive failures.
    #[error("reconnect exhausted for tenant {tenant_id} after {attempts} attempts")]
    ReconnectExhausted { tenant_id: TenantId, attempts: u32 },

    /// The underlying socket closed while an operation was in flight.
    #[error("socket closed: {reason}")]
    SocketClosed { reason: String },

    /// A sliding-window limit rejected the request.
    #[error("rate limit exceeded for {key}")]
    RateLimited { key: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZaplineError {
    /// Builds a gateway error without an underlying source.
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a storage error from any error type.
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Storage { source: err.into() }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Gateway hiccups, socket closures and timeouts are transient. Input,
    /// state, storage errors and explicit gateway rejections are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Gateway { .. } | Self::SocketClosed { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ZaplineError::gateway("boom").is_transient());
        assert!(
            ZaplineError::SocketClosed {
                reason: "eof".into()
            }
            .is_transient()
        );
        assert!(
            ZaplineError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_transient()
        );
        assert!(!ZaplineError::InvalidInput("empty".into()).is_transient());
        assert!(
            !ZaplineError::Rejected {
                message: "not on WhatsApp".into()
            }
            .is_transient()
        );
        assert!(!ZaplineError::storage(std::io::Error::other("disk")).is_transient());
        assert!(
            !ZaplineError::NotConnected {
                tenant_id: TenantId::from("acme"),
                state: SessionState::Reconnecting,
            }
            .is_transient()
        );
    }

    #[test]
    fn not_connected_message_names_state() {
        let err = ZaplineError::NotConnected {
            tenant_id: TenantId::from("acme"),
            state: SessionState::AwaitingQrScan,
        };
        assert_eq!(
            err.to_string(),
            "tenant acme is not connected (state: AWAITING_QR_SCAN)"
        );
    }
}
