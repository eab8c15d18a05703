// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed lifecycle events published by connection actors.

use std::time::Duration;

use zapline_core::{FailureReason, MessageId, SessionState, TenantId};

/// Something observable happened to a tenant's session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        tenant_id: TenantId,
        from: SessionState,
        to: SessionState,
    },
    /// A fresh pairing code is being served.
    QrCode { tenant_id: TenantId, code: String },
    Connected {
        tenant_id: TenantId,
        phone_number: String,
    },
    /// A retry is scheduled after `delay`.
    Reconnecting {
        tenant_id: TenantId,
        attempt: u32,
        delay: Duration,
    },
    Failed {
        tenant_id: TenantId,
        reason: FailureReason,
    },
    Disconnected {
        tenant_id: TenantId,
        logged_out: bool,
    },
    MessageReceived {
        tenant_id: TenantId,
        sender: String,
        message_id: MessageId,
    },
}

impl SessionEvent {
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            SessionEvent::StateChanged { tenant_id, .. }
            | SessionEvent::QrCode { tenant_id, .. }
            | SessionEvent::Connected { tenant_id, .. }
            | SessionEvent::Reconnecting { tenant_id, .. }
            | SessionEvent::Failed { tenant_id, .. }
            | SessionEvent::Disconnected { tenant_id, .. }
            | SessionEvent::MessageReceived { tenant_id, .. } => tenant_id,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::StateChanged { .. } => "state_changed",
            SessionEvent::QrCode { .. } => "qr_code",
            SessionEvent::Connected { .. } => "connected",
            SessionEvent::Reconnecting { .. } => "reconnecting",
            SessionEvent::Failed { .. } => "failed",
            SessionEvent::Disconnected { .. } => "disconnected",
            SessionEvent::MessageReceived { .. } => "message_received",
        }
    }
}
