// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Commands accepted by a connection actor.

use tokio::sync::{mpsc, oneshot, watch};
use zapline_core::{MessageId, OutboundMessage, SessionStatus, ZaplineError};

pub(crate) enum SessionCommand {
    /// Send through the live socket; fails with `NotConnected` otherwise.
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<Result<MessageId, ZaplineError>>,
    },
    /// Tear the session down. The actor exits after acknowledging.
    Disconnect {
        logout: bool,
        reply: oneshot::Sender<()>,
    },
}

/// The manager's handle on a running actor.
#[derive(Clone)]
pub(crate) struct SessionLink {
    pub commands: mpsc::Sender<SessionCommand>,
    pub status: watch::Receiver<SessionStatus>,
}

impl SessionLink {
    pub fn snapshot(&self) -> SessionStatus {
        self.status.borrow().clone()
    }
}
