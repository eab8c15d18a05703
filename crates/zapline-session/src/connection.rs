// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant connection actor.
//!
//! Each tenant gets one task that owns its [`TenantSession`], the open
//! gateway connection and the reconnect schedule. Gateway events and
//! manager commands are handled one at a time, in arrival order, so a
//! credential update is always persisted before the next event is looked at.
//!
//! ```text
//! UNINITIALIZED -> CONNECTING -> AWAITING_QR_SCAN -> CONNECTED
//!                      |  ^            |                |
//!                      |  +--(expired)-+                v
//!                      +-> FAILED <- RECONNECTING <-----+
//!                                    (any) -> DISCONNECTED
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use zapline_core::{
    CloseReason, CredentialStore, FailureReason, GatewayConnection, GatewayConnector,
    GatewayEvent, GatewaySocket, SessionState, SessionStatus, TenantId, ZaplineError,
};
use zapline_resilience::Backoff;

use crate::command::{SessionCommand, SessionLink};
use crate::events::SessionEvent;
use crate::inbound::InboundPipeline;
use crate::outbound::OutboundQueue;
use crate::settings::SessionSettings;
use crate::state::TenantSession;

/// Retry schedule for deleting credentials the gateway no longer honors.
const FORGET_RETRY: Backoff = Backoff {
    base: Duration::from_millis(100),
    max: Duration::from_secs(1),
    multiplier: 2,
    max_attempts: 3,
};

/// Collaborators shared by every actor of a manager.
#[derive(Clone)]
pub(crate) struct SessionDeps {
    pub settings: Arc<SessionSettings>,
    pub connector: Arc<dyn GatewayConnector>,
    pub store: Arc<dyn CredentialStore>,
    pub pipeline: Arc<InboundPipeline>,
}

pub(crate) struct SpawnedSession {
    pub link: SessionLink,
    pub task: JoinHandle<()>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Starts the actor for `tenant_id` in `CONNECTING`.
pub(crate) fn spawn_session(
    tenant_id: TenantId,
    deps: SessionDeps,
    cancel: CancellationToken,
) -> SpawnedSession {
    let capacity = deps.settings.channel_capacity;
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);

    let mut session = TenantSession::new(tenant_id);
    if let Err(err) = session.transition(SessionState::Connecting) {
        warn!(error = %err, "fresh session refused to start connecting");
    }
    let (status_tx, status_rx) = watch::channel(session.snapshot());

    let actor = ConnectionActor {
        session,
        deps,
        commands: command_rx,
        reply_path: command_tx.downgrade(),
        status: status_tx,
        events: event_tx,
        cancel,
    };
    let task = tokio::spawn(actor.run());

    SpawnedSession {
        link: SessionLink {
            commands: command_tx,
            status: status_rx,
        },
        task,
        events: event_rx,
    }
}

/// How a single gateway connection ended.
enum Drive {
    /// Torn down on request; the actor exits.
    Stopped,
    /// Reached FAILED or DISCONNECTED on its own; the actor parks.
    Terminal,
    /// The connection was lost and may be retried.
    Dropped(CloseReason),
}

struct ConnectionActor {
    session: TenantSession,
    deps: SessionDeps,
    commands: mpsc::Receiver<SessionCommand>,
    /// Handed to the inbound pipeline so replies come back through this actor.
    reply_path: mpsc::WeakSender<SessionCommand>,
    status: watch::Sender<SessionStatus>,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl ConnectionActor {
    async fn run(mut self) {
        let tenant_id = self.session.tenant_id().clone();
        info!(tenant_id = %tenant_id, "session actor started");
        self.emit(SessionEvent::StateChanged {
            tenant_id: tenant_id.clone(),
            from: SessionState::Uninitialized,
            to: SessionState::Connecting,
        })
        .await;

        match self.deps.store.load(&tenant_id).await {
            Ok(credentials) => {
                debug!(
                    tenant_id = %tenant_id,
                    resuming = credentials.is_some(),
                    "credentials loaded"
                );
                self.session.set_credentials(credentials);
            }
            Err(err) => {
                error!(tenant_id = %tenant_id, error = %err, "failed to load credentials");
                self.fail(FailureReason::StorageUnavailable).await;
                self.park().await;
                return;
            }
        }

        loop {
            let attempt = self.session.reconnect_attempts();
            if attempt > 0 {
                let delay = self.deps.settings.reconnect.delay_for(attempt);
                info!(
                    tenant_id = %tenant_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting after backoff"
                );
                self.emit(SessionEvent::Reconnecting {
                    tenant_id: tenant_id.clone(),
                    attempt,
                    delay,
                })
                .await;
                if !self.wait_backoff(delay).await {
                    break;
                }
            }

            let cancel = self.cancel.clone();
            let connector = Arc::clone(&self.deps.connector);
            let credentials = self.session.credentials().cloned();
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.teardown(None, false).await;
                    break;
                }
                result = connector.connect(&tenant_id, credentials) => result,
            };

            let outcome = match connected {
                Ok(connection) => self.drive(connection).await,
                Err(err) => {
                    warn!(tenant_id = %tenant_id, error = %err, "gateway connect failed");
                    Drive::Dropped(CloseReason::ConnectionLost(err.to_string()))
                }
            };

            match outcome {
                Drive::Stopped => break,
                Drive::Terminal => {
                    self.park().await;
                    break;
                }
                Drive::Dropped(reason) => {
                    if self.record_failure(&reason).await {
                        self.park().await;
                        break;
                    }
                }
            }
        }

        info!(tenant_id = %tenant_id, state = %self.session.state(), "session actor stopped");
    }

    /// Sleeps out a backoff delay while still answering commands.
    ///
    /// Returns `false` when the session was torn down during the wait.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.teardown(None, false).await;
                    return false;
                }
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Send { reply, .. }) => {
                        let _ = reply.send(Err(self.not_connected()));
                    }
                    Some(SessionCommand::Disconnect { logout, reply }) => {
                        debug!(tenant_id = %self.session.tenant_id(), "backoff cancelled by disconnect");
                        self.teardown(None, logout).await;
                        let _ = reply.send(());
                        return false;
                    }
                    None => {
                        self.teardown(None, false).await;
                        return false;
                    }
                },
                () = &mut sleep => return true,
            }
        }
    }

    /// Runs one gateway connection until it ends.
    async fn drive(&mut self, connection: GatewayConnection) -> Drive {
        let GatewayConnection { socket, mut events } = connection;
        let mut qr_deadline: Option<Instant> = None;
        let mut outbound = OutboundQueue::spawn(
            self.session.tenant_id().clone(),
            Arc::clone(&socket),
            self.deps.settings.send_retry,
            self.deps.settings.channel_capacity,
        );

        loop {
            let deadline = qr_deadline;
            let qr_expired = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.teardown(Some(socket.as_ref()), false).await;
                    return Drive::Stopped;
                }
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Send { message, reply }) => {
                        if self.session.state() == SessionState::Connected {
                            outbound.submit(message, reply);
                        } else {
                            let _ = reply.send(Err(self.not_connected()));
                        }
                    }
                    Some(SessionCommand::Disconnect { logout, reply }) => {
                        self.teardown(Some(socket.as_ref()), logout).await;
                        let _ = reply.send(());
                        return Drive::Stopped;
                    }
                    None => {
                        self.teardown(Some(socket.as_ref()), false).await;
                        return Drive::Stopped;
                    }
                },
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(outcome) = self
                            .on_gateway_event(event, socket.as_ref(), &mut qr_deadline)
                            .await
                        {
                            return outcome;
                        }
                    }
                    None => {
                        return Drive::Dropped(CloseReason::ConnectionLost(
                            "event stream ended".to_string(),
                        ));
                    }
                },
                Some(message_id) = outbound.delivered() => {
                    trace!(tenant_id = %self.session.tenant_id(), message_id = %message_id, "outbound delivered");
                    self.session.touch();
                    self.publish();
                }
                () = qr_expired => {
                    if let Some(outcome) = self.on_qr_expired(socket.as_ref(), &mut qr_deadline).await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn on_gateway_event(
        &mut self,
        event: GatewayEvent,
        socket: &dyn GatewaySocket,
        qr_deadline: &mut Option<Instant>,
    ) -> Option<Drive> {
        let tenant_id = self.session.tenant_id().clone();
        match event {
            GatewayEvent::Qr { code } => {
                match self.session.state() {
                    SessionState::AwaitingQrScan => {
                        // The gateway rotated the code; the previous one expired unscanned.
                        if self.session.record_qr_rotation() >= self.deps.settings.max_qr_rotations
                        {
                            return Some(self.pairing_timeout(socket).await);
                        }
                        self.set_state(SessionState::Connecting).await;
                    }
                    SessionState::Connecting | SessionState::Reconnecting => {}
                    other => {
                        warn!(tenant_id = %tenant_id, state = %other, "ignoring QR outside pairing");
                        return None;
                    }
                }
                self.set_state(SessionState::AwaitingQrScan).await;
                self.session.set_qr_code(code.clone());
                self.publish();
                *qr_deadline = Some(Instant::now() + self.deps.settings.qr_timeout);
                info!(tenant_id = %tenant_id, "QR code ready for scanning");
                self.emit(SessionEvent::QrCode { tenant_id, code }).await;
                None
            }

            GatewayEvent::CredentialsUpdated(blob) => {
                if let Err(err) = self.deps.store.save(&tenant_id, &blob).await {
                    error!(tenant_id = %tenant_id, error = %err, "failed to persist credentials");
                    if let Err(err) = socket.close().await {
                        debug!(tenant_id = %tenant_id, error = %err, "socket close failed");
                    }
                    self.fail(FailureReason::StorageUnavailable).await;
                    return Some(Drive::Terminal);
                }
                debug!(tenant_id = %tenant_id, bytes = blob.as_bytes().len(), "credentials persisted");
                self.session.set_credentials(Some(blob));
                None
            }

            GatewayEvent::Connected {
                phone_number,
                business_name,
            } => {
                *qr_deadline = None;
                if self.session.state() == SessionState::Connected {
                    return None;
                }
                self.session
                    .set_account(phone_number.clone(), business_name);
                self.session.touch();
                self.set_state(SessionState::Connected).await;
                info!(tenant_id = %tenant_id, phone_number = %phone_number, "session connected");
                self.emit(SessionEvent::Connected {
                    tenant_id,
                    phone_number,
                })
                .await;
                None
            }

            GatewayEvent::Message(message) => {
                self.session.touch();
                self.publish();
                self.emit(SessionEvent::MessageReceived {
                    tenant_id: tenant_id.clone(),
                    sender: message.sender.clone(),
                    message_id: message.id.clone(),
                })
                .await;
                if self.session.state() == SessionState::Connected {
                    let outcome = self
                        .deps
                        .pipeline
                        .ingest(&tenant_id, message, self.reply_path.clone())
                        .await;
                    trace!(tenant_id = %tenant_id, ?outcome, "inbound message ingested");
                } else {
                    debug!(
                        tenant_id = %tenant_id,
                        state = %self.session.state(),
                        "dropping message received before connect"
                    );
                }
                None
            }

            GatewayEvent::Closed(CloseReason::LoggedOut) => {
                warn!(tenant_id = %tenant_id, "device unlinked by the account owner");
                let reason = if self.forget_credentials().await {
                    FailureReason::LoggedOut
                } else {
                    // The next initialize would resume with rejected credentials.
                    FailureReason::StorageUnavailable
                };
                self.session.set_failure(reason);
                self.set_state(SessionState::Disconnected).await;
                self.emit(SessionEvent::Disconnected {
                    tenant_id,
                    logged_out: true,
                })
                .await;
                Some(Drive::Terminal)
            }

            GatewayEvent::Closed(CloseReason::HandshakeFailed(detail))
                if self.session.state() != SessionState::Connected =>
            {
                warn!(tenant_id = %tenant_id, detail = %detail, "gateway handshake failed");
                self.fail(FailureReason::HandshakeFailed).await;
                Some(Drive::Terminal)
            }

            GatewayEvent::Closed(reason) => Some(Drive::Dropped(reason)),
        }
    }

    async fn on_qr_expired(
        &mut self,
        socket: &dyn GatewaySocket,
        qr_deadline: &mut Option<Instant>,
    ) -> Option<Drive> {
        let rotations = self.session.record_qr_rotation();
        if rotations >= self.deps.settings.max_qr_rotations {
            return Some(self.pairing_timeout(socket).await);
        }
        info!(tenant_id = %self.session.tenant_id(), rotations, "QR expired without a scan");
        if self.session.state() == SessionState::AwaitingQrScan {
            self.set_state(SessionState::Connecting).await;
        }
        *qr_deadline = Some(Instant::now() + self.deps.settings.qr_timeout);
        None
    }

    async fn pairing_timeout(&mut self, socket: &dyn GatewaySocket) -> Drive {
        warn!(tenant_id = %self.session.tenant_id(), "QR never scanned, giving up on pairing");
        if let Err(err) = socket.close().await {
            debug!(tenant_id = %self.session.tenant_id(), error = %err, "socket close failed");
        }
        self.fail(FailureReason::PairingTimeout).await;
        Drive::Terminal
    }

    /// Counts a lost connection. Returns `true` once the retry budget is spent.
    ///
    /// Failed first connects count against the same budget as drops of an
    /// established session.
    async fn record_failure(&mut self, reason: &CloseReason) -> bool {
        match self.session.state() {
            SessionState::Connected => self.set_state(SessionState::Reconnecting).await,
            SessionState::AwaitingQrScan => self.set_state(SessionState::Connecting).await,
            _ => {}
        }

        let attempts = self.session.record_attempt();
        if self.deps.settings.reconnect.is_exhausted(attempts) {
            warn!(
                tenant_id = %self.session.tenant_id(),
                attempts,
                reason = %reason,
                "reconnect attempts exhausted"
            );
            self.fail(FailureReason::ReconnectExhausted).await;
            return true;
        }

        warn!(
            tenant_id = %self.session.tenant_id(),
            attempt = attempts,
            reason = %reason,
            "connection lost"
        );
        self.publish();
        false
    }

    /// Closes (or logs out of) the socket and moves to DISCONNECTED.
    async fn teardown(&mut self, socket: Option<&dyn GatewaySocket>, logout: bool) {
        let tenant_id = self.session.tenant_id().clone();
        if let Some(socket) = socket {
            let result = if logout {
                socket.logout().await
            } else {
                socket.close().await
            };
            if let Err(err) = result {
                warn!(tenant_id = %tenant_id, logout, error = %err, "socket teardown failed");
            }
        }
        if logout {
            self.forget_credentials().await;
            self.session.set_failure(FailureReason::LoggedOut);
        }
        if self.session.state() == SessionState::Disconnected {
            self.publish();
        } else {
            self.set_state(SessionState::Disconnected).await;
        }
        info!(tenant_id = %tenant_id, logout, "session torn down");
        self.emit(SessionEvent::Disconnected {
            tenant_id,
            logged_out: logout,
        })
        .await;
    }

    /// Drops the tenant's credentials from memory and from the store,
    /// retrying the delete a few times. Returns `false` if the store kept them.
    async fn forget_credentials(&mut self) -> bool {
        let tenant_id = self.session.tenant_id().clone();
        self.session.set_credentials(None);
        let mut failures = 0;
        loop {
            match self.deps.store.delete(&tenant_id).await {
                Ok(()) => return true,
                Err(err) => {
                    failures += 1;
                    if FORGET_RETRY.is_exhausted(failures) {
                        error!(tenant_id = %tenant_id, error = %err, "failed to delete credentials");
                        return false;
                    }
                    warn!(tenant_id = %tenant_id, attempt = failures, error = %err, "credential delete failed, retrying");
                    tokio::time::sleep(FORGET_RETRY.delay_for(failures)).await;
                }
            }
        }
    }

    /// Answers commands from a terminal state until torn down.
    async fn park(&mut self) {
        debug!(
            tenant_id = %self.session.tenant_id(),
            state = %self.session.state(),
            "session parked until re-initialized"
        );
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Send { reply, .. }) => {
                        let _ = reply.send(Err(self.not_connected()));
                    }
                    Some(SessionCommand::Disconnect { logout, reply }) => {
                        self.teardown(None, logout).await;
                        let _ = reply.send(());
                        return;
                    }
                    None => return,
                },
            }
        }
    }

    /// Moves to FAILED. A connected session cannot fail directly and is
    /// disconnected instead, keeping the reason.
    async fn fail(&mut self, reason: FailureReason) {
        self.session.set_failure(reason);
        let target = if self.session.state().can_transition_to(SessionState::Failed) {
            SessionState::Failed
        } else {
            SessionState::Disconnected
        };
        self.set_state(target).await;
        self.emit(SessionEvent::Failed {
            tenant_id: self.session.tenant_id().clone(),
            reason,
        })
        .await;
    }

    async fn set_state(&mut self, next: SessionState) {
        match self.session.transition(next) {
            Ok(from) => {
                info!(
                    tenant_id = %self.session.tenant_id(),
                    from = %from,
                    to = %next,
                    "session state changed"
                );
                self.publish();
                self.emit(SessionEvent::StateChanged {
                    tenant_id: self.session.tenant_id().clone(),
                    from,
                    to: next,
                })
                .await;
            }
            Err(err) => warn!(error = %err, "state change rejected"),
        }
    }

    fn not_connected(&self) -> ZaplineError {
        ZaplineError::NotConnected {
            tenant_id: self.session.tenant_id().clone(),
            state: self.session.state(),
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.session.snapshot());
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            trace!(tenant_id = %self.session.tenant_id(), "no event listener");
        }
    }
}
