// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session manager: one table of connection actors keyed by tenant.
//!
//! The table sits behind a single lock that is never held across an await
//! on an actor, so status reads stay cheap while sessions connect, reconnect
//! or tear down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zapline_core::{
    CredentialStore, FailureReason, GatewayConnector, InboundHandler, InboundMessage, MessageId,
    OutboundMessage, SessionState, SessionStatus, TenantId, TenantResolver, ZaplineError,
};
use zapline_resilience::TtlCache;

use crate::command::{SessionCommand, SessionLink};
use crate::connection::{SessionDeps, SpawnedSession, spawn_session};
use crate::events::SessionEvent;
use crate::inbound::{InboundPipeline, IngestOutcome};
use crate::outbound;
use crate::settings::SessionSettings;

/// Buffered events per subscriber before lagging receivers miss some.
const EVENT_BUS_CAPACITY: usize = 256;

/// Result of [`SessionManager::initialize_session`].
#[derive(Debug, Clone, PartialEq)]
pub struct InitializeOutcome {
    pub status: SessionStatus,
    /// The tenant was already CONNECTED; nothing was started.
    pub already_connected: bool,
    /// A new actor was spawned by this call.
    pub created: bool,
}

struct SessionEntry {
    link: SessionLink,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ManagerInner {
    deps: SessionDeps,
    resolver: Option<Arc<dyn TenantResolver>>,
    sessions: Mutex<HashMap<TenantId, SessionEntry>>,
    /// Last status of torn-down tenants, so they read DISCONNECTED for a while.
    tombstones: StdMutex<TtlCache<TenantId, SessionStatus>>,
    bus: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    settings: SessionSettings,
    connector: Arc<dyn GatewayConnector>,
    store: Arc<dyn CredentialStore>,
    handler: Arc<dyn InboundHandler>,
    resolver: Option<Arc<dyn TenantResolver>>,
    shutdown: Option<CancellationToken>,
}

impl SessionManagerBuilder {
    /// Routes externally delivered messages to tenants by business phone.
    pub fn with_tenant_resolver(mut self, resolver: Arc<dyn TenantResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Ties every session to a parent token, e.g. the process shutdown token.
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn build(self) -> SessionManager {
        let settings = Arc::new(self.settings);
        let pipeline = Arc::new(InboundPipeline::new(&settings, self.handler));
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let tombstones = TtlCache::new(settings.tombstone_ttl);
        SessionManager {
            inner: Arc::new(ManagerInner {
                deps: SessionDeps {
                    settings,
                    connector: self.connector,
                    store: self.store,
                    pipeline,
                },
                resolver: self.resolver,
                sessions: Mutex::new(HashMap::new()),
                tombstones: StdMutex::new(tombstones),
                bus,
                shutdown: self.shutdown.unwrap_or_default(),
            }),
        }
    }
}

/// Owns every tenant's connection session.
///
/// Cheap to clone; clones share the same session table.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn builder(
        settings: SessionSettings,
        connector: Arc<dyn GatewayConnector>,
        store: Arc<dyn CredentialStore>,
        handler: Arc<dyn InboundHandler>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            settings,
            connector,
            store,
            handler,
            resolver: None,
            shutdown: None,
        }
    }

    /// Manager with no tenant resolver and its own shutdown token.
    pub fn new(
        settings: SessionSettings,
        connector: Arc<dyn GatewayConnector>,
        store: Arc<dyn CredentialStore>,
        handler: Arc<dyn InboundHandler>,
    ) -> Self {
        Self::builder(settings, connector, store, handler).build()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.deps.settings
    }

    pub fn pipeline(&self) -> &InboundPipeline {
        &self.inner.deps.pipeline
    }

    /// Starts (or reuses) the tenant's session.
    ///
    /// A live session is never duplicated. Otherwise a fresh actor is
    /// spawned and this call waits, at most `initialize_wait`, for a QR code,
    /// a connection or a terminal state.
    pub async fn initialize_session(
        &self,
        tenant_id: &TenantId,
    ) -> Result<InitializeOutcome, ZaplineError> {
        ensure_tenant(tenant_id)?;

        let (mut status, created) = {
            let mut sessions = self.inner.sessions.lock().await;
            let reusable = sessions.get(tenant_id).and_then(|entry| {
                let state = entry.link.status.borrow().status;
                state.is_live().then(|| (entry.link.status.clone(), state))
            });
            match reusable {
                Some((status, SessionState::Connected)) => {
                    info!(tenant_id = %tenant_id, "session already connected");
                    return Ok(InitializeOutcome {
                        status: status.borrow().clone(),
                        already_connected: true,
                        created: false,
                    });
                }
                Some((status, state)) => {
                    debug!(tenant_id = %tenant_id, state = %state, "reusing in-flight session");
                    (status, false)
                }
                None => {
                    if let Some(stale) = sessions.remove(tenant_id) {
                        debug!(tenant_id = %tenant_id, "replacing terminal session");
                        stale.cancel.cancel();
                    }
                    let entry = self.spawn_entry(tenant_id);
                    let status = entry.link.status.clone();
                    sessions.insert(tenant_id.clone(), entry);
                    (status, true)
                }
            }
        };

        let status = wait_until_settled(&mut status, self.inner.deps.settings.initialize_wait).await;
        Ok(InitializeOutcome {
            already_connected: false,
            created,
            status,
        })
    }

    /// Current snapshot for a tenant. Never waits on the actor.
    pub async fn get_session_status(&self, tenant_id: &TenantId) -> SessionStatus {
        if let Some(entry) = self.inner.sessions.lock().await.get(tenant_id) {
            return entry.link.snapshot();
        }
        self.tombstones()
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| SessionStatus::uninitialized(tenant_id.clone()))
    }

    /// Snapshots of every session in the table.
    pub async fn list_sessions(&self) -> Vec<SessionStatus> {
        let sessions = self.inner.sessions.lock().await;
        let mut statuses: Vec<SessionStatus> =
            sessions.values().map(|entry| entry.link.snapshot()).collect();
        statuses.sort_by(|a, b| a.tenant_id.as_str().cmp(b.tenant_id.as_str()));
        statuses
    }

    /// Tears a tenant's session down.
    ///
    /// Pending backoff and debounce timers are cancelled and the socket is
    /// closed. Stored credentials are deleted only when `logout` is set.
    pub async fn disconnect_session(
        &self,
        tenant_id: &TenantId,
        logout: bool,
    ) -> Result<SessionStatus, ZaplineError> {
        ensure_tenant(tenant_id)?;
        let entry = self.inner.sessions.lock().await.remove(tenant_id);
        self.inner.deps.pipeline.cancel_tenant(tenant_id).await;

        let status = match entry {
            Some(entry) => self.teardown_entry(tenant_id, entry, logout).await,
            None => {
                if logout {
                    self.inner.deps.store.delete(tenant_id).await?;
                }
                let mut status = self
                    .tombstones()
                    .get(tenant_id)
                    .cloned()
                    .unwrap_or_else(|| SessionStatus::uninitialized(tenant_id.clone()));
                mark_disconnected(&mut status, logout.then_some(FailureReason::LoggedOut));
                status
            }
        };

        self.tombstones().insert(tenant_id.clone(), status.clone());
        info!(tenant_id = %tenant_id, logout, "session disconnected");
        Ok(status)
    }

    /// Sends a message through the tenant's live socket.
    pub async fn send_message(
        &self,
        tenant_id: &TenantId,
        message: OutboundMessage,
    ) -> Result<MessageId, ZaplineError> {
        ensure_tenant(tenant_id)?;
        outbound::prepare(&message)?;

        let link = self.connected_link(tenant_id).await?;
        let (reply, rx) = oneshot::channel();
        link.commands
            .send(SessionCommand::Send { message, reply })
            .await
            .map_err(|_| ZaplineError::NotConnected {
                tenant_id: tenant_id.clone(),
                state: SessionState::Disconnected,
            })?;
        rx.await.map_err(|_| ZaplineError::SocketClosed {
            reason: "session ended before the send completed".to_string(),
        })?
    }

    /// Forgets buffered fragments and downstream context for one sender.
    pub async fn clear_sender_context(
        &self,
        tenant_id: &TenantId,
        sender: &str,
    ) -> Result<(), ZaplineError> {
        ensure_tenant(tenant_id)?;
        if sender.trim().is_empty() {
            return Err(ZaplineError::InvalidInput("sender must not be empty".to_string()));
        }
        self.inner
            .deps
            .pipeline
            .clear_sender(tenant_id, sender.trim())
            .await
    }

    /// Feeds a message that arrived outside the gateway (e.g. a webhook)
    /// into the pipeline of the tenant owning `business_phone`.
    pub async fn ingest_external(
        &self,
        business_phone: &str,
        message: InboundMessage,
    ) -> Result<(TenantId, IngestOutcome), ZaplineError> {
        let resolver = self
            .inner
            .resolver
            .as_ref()
            .ok_or_else(|| ZaplineError::Config("no tenant resolver configured".to_string()))?;
        let tenant_id = resolver
            .resolve_tenant_for_sender(business_phone)
            .await?
            .ok_or_else(|| {
                ZaplineError::InvalidInput(format!("no tenant owns phone {business_phone}"))
            })?;

        let link = self.connected_link(&tenant_id).await?;
        let outcome = self
            .inner
            .deps
            .pipeline
            .ingest(&tenant_id, message, link.commands.downgrade())
            .await;
        Ok((tenant_id, outcome))
    }

    /// Receives every session event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.bus.subscribe()
    }

    /// Reclaims sessions that are not connected and have been idle longer
    /// than `idle_timeout` as of `now`. Credentials are kept.
    pub async fn reap_idle_at(&self, now: DateTime<Utc>) -> Vec<TenantId> {
        let idle_timeout = self.inner.deps.settings.idle_timeout;
        let stale: Vec<(TenantId, SessionEntry)> = {
            let mut sessions = self.inner.sessions.lock().await;
            let tenants: Vec<TenantId> = sessions
                .iter()
                .filter(|(_, entry)| is_idle(&entry.link.snapshot(), now, idle_timeout))
                .map(|(tenant_id, _)| tenant_id.clone())
                .collect();
            tenants
                .into_iter()
                .filter_map(|tenant_id| {
                    sessions
                        .remove(&tenant_id)
                        .map(|entry| (tenant_id, entry))
                })
                .collect()
        };

        let mut reaped = Vec::with_capacity(stale.len());
        for (tenant_id, entry) in stale {
            self.inner.deps.pipeline.cancel_tenant(&tenant_id).await;
            let mut status = self.teardown_entry(&tenant_id, entry, false).await;
            if status.reason.is_none() {
                status.reason = Some(FailureReason::Idle);
            }
            self.tombstones().insert(tenant_id.clone(), status);
            info!(tenant_id = %tenant_id, "idle session reclaimed");
            reaped.push(tenant_id);
        }
        reaped
    }

    pub async fn reap_idle(&self) -> Vec<TenantId> {
        self.reap_idle_at(Utc::now()).await
    }

    /// Pauses every session (credentials kept) and stops accepting work.
    pub async fn shutdown(&self) {
        self.inner.deps.pipeline.shutdown().await;
        let entries: Vec<(TenantId, SessionEntry)> =
            self.inner.sessions.lock().await.drain().collect();
        info!(sessions = entries.len(), "pausing sessions for shutdown");
        let teardowns = entries
            .into_iter()
            .map(|(tenant_id, entry)| async move {
                let status = self.teardown_entry(&tenant_id, entry, false).await;
                self.tombstones().insert(tenant_id, status);
            });
        futures::future::join_all(teardowns).await;
        self.inner.shutdown.cancel();
    }

    fn spawn_entry(&self, tenant_id: &TenantId) -> SessionEntry {
        let cancel = self.inner.shutdown.child_token();
        let SpawnedSession { link, task, events } =
            spawn_session(tenant_id.clone(), self.inner.deps.clone(), cancel.clone());
        tokio::spawn(forward_events(events, self.inner.bus.clone()));
        self.tombstones().remove(tenant_id);
        SessionEntry { link, cancel, task }
    }

    /// Asks an actor to stop, then cancels it if it does not acknowledge.
    async fn teardown_entry(
        &self,
        tenant_id: &TenantId,
        entry: SessionEntry,
        logout: bool,
    ) -> SessionStatus {
        let SessionEntry {
            link,
            cancel,
            mut task,
        } = entry;
        let limit = self.inner.deps.settings.disconnect_timeout;

        let (reply, ack) = oneshot::channel();
        let acked = match link
            .commands
            .send(SessionCommand::Disconnect { logout, reply })
            .await
        {
            Ok(()) => tokio::time::timeout(limit, ack).await.is_ok_and(|r| r.is_ok()),
            Err(_) => false,
        };
        if !acked {
            warn!(tenant_id = %tenant_id, "session did not acknowledge teardown, cancelling");
        }
        cancel.cancel();
        if tokio::time::timeout(limit, &mut task).await.is_err() {
            warn!(tenant_id = %tenant_id, "session task did not stop, aborting");
            task.abort();
        }

        if logout && !acked {
            if let Err(err) = self.inner.deps.store.delete(tenant_id).await {
                warn!(tenant_id = %tenant_id, error = %err, "failed to delete credentials");
            }
        }

        let mut status = link.snapshot();
        mark_disconnected(&mut status, logout.then_some(FailureReason::LoggedOut));
        status
    }

    async fn connected_link(&self, tenant_id: &TenantId) -> Result<SessionLink, ZaplineError> {
        let link = self
            .inner
            .sessions
            .lock()
            .await
            .get(tenant_id)
            .map(|entry| entry.link.clone());
        let state = match &link {
            Some(link) => link.status.borrow().status,
            None => self
                .tombstones()
                .get(tenant_id)
                .map_or(SessionState::Uninitialized, |status| status.status),
        };
        match link {
            Some(link) if state == SessionState::Connected => Ok(link),
            _ => Err(ZaplineError::NotConnected {
                tenant_id: tenant_id.clone(),
                state,
            }),
        }
    }

    fn tombstones(&self) -> std::sync::MutexGuard<'_, TtlCache<TenantId, SessionStatus>> {
        self.inner
            .tombstones
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_tenant(tenant_id: &TenantId) -> Result<(), ZaplineError> {
    if tenant_id.as_str().trim().is_empty() {
        return Err(ZaplineError::InvalidInput("tenant id must not be empty".to_string()));
    }
    Ok(())
}

fn mark_disconnected(status: &mut SessionStatus, reason: Option<FailureReason>) {
    status.status = SessionState::Disconnected;
    status.connected = false;
    status.qr_code = None;
    if reason.is_some() {
        status.reason = reason;
    }
}

/// Connected sessions and sessions still working through their reconnect
/// backoff are never idle, however old their last activity is.
fn is_idle(status: &SessionStatus, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
    let retrying = status.status == SessionState::Reconnecting
        || (status.reconnect_attempts > 0 && !status.status.is_terminal());
    if status.status == SessionState::Connected || retrying {
        return false;
    }
    let Some(last) = status.last_activity_at else {
        return false;
    };
    (now - last)
        .to_std()
        .is_ok_and(|elapsed| elapsed >= idle_timeout)
}

/// Waits for a QR, a connection or a terminal state, whichever comes first.
async fn wait_until_settled(
    status: &mut watch::Receiver<SessionStatus>,
    limit: Duration,
) -> SessionStatus {
    let settled = tokio::time::timeout(
        limit,
        status.wait_for(|s| match s.status {
            SessionState::AwaitingQrScan => s.qr_code.is_some(),
            SessionState::Connected | SessionState::Failed | SessionState::Disconnected => true,
            _ => false,
        }),
    )
    .await
    .ok()
    .and_then(Result::ok)
    .map(|snapshot| (*snapshot).clone());
    settled.unwrap_or_else(|| status.borrow().clone())
}

/// Drains one actor's events onto the shared bus.
async fn forward_events(
    mut events: mpsc::Receiver<SessionEvent>,
    bus: broadcast::Sender<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        debug!(tenant_id = %event.tenant_id(), kind = event.kind(), "session event");
        // No subscribers is fine.
        let _ = bus.send(event);
    }
}
