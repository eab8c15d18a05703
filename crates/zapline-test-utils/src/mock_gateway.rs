// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock gateway connector for deterministic session tests.
//!
//! `MockGateway` implements `GatewayConnector` with scripted connection
//! behavior and manual event injection into the currently open connection.
//! Every connection shares one [`MockSocket`] that captures outbound traffic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use zapline_core::{
    AdapterType, CloseReason, CredentialBlob, GatewayConnection, GatewayConnector, GatewayEvent,
    GatewaySocket, HealthStatus, InboundMessage, MessageId, PluginAdapter, TenantId,
    ZaplineError,
};

/// Phone number reported by mock connections.
pub const MOCK_PHONE: &str = "5511400000000";
/// Business name reported by mock connections.
pub const MOCK_BUSINESS: &str = "Mock Imóveis";
/// Blob emitted when a mock QR scan completes.
pub const MOCK_CREDENTIALS: &[u8] = b"mock-paired-credentials";

/// What the next `connect` call does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectScript {
    /// Resume when credentials are given, otherwise start pairing with a QR.
    Auto,
    /// `connect` itself fails with a gateway error.
    Fail(String),
    /// The connection opens and its event stream ends immediately.
    DropImmediately,
    /// The connection opens and stays quiet until events are injected.
    Silent,
}

/// An outbound message captured by [`MockSocket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub text: Option<String>,
    pub media_url: Option<String>,
}

/// Records everything written to the gateway.
#[derive(Debug, Default)]
pub struct MockSocket {
    sent: Mutex<Vec<SentMessage>>,
    transient_failures: AtomicU32,
    stall: AtomicBool,
    stalled: AtomicUsize,
    logouts: AtomicUsize,
    closes: AtomicUsize,
    notify: Notify,
}

impl MockSocket {
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Waits until at least `count` messages were sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<SentMessage> {
        loop {
            let notified = self.notify.notified();
            if self.sent_count() >= count {
                return self.sent_messages();
            }
            notified.await;
        }
    }

    /// The next `times` sends fail with a transient gateway error.
    pub fn fail_next_sends(&self, times: u32) {
        self.transient_failures.store(times, Ordering::SeqCst);
    }

    /// While set, sends never complete, like writes to a wedged gateway.
    pub fn stall_sends(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    /// Waits until at least `count` sends are hanging.
    pub async fn wait_for_stalled(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.stalled.load(Ordering::SeqCst) >= count {
                return;
            }
            notified.await;
        }
    }

    async fn maybe_stall(&self) {
        if self.stall.load(Ordering::SeqCst) {
            self.stalled.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_waiters();
            std::future::pending::<()>().await;
        }
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record(&self, message: SentMessage) -> Result<MessageId, ZaplineError> {
        let left = self.transient_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.transient_failures.store(left - 1, Ordering::SeqCst);
            return Err(ZaplineError::gateway("mock socket busy"));
        }
        let mut sent = lock(&self.sent);
        sent.push(message);
        let id = MessageId(format!("mock-out-{}", sent.len()));
        drop(sent);
        self.notify.notify_waiters();
        Ok(id)
    }
}

#[async_trait]
impl GatewaySocket for MockSocket {
    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId, ZaplineError> {
        self.maybe_stall().await;
        self.record(SentMessage {
            to: to.to_string(),
            text: Some(text.to_string()),
            media_url: None,
        })
    }

    async fn send_media(
        &self,
        to: &str,
        media_url: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, ZaplineError> {
        self.maybe_stall().await;
        self.record(SentMessage {
            to: to.to_string(),
            text: caption.map(str::to_string),
            media_url: Some(media_url.to_string()),
        })
    }

    async fn logout(&self) -> Result<(), ZaplineError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ZaplineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct GatewayState {
    scripts: VecDeque<ConnectScript>,
    default_script: Option<ConnectScript>,
    connects: Vec<(TenantId, Option<CredentialBlob>)>,
    current: Option<mpsc::Sender<GatewayEvent>>,
}

/// A scripted stand-in for a WhatsApp gateway.
pub struct MockGateway {
    state: Mutex<GatewayState>,
    socket: Arc<MockSocket>,
    connected: Notify,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            socket: Arc::new(MockSocket::default()),
            connected: Notify::new(),
        }
    }

    /// Queues the behavior of the next unscripted `connect`.
    pub fn push_script(&self, script: ConnectScript) {
        lock(&self.state).scripts.push_back(script);
    }

    /// Behavior once the queued scripts run out (default: [`ConnectScript::Auto`]).
    pub fn set_default_script(&self, script: ConnectScript) {
        lock(&self.state).default_script = Some(script);
    }

    pub fn socket(&self) -> Arc<MockSocket> {
        Arc::clone(&self.socket)
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects.len()
    }

    /// Credentials passed to each `connect`, in call order.
    pub fn connect_credentials(&self) -> Vec<Option<CredentialBlob>> {
        lock(&self.state)
            .connects
            .iter()
            .map(|(_, credentials)| credentials.clone())
            .collect()
    }

    /// Waits until `connect` was called at least `count` times.
    pub async fn wait_for_connects(&self, count: usize) {
        loop {
            let notified = self.connected.notified();
            if self.connect_count() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Pushes an event into the open connection. Returns `false` if none is open.
    pub async fn emit(&self, event: GatewayEvent) -> bool {
        let sender = lock(&self.state).current.clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Completes pairing: credentials are issued, then the session connects.
    pub async fn scan_qr(&self) -> bool {
        self.emit(GatewayEvent::CredentialsUpdated(CredentialBlob(
            MOCK_CREDENTIALS.to_vec(),
        )))
        .await
            && self.emit(connected_event()).await
    }

    /// Delivers an inbound customer message.
    pub async fn deliver(&self, message: InboundMessage) -> bool {
        self.emit(GatewayEvent::Message(message)).await
    }

    /// Ends the open connection's event stream, as a network drop would.
    pub fn drop_connection(&self) -> bool {
        lock(&self.state).current.take().is_some()
    }

    /// Closes the open connection with an explicit reason.
    pub async fn close_with(&self, reason: CloseReason) -> bool {
        let delivered = self.emit(GatewayEvent::Closed(reason)).await;
        lock(&self.state).current = None;
        delivered
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn connected_event() -> GatewayEvent {
    GatewayEvent::Connected {
        phone_number: MOCK_PHONE.to_string(),
        business_name: Some(MOCK_BUSINESS.to_string()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl PluginAdapter for MockGateway {
    fn name(&self) -> &str {
        "mock-gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        lock(&self.state).current = None;
        Ok(())
    }
}

#[async_trait]
impl GatewayConnector for MockGateway {
    async fn connect(
        &self,
        tenant_id: &TenantId,
        credentials: Option<CredentialBlob>,
    ) -> Result<GatewayConnection, ZaplineError> {
        let (tx, rx) = mpsc::channel(32);
        let script = {
            let mut state = lock(&self.state);
            state.connects.push((tenant_id.clone(), credentials.clone()));
            let script = state
                .scripts
                .pop_front()
                .or_else(|| state.default_script.clone())
                .unwrap_or(ConnectScript::Auto);
            state.current = match script {
                ConnectScript::Auto | ConnectScript::Silent => Some(tx.clone()),
                ConnectScript::Fail(_) | ConnectScript::DropImmediately => None,
            };
            script
        };
        self.connected.notify_waiters();

        match script {
            ConnectScript::Fail(reason) => return Err(ZaplineError::gateway(reason)),
            ConnectScript::Auto => {
                let first = if credentials.is_some() {
                    connected_event()
                } else {
                    GatewayEvent::Qr {
                        code: format!("mock-qr-{}", self.connect_count()),
                    }
                };
                // Fresh channel with spare capacity.
                let _ = tx.try_send(first);
            }
            ConnectScript::DropImmediately | ConnectScript::Silent => {}
        }
        drop(tx);

        let socket: Arc<dyn GatewaySocket> = self.socket.clone();
        Ok(GatewayConnection {
            socket,
            events: rx,
        })
    }
}
