// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end session testing.
//!
//! `TestHarness` assembles a complete session stack with a mock gateway, a
//! mock handler and an in-memory credential store. Tests drive it through the
//! public `SessionManager` API and the gateway's event injection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use zapline_core::{CredentialStore, InboundMessage, MessageId, TenantId};
use zapline_session::{SessionManager, SessionSettings, StaticTenantResolver};
use zapline_storage::MemoryCredentialStore;

use crate::mock_gateway::{MOCK_PHONE, MockGateway};
use crate::mock_handler::MockHandler;

/// Builder for test environments with configurable timing and limits.
pub struct TestHarnessBuilder {
    settings: SessionSettings,
    reply: Option<String>,
    store: Option<Arc<dyn CredentialStore>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut settings = SessionSettings::default();
        settings.reconnect.base = Duration::from_millis(100);
        settings.reconnect.max = Duration::from_secs(1);
        Self {
            settings,
            reply: None,
            store: None,
        }
    }

    pub fn with_quiet_period(mut self, quiet: Duration) -> Self {
        self.settings.debounce.quiet_period = quiet;
        self
    }

    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.settings.rate_limit.max_requests = max_requests;
        self.settings.rate_limit.window = window;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.settings.reconnect.max_attempts = attempts;
        self
    }

    pub fn with_max_qr_rotations(mut self, rotations: u32) -> Self {
        self.settings.max_qr_rotations = rotations;
        self
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.settings.idle_timeout = idle;
        self
    }

    /// Every flushed batch is answered with `reply`.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Uses `store` instead of a fresh in-memory store, e.g. to simulate a restart.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_settings(mut self, edit: impl FnOnce(&mut SessionSettings)) -> Self {
        edit(&mut self.settings);
        self
    }

    pub fn build(self) -> TestHarness {
        let gateway = Arc::new(MockGateway::new());
        let handler = Arc::new(match self.reply {
            Some(reply) => MockHandler::replying(reply),
            None => MockHandler::new(),
        });
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let resolver = StaticTenantResolver::new().with_tenant(MOCK_PHONE, TenantId::from("acme"));

        let manager = SessionManager::builder(
            self.settings,
            gateway.clone(),
            Arc::clone(&store),
            handler.clone(),
        )
        .with_tenant_resolver(Arc::new(resolver))
        .build();

        TestHarness {
            manager,
            gateway,
            handler,
            store,
        }
    }
}

/// A complete session stack wired to mocks.
pub struct TestHarness {
    pub manager: SessionManager,
    pub gateway: Arc<MockGateway>,
    pub handler: Arc<MockHandler>,
    pub store: Arc<dyn CredentialStore>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Convenience tenant id used throughout the tests.
    pub fn tenant() -> TenantId {
        TenantId::from("acme")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// An inbound customer text with the given id.
pub fn customer_message(id: &str, sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: MessageId::from(id),
        sender: sender.to_string(),
        text: text.to_string(),
        from_me: false,
        push_name: Some("Cliente".to_string()),
        timestamp: Utc::now(),
    }
}
