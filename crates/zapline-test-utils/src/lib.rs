// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Zapline integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a real WhatsApp gateway.
//!
//! # Components
//!
//! - [`MockGateway`] - scripted gateway connector with event injection
//! - [`MockHandler`] - downstream handler that records batches
//! - [`UndeletableStore`] - credential store whose deletes always fail
//! - [`TestHarness`] - a `SessionManager` wired to both

pub mod harness;
pub mod mock_gateway;
pub mod mock_handler;
pub mod mock_store;

pub use harness::{TestHarness, TestHarnessBuilder, customer_message};
pub use mock_gateway::{ConnectScript, MockGateway, MockSocket, SentMessage};
pub use mock_handler::MockHandler;
pub use mock_store::UndeletableStore;
pub use zapline_session::StaticTenantResolver;
