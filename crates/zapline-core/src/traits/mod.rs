// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter and collaborator trait definitions.
//!
//! Pluggable backends extend [`PluginAdapter`] and use `#[async_trait]` for
//! dynamic dispatch compatibility.

pub mod adapter;
pub mod credential;
pub mod gateway;
pub mod handler;

pub use adapter::PluginAdapter;
pub use credential::CredentialStore;
pub use gateway::{GatewayConnection, GatewayConnector, GatewaySocket};
pub use handler::{InboundHandler, TenantResolver};
