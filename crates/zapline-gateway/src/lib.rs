// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API for the Zapline session orchestrator.
//!
//! Exposes session lifecycle, outbound sends, context resets and externally
//! delivered inbound messages over bearer-authenticated JSON endpoints.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, router, start_server};
