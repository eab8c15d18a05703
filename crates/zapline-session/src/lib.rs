// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session orchestration for Zapline.
//!
//! A [`SessionManager`] owns one connection actor per tenant. Each actor
//! drives the tenant's gateway connection through the session lifecycle
//! (pairing, connecting, reconnecting with backoff), persists credential
//! updates and feeds inbound traffic through the [`InboundPipeline`]: rate
//! limit, dedup/debounce, downstream handler, reply.

mod command;
mod connection;
pub mod events;
pub mod inbound;
pub mod manager;
pub mod outbound;
pub mod reaper;
pub mod resolver;
pub mod settings;
pub mod state;

pub use events::SessionEvent;
pub use inbound::{InboundPipeline, IngestOutcome};
pub use manager::{InitializeOutcome, SessionManager, SessionManagerBuilder};
pub use outbound::OutboundSender;
pub use reaper::spawn_idle_reaper;
pub use resolver::StaticTenantResolver;
pub use settings::SessionSettings;
pub use state::TenantSession;
