// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-pruning building blocks shared by the session and debounce layers.
//!
//! Every structure here reads time from `tokio::time::Instant`, so tests can
//! drive expiry with a paused clock.

pub mod backoff;
pub mod rate_limit;
pub mod ttl_cache;

pub use backoff::Backoff;
pub use rate_limit::{RateLimitSettings, RateLimiter};
pub use ttl_cache::TtlCache;
