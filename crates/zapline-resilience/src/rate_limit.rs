// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window rate limiter keyed by an arbitrary string.
//!
//! Each key keeps the timestamps of its accepted requests inside the
//! trailing window. Idle keys expire from the underlying [`TtlCache`] one
//! window after their last accepted request.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use zapline_config::model::RateLimitConfig;

use crate::ttl_cache::TtlCache;

/// Limit and window for a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Requests accepted per window.
    pub max_requests: usize,
    /// Trailing window length.
    pub window: Duration,
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window(),
        }
    }
}

/// Thread-safe sliding-window limiter.
///
/// Checking and recording happen under one lock, so concurrent callers for
/// the same key can never jointly exceed the limit.
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimitSettings,
    windows: Mutex<TtlCache<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            windows: Mutex::new(TtlCache::new(settings.window)),
        }
    }

    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    /// Records a request for `key` if it fits in the window.
    ///
    /// Returns `false` without recording anything once `max_requests`
    /// requests already fall inside the trailing window.
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(window) = windows.get(key) {
            let live = window
                .iter()
                .filter(|at| now.duration_since(**at) < self.settings.window)
                .count();
            if live >= self.settings.max_requests {
                debug!(key, limit = self.settings.max_requests, "rate limit reached");
                return false;
            }
        }

        let window = windows.get_or_insert_with(key.to_string(), VecDeque::new);
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.settings.window {
                window.pop_front();
            } else {
                break;
            }
        }
        window.push_back(now);
        true
    }

    /// Requests still available to `key` in the current window.
    pub fn remaining(&self, key: &str) -> usize {
        let now = Instant::now();
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let used = windows.get(key).map_or(0, |window| {
            window
                .iter()
                .filter(|at| now.duration_since(**at) < self.settings.window)
                .count()
        });
        self.settings.max_requests.saturating_sub(used)
    }

    /// Forgets the window for `key`.
    pub fn reset(&self, key: &str) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.remove(key);
    }

    /// Forgets every window whose key starts with `prefix`.
    pub fn reset_prefix(&self, prefix: &str) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.remove_where(|key, _| key.starts_with(prefix))
    }
}
