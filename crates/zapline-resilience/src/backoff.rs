// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped exponential backoff with a bounded attempt count.

use std::time::Duration;

use zapline_config::model::ReconnectConfig;

/// Delay schedule for consecutive failures.
///
/// Attempt `n` (1-based) waits `base * multiplier^(n-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, multiplier: u32, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            multiplier: multiplier.max(1),
            max_attempts,
        }
    }

    /// Delay before retry number `attempt`. Attempt 0 is immediate.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.saturating_pow(attempt - 1);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Whether `attempts` consecutive failures use up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.multiplier,
            config.max_attempts,
        )
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}
