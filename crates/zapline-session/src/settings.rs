// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime settings for the session manager, derived from configuration.

use std::time::Duration;

use zapline_config::model::{RateLimitScope, ZaplineConfig};
use zapline_debounce::DebounceSettings;
use zapline_resilience::{Backoff, RateLimitSettings};

/// Everything the manager and its actors need to know about timing and limits.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound on how long `initialize_session` waits for a QR or connection.
    pub initialize_wait: Duration,
    /// QR codes that may expire before pairing gives up.
    pub max_qr_rotations: u32,
    /// How long a QR is served before it counts as expired.
    pub qr_timeout: Duration,
    pub idle_timeout: Duration,
    pub tombstone_ttl: Duration,
    /// How long teardown waits for an actor to acknowledge.
    pub disconnect_timeout: Duration,
    pub channel_capacity: usize,
    pub reconnect: Backoff,
    /// Retry schedule for transient send failures.
    pub send_retry: Backoff,
    pub debounce: DebounceSettings,
    pub rate_limit: RateLimitSettings,
    pub rate_limit_scope: RateLimitScope,
}

impl SessionSettings {
    pub fn from_config(config: &ZaplineConfig) -> Self {
        let session = &config.session;
        Self {
            initialize_wait: session.initialize_wait(),
            max_qr_rotations: session.max_qr_rotations,
            qr_timeout: session.qr_timeout(),
            idle_timeout: session.idle_timeout(),
            tombstone_ttl: session.tombstone_ttl(),
            disconnect_timeout: session.disconnect_timeout(),
            channel_capacity: session.channel_capacity.max(1),
            reconnect: Backoff::from(&config.reconnect),
            send_retry: Backoff::new(Duration::from_millis(250), Duration::from_secs(2), 2, 3),
            debounce: DebounceSettings::from(&config.debounce),
            rate_limit: RateLimitSettings::from(&config.rate_limit),
            rate_limit_scope: config.rate_limit.scope,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ZaplineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config_defaults() {
        let settings = SessionSettings::default();
        assert_eq!(settings.initialize_wait, Duration::from_secs(5));
        assert_eq!(settings.max_qr_rotations, 5);
        assert_eq!(settings.reconnect.max_attempts, 5);
        assert_eq!(settings.debounce.quiet_period, Duration::from_secs(3));
        assert_eq!(settings.rate_limit.max_requests, 20);
        assert_eq!(settings.rate_limit_scope, RateLimitScope::Sender);
    }

    #[test]
    fn zero_channel_capacity_is_clamped() {
        let mut config = ZaplineConfig::default();
        config.session.channel_capacity = 0;
        assert_eq!(SessionSettings::from_config(&config).channel_capacity, 1);
    }
}
