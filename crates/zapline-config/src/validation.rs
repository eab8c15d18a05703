// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: non-zero limits,
//! well-formed addresses and URLs, consistent backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::{StorageBackend, ZaplineConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &ZaplineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of: {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.session.initialize_wait_ms == 0 {
        fail("session.initialize_wait_ms must be greater than 0".to_string());
    }
    if config.session.channel_capacity == 0 {
        fail("session.channel_capacity must be greater than 0".to_string());
    }
    if config.session.qr_timeout_secs == 0 {
        fail("session.qr_timeout_secs must be greater than 0".to_string());
    }
    if config.session.reaper_interval_secs == 0 {
        fail("session.reaper_interval_secs must be greater than 0".to_string());
    }

    if config.reconnect.max_attempts == 0 {
        fail("reconnect.max_attempts must be at least 1".to_string());
    }
    if config.reconnect.multiplier == 0 {
        fail("reconnect.multiplier must be at least 1".to_string());
    }
    if config.reconnect.base_delay_ms > config.reconnect.max_delay_ms {
        fail(format!(
            "reconnect.base_delay_ms ({}) must not exceed reconnect.max_delay_ms ({})",
            config.reconnect.base_delay_ms, config.reconnect.max_delay_ms
        ));
    }

    if config.debounce.max_processed_ids == 0 {
        fail("debounce.max_processed_ids must be greater than 0".to_string());
    }

    if config.rate_limit.max_requests == 0 {
        fail("rate_limit.max_requests must be greater than 0".to_string());
    }
    if config.rate_limit.window_secs == 0 {
        fail("rate_limit.window_secs must be greater than 0".to_string());
    }

    match config.storage.backend {
        StorageBackend::File if config.storage.credentials_dir.trim().is_empty() => {
            fail("storage.credentials_dir must not be empty for the file backend".to_string());
        }
        StorageBackend::Sqlite if config.storage.database_path.trim().is_empty() => {
            fail("storage.database_path must not be empty for the sqlite backend".to_string());
        }
        _ => {}
    }

    if config.server.enabled {
        let host = config.server.host.trim();
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
        if matches!(&config.server.bearer_token, Some(token) if token.trim().is_empty()) {
            fail("server.bearer_token must not be blank when set".to_string());
        }
    }

    let bridge_url = config.bridge.url.trim();
    if !(bridge_url.starts_with("ws://") || bridge_url.starts_with("wss://")) {
        fail(format!(
            "bridge.url `{bridge_url}` must start with ws:// or wss://"
        ));
    }

    if let Some(url) = &config.handler.url {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            fail(format!("handler.url `{url}` must start with http:// or https://"));
        }
    }

    for (phone, tenant) in &config.tenants {
        if !phone.chars().any(|c| c.is_ascii_digit()) {
            fail(format!("tenants key `{phone}` is not a phone number"));
        }
        if tenant.trim().is_empty() {
            fail(format!("tenants.{phone} must name a tenant"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ZaplineConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = ZaplineConfig::default();
        config.rate_limit.max_requests = 0;
        config.reconnect.max_attempts = 0;
        config.bridge.url = "http://bridge".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn inverted_backoff_bounds_rejected() {
        let mut config = ZaplineConfig::default();
        config.reconnect.base_delay_ms = 60_000;
        config.reconnect.max_delay_ms = 1_000;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("base_delay_ms"));
    }

    #[test]
    fn host_check_skipped_when_server_disabled() {
        let mut config = ZaplineConfig::default();
        config.server.enabled = false;
        config.server.host = "not a host!".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn tenant_map_entries_checked() {
        let mut config = ZaplineConfig::default();
        config.tenants.insert("+55 11 4000-0000".into(), "acme".into());
        assert!(validate_config(&config).is_ok());

        config.tenants.insert("sales".into(), "acme".into());
        assert!(validate_config(&config).is_err());
    }
}
