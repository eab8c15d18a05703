// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Zapline session orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Zapline configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZaplineConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Connection session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Reconnect backoff after an unexpected socket drop.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Inbound dedup/debounce settings.
    #[serde(default)]
    pub debounce: DebounceConfig,

    /// Inbound rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Credential storage backend.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP control surface.
    #[serde(default)]
    pub server: ServerConfig,

    /// WhatsApp Web bridge connection.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Downstream inbound handler.
    #[serde(default)]
    pub handler: HandlerConfig,

    /// Business phone number to tenant id, used to route unauthenticated inbound traffic.
    #[serde(default)]
    pub tenants: BTreeMap<String, String>,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and health output.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "zapline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Connection session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// How long `initialize` waits for a QR code or connection before returning.
    #[serde(default = "default_initialize_wait_ms")]
    pub initialize_wait_ms: u64,

    /// QR rotations tolerated before pairing fails.
    #[serde(default = "default_max_qr_rotations")]
    pub max_qr_rotations: u32,

    /// Lifetime of a single QR code when the gateway does not rotate it.
    #[serde(default = "default_qr_timeout_secs")]
    pub qr_timeout_secs: u64,

    /// Sessions not CONNECTED and idle for longer than this are reclaimed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the idle reaper runs.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// How long a torn-down tenant keeps reporting DISCONNECTED.
    #[serde(default = "default_tombstone_ttl_secs")]
    pub tombstone_ttl_secs: u64,

    /// Upper bound on waiting for a session task to acknowledge teardown.
    #[serde(default = "default_disconnect_timeout_ms")]
    pub disconnect_timeout_ms: u64,

    /// Capacity of per-session command and event channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl SessionConfig {
    pub fn initialize_wait(&self) -> Duration {
        Duration::from_millis(self.initialize_wait_ms)
    }

    pub fn qr_timeout(&self) -> Duration {
        Duration::from_secs(self.qr_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initialize_wait_ms: default_initialize_wait_ms(),
            max_qr_rotations: default_max_qr_rotations(),
            qr_timeout_secs: default_qr_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            tombstone_ttl_secs: default_tombstone_ttl_secs(),
            disconnect_timeout_ms: default_disconnect_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_initialize_wait_ms() -> u64 {
    5_000
}

fn default_max_qr_rotations() -> u32 {
    5
}

fn default_qr_timeout_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_tombstone_ttl_secs() -> u64 {
    10 * 60
}

fn default_disconnect_timeout_ms() -> u64 {
    5_000
}

fn default_channel_capacity() -> usize {
    64
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the delay between attempts.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    /// Consecutive failures tolerated before the session fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    5
}

/// Inbound dedup/debounce configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DebounceConfig {
    /// Quiet period after the last fragment before a batch is flushed.
    /// Zero dispatches every message immediately.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    /// How long processed message ids are remembered.
    #[serde(default = "default_processed_ttl_secs")]
    pub processed_ttl_secs: u64,

    /// Upper bound on remembered processed ids.
    #[serde(default = "default_max_processed_ids")]
    pub max_processed_ids: usize,

    /// Separator placed between coalesced fragments.
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl DebounceConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn processed_ttl(&self) -> Duration {
        Duration::from_secs(self.processed_ttl_secs)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: default_quiet_period_ms(),
            processed_ttl_secs: default_processed_ttl_secs(),
            max_processed_ids: default_max_processed_ids(),
            separator: default_separator(),
        }
    }
}

fn default_quiet_period_ms() -> u64 {
    3_000
}

fn default_processed_ttl_secs() -> u64 {
    60 * 60
}

fn default_max_processed_ids() -> usize {
    10_000
}

fn default_separator() -> String {
    " ".to_string()
}

/// What an inbound rate-limit window is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitScope {
    /// One window per (tenant, sender).
    Sender,
    /// One window per tenant.
    Tenant,
}

/// Inbound rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Trailing window length.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_scope")]
    pub scope: RateLimitScope,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            scope: default_scope(),
        }
    }
}

fn default_max_requests() -> usize {
    20
}

fn default_window_secs() -> u64 {
    60
}

fn default_scope() -> RateLimitScope {
    RateLimitScope::Sender
}

/// Which credential store backs the sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per tenant under `credentials_dir`.
    File,
    /// A single SQLite database at `database_path`.
    Sqlite,
    /// Process memory only; credentials are lost on restart.
    Memory,
}

/// Credential storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Directory for the file backend.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: String,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            credentials_dir: default_credentials_dir(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_credentials_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapline").join("credentials"))
        .unwrap_or_else(|| "credentials".into())
        .display()
        .to_string()
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapline").join("zapline.db"))
        .unwrap_or_else(|| "zapline.db".into())
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP control surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Whether `serve` exposes the HTTP API.
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on every route except `/health`.
    /// Without it the authenticated routes reject all requests.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            host: default_host(),
            port: default_port(),
            bearer_token: None,
        }
    }
}

fn default_server_enabled() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

/// WhatsApp Web bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// WebSocket URL of the bridge.
    #[serde(default = "default_bridge_url")]
    pub url: String,

    /// Timeout for opening the WebSocket.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Timeout waiting for a send acknowledgement.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:3001/ws".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

/// Downstream inbound handler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    /// Base URL batches are POSTed to. `None` logs batches without replying.
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token sent to the handler.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_handler_timeout_ms")]
    pub timeout_ms: u64,
}

impl HandlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            url: None,
            bearer_token: None,
            timeout_ms: default_handler_timeout_ms(),
        }
    }
}

fn default_handler_timeout_ms() -> u64 {
    30_000
}
