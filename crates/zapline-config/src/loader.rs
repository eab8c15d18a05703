// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./zapline.toml` > `~/.config/zapline/zapline.toml` > `/etc/zapline/zapline.toml`
//! with environment variable overrides via `ZAPLINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ZaplineConfig;

/// Sections reachable through `ZAPLINE_<SECTION>_<KEY>` variables.
///
/// `rate_limit` must be matched before any shorter prefix could claim it.
const ENV_SECTIONS: &[&str] = &[
    "rate_limit",
    "service",
    "session",
    "reconnect",
    "debounce",
    "storage",
    "server",
    "bridge",
    "handler",
];

const SYSTEM_CONFIG: &str = "/etc/zapline/zapline.toml";
const LOCAL_CONFIG: &str = "zapline.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zapline/zapline.toml` (system-wide)
/// 3. `~/.config/zapline/zapline.toml` (user XDG config)
/// 4. `./zapline.toml` (local directory)
/// 5. `ZAPLINE_*` environment variables
pub fn load_config() -> Result<ZaplineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Path of the per-user config file, if the platform has a config dir.
pub fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("zapline").join("zapline.toml"))
}

/// Candidate config files in merge order, for error span lookup.
pub(crate) fn config_file_candidates() -> Vec<std::path::PathBuf> {
    let mut paths = vec![std::path::PathBuf::from(SYSTEM_CONFIG)];
    paths.extend(user_config_path());
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(LOCAL_CONFIG));
    }
    paths
}

/// Create the environment variable provider with explicit section mapping.
///
/// Splitting on `_` would turn `ZAPLINE_SESSION_IDLE_TIMEOUT_SECS` into
/// `session.idle.timeout.secs`; only the first separator after a known
/// section name becomes a dot.
fn env_provider() -> Env {
    Env::prefixed("ZAPLINE_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
