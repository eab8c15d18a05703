// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline serve` command implementation.
//!
//! Opens credential storage, connects tenants to the WhatsApp bridge on
//! demand, forwards debounced inbound batches to the configured handler and
//! exposes the session API over HTTP until a shutdown signal arrives.

use tracing::{error, info};
use zapline_config::ZaplineConfig;
use zapline_core::ZaplineError;
use zapline_gateway::{GatewayState, start_server};
use zapline_session::spawn_idle_reaper;

use crate::shutdown;
use crate::stack;

pub async fn run_serve(config: ZaplineConfig) -> Result<(), ZaplineError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting zapline serve");

    let cancel = shutdown::install_signal_handler();
    let stack = stack::build(&config, cancel.clone()).await?;

    let reaper = spawn_idle_reaper(
        stack.manager.clone(),
        config.session.reaper_interval(),
        cancel.clone(),
    );
    info!(
        interval_secs = config.session.reaper_interval().as_secs(),
        idle_secs = config.session.idle_timeout().as_secs(),
        "idle reaper started"
    );

    let served = if config.server.enabled {
        let state = GatewayState::new(stack.manager.clone(), config.server.bearer_token.clone());
        let result = start_server(&config.server, state, cancel.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "HTTP server failed");
            cancel.cancel();
        }
        result
    } else {
        info!("HTTP API disabled, running until a shutdown signal");
        cancel.cancelled().await;
        Ok(())
    };

    stack.shutdown().await;
    if let Err(e) = reaper.await {
        error!(error = %e, "idle reaper task panicked");
    }

    info!("zapline serve shutdown complete");
    served
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zapline={log_level},warn")));

    // A second init (e.g. in tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
