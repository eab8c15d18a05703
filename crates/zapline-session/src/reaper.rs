// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task that reclaims idle, unconnected sessions.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::SessionManager;

/// Runs [`SessionManager::reap_idle`] every `interval` until `cancel` fires.
pub fn spawn_idle_reaper(
    manager: SessionManager,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("idle reaper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let reaped = manager.reap_idle().await;
                    if !reaped.is_empty() {
                        info!(count = reaped.len(), "reaped idle sessions");
                    }
                }
            }
        }
    })
}
