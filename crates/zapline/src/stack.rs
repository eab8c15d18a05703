// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of the session stack shared by `serve` and `pair`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zapline_bridge::BridgeConnector;
use zapline_config::ZaplineConfig;
use zapline_core::{HealthStatus, PluginAdapter, ZaplineError};
use zapline_session::{SessionManager, SessionSettings, StaticTenantResolver};

/// A session manager plus the adapters it owns.
pub struct Stack {
    pub manager: SessionManager,
    pub connector: Arc<BridgeConnector>,
}

/// Opens storage, the bridge connector and the inbound handler, and builds
/// the manager on top of them.
pub async fn build(config: &ZaplineConfig, cancel: CancellationToken) -> Result<Stack, ZaplineError> {
    let store = zapline_storage::open_credential_store(&config.storage).await?;
    report_health(store.as_ref()).await;

    let connector = Arc::new(BridgeConnector::new(&config.bridge));
    info!(url = %connector.url(), "bridge connector ready");

    let handler = zapline_webhook::handler_from_config(&config.handler)?;

    let resolver = StaticTenantResolver::from_config(&config.tenants);
    if resolver.is_empty() {
        warn!("no [tenants] configured -- external inbound messages will be rejected");
    }

    let manager = SessionManager::builder(
        SessionSettings::from_config(config),
        connector.clone(),
        store,
        handler,
    )
    .with_tenant_resolver(Arc::new(resolver))
    .with_shutdown_token(cancel.child_token())
    .build();

    Ok(Stack { manager, connector })
}

impl Stack {
    /// Stops every session, then the connector.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        if let Err(e) = self.connector.shutdown().await {
            warn!(error = %e, "bridge connector shutdown failed");
        }
    }
}

async fn report_health<A: PluginAdapter + ?Sized>(adapter: &A) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => {}
        Ok(HealthStatus::Degraded(why)) => {
            warn!(adapter = adapter.name(), reason = %why, "adapter degraded");
        }
        Ok(HealthStatus::Unhealthy(why)) => {
            warn!(adapter = adapter.name(), reason = %why, "adapter unhealthy");
        }
        Err(e) => warn!(adapter = adapter.name(), error = %e, "health check failed"),
    }
}
