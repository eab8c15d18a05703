// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential store that loads and saves but refuses to delete.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use zapline_core::{
    AdapterType, CredentialBlob, CredentialStore, HealthStatus, PluginAdapter, TenantId,
    ZaplineError,
};
use zapline_storage::MemoryCredentialStore;

/// Wraps a [`MemoryCredentialStore`] whose `delete` always fails, as a
/// read-only disk would.
#[derive(Debug, Default)]
pub struct UndeletableStore {
    inner: MemoryCredentialStore,
    delete_attempts: AtomicUsize,
}

impl UndeletableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for UndeletableStore {
    fn name(&self) -> &str {
        "undeletable"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CredentialStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for UndeletableStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<CredentialBlob>, ZaplineError> {
        self.inner.load(tenant_id).await
    }

    async fn save(&self, tenant_id: &TenantId, blob: &CredentialBlob) -> Result<(), ZaplineError> {
        self.inner.save(tenant_id, blob).await
    }

    async fn delete(&self, _tenant_id: &TenantId) -> Result<(), ZaplineError> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        Err(ZaplineError::storage(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }
}
