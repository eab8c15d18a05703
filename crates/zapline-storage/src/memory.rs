// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process credential store. Contents do not survive a restart.

use async_trait::async_trait;
use dashmap::DashMap;
use zapline_core::{
    AdapterType, CredentialBlob, CredentialStore, HealthStatus, PluginAdapter, TenantId,
    ZaplineError,
};

/// Credential store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    blobs: DashMap<TenantId, CredentialBlob>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tenants with stored credentials.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl PluginAdapter for MemoryCredentialStore {
    fn name(&self) -> &str {
        "memory"
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
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<CredentialBlob>, ZaplineError> {
        Ok(self.blobs.get(tenant_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, tenant_id: &TenantId, blob: &CredentialBlob) -> Result<(), ZaplineError> {
        self.blobs.insert(tenant_id.clone(), blob.clone());
        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId) -> Result<(), ZaplineError> {
        self.blobs.remove(tenant_id);
        Ok(())
    }
}
