// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential store adapter trait.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CredentialBlob, TenantId};

/// Durable per-tenant storage for gateway credentials.
///
/// Blobs are opaque. A tenant without stored credentials is not an error.
#[async_trait]
pub trait CredentialStore: PluginAdapter {
    /// Loads the stored credentials for a tenant, if any.
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<CredentialBlob>, ZaplineError>;

    /// Stores credentials for a tenant. The write is durable when this returns.
    async fn save(&self, tenant_id: &TenantId, blob: &CredentialBlob) -> Result<(), ZaplineError>;

    /// Removes stored credentials. Deleting a missing entry succeeds.
    async fn delete(&self, tenant_id: &TenantId) -> Result<(), ZaplineError>;
}
