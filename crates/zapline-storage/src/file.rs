// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-file-per-tenant credential store.
//!
//! Saves write a uniquely named temp file, fsync it, rename it over the
//! target and fsync the directory, so a crash leaves either the old or the
//! new blob, never a torn one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use zapline_core::{
    AdapterType, CredentialBlob, CredentialStore, HealthStatus, PluginAdapter, TenantId,
    ZaplineError,
};

const EXTENSION: &str = "creds";

/// Credential store keeping each tenant's blob in its own file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tenant ids are encoded so any id maps to a safe, unique file name.
    fn path_for(&self, tenant_id: &TenantId) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(tenant_id.as_str());
        self.dir.join(format!("{encoded}.{EXTENSION}"))
    }

    async fn sync_dir(&self) {
        #[cfg(unix)]
        {
            match tokio::fs::File::open(&self.dir).await {
                Ok(dir) => {
                    if let Err(err) = dir.sync_all().await {
                        warn!(dir = %self.dir.display(), error = %err, "directory fsync failed");
                    }
                }
                Err(err) => {
                    warn!(dir = %self.dir.display(), error = %err, "cannot open directory for fsync");
                }
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for FileCredentialStore {
    fn name(&self) -> &str {
        "file"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CredentialStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Unhealthy(format!(
                "{} is not a writable directory",
                self.dir.display()
            ))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HealthStatus::Degraded(format!(
                "{} does not exist yet",
                self.dir.display()
            ))),
            Err(err) => Ok(HealthStatus::Unhealthy(err.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<CredentialBlob>, ZaplineError> {
        match tokio::fs::read(self.path_for(tenant_id)).await {
            Ok(bytes) => Ok(Some(CredentialBlob(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ZaplineError::storage(err)),
        }
    }

    async fn save(&self, tenant_id: &TenantId, blob: &CredentialBlob) -> Result<(), ZaplineError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(ZaplineError::storage)?;

        let target = self.path_for(tenant_id);
        let temp = target.with_extension(format!("{EXTENSION}.tmp-{}", uuid::Uuid::new_v4()));

        let write = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(blob.as_bytes()).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &target).await
        };
        if let Err(err) = write.await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ZaplineError::storage(err));
        }
        self.sync_dir().await;

        debug!(tenant_id = %tenant_id, bytes = blob.as_bytes().len(), "credentials saved");
        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId) -> Result<(), ZaplineError> {
        match tokio::fs::remove_file(self.path_for(tenant_id)).await {
            Ok(()) => {
                self.sync_dir().await;
                debug!(tenant_id = %tenant_id, "credentials deleted");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ZaplineError::storage(err)),
        }
    }
}
