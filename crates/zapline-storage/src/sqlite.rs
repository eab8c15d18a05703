// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the CredentialStore trait.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tokio::sync::OnceCell;
use tracing::debug;
use zapline_config::model::StorageConfig;
use zapline_core::{
    AdapterType, CredentialBlob, CredentialStore, HealthStatus, PluginAdapter, TenantId,
    ZaplineError,
};

use crate::database::{Database, map_tr_err};

/// SQLite-backed credential store.
///
/// The database is opened lazily on first use, or eagerly via
/// [`SqliteCredentialStore::initialize`].
pub struct SqliteCredentialStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteCredentialStore {
    /// Create a store for the configured database path without opening it.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Opens the database and runs migrations if that has not happened yet.
    pub async fn initialize(&self) -> Result<(), ZaplineError> {
        self.db().await.map(|_| ())
    }

    async fn db(&self) -> Result<&Database, ZaplineError> {
        self.db
            .get_or_try_init(|| async {
                let db =
                    Database::open(&self.config.database_path, self.config.wal_mode).await?;
                debug!(path = %self.config.database_path, "SQLite credential store initialized");
                Ok(db)
            })
            .await
    }
}

#[async_trait]
impl PluginAdapter for SqliteCredentialStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CredentialStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        let db = self.db().await?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<CredentialBlob>, ZaplineError> {
        let tenant = tenant_id.as_str().to_string();
        let blob = self
            .db()
            .await?
            .connection()
            .call(move |conn| -> Result<Option<Vec<u8>>, rusqlite::Error> {
                conn.query_row(
                    "SELECT blob FROM credentials WHERE tenant_id = ?1",
                    params![tenant],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        Ok(blob.map(CredentialBlob))
    }

    async fn save(&self, tenant_id: &TenantId, blob: &CredentialBlob) -> Result<(), ZaplineError> {
        let tenant = tenant_id.as_str().to_string();
        let bytes = blob.as_bytes().to_vec();
        let updated_at = chrono::Utc::now().to_rfc3339();
        self.db()
            .await?
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO credentials (tenant_id, blob, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(tenant_id) DO UPDATE SET
                         blob = excluded.blob,
                         updated_at = excluded.updated_at",
                    params![tenant, bytes, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(tenant_id = %tenant_id, bytes = blob.as_bytes().len(), "credentials saved");
        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId) -> Result<(), ZaplineError> {
        let tenant = tenant_id.as_str().to_string();
        let removed = self
            .db()
            .await?
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM credentials WHERE tenant_id = ?1", params![tenant])
            })
            .await
            .map_err(map_tr_err)?;
        debug!(tenant_id = %tenant_id, removed, "credentials deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn adapter_identity() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("creds.db");
        let store = SqliteCredentialStore::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.adapter_type(), AdapterType::CredentialStore);
        assert!(!db_path.exists(), "opening is lazy");
    }

    #[tokio::test]
    async fn initialize_creates_database_file() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("creds.db");
        let store = SqliteCredentialStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        assert!(db_path.exists());
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn save_overwrites_previous_blob() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("creds.db");
        let store = SqliteCredentialStore::new(make_config(db_path.to_str().unwrap()));
        let tenant = TenantId::from("acme");

        store.save(&tenant, &CredentialBlob(vec![1, 2])).await.unwrap();
        store.save(&tenant, &CredentialBlob(vec![3])).await.unwrap();

        assert_eq!(store.load(&tenant).await.unwrap(), Some(CredentialBlob(vec![3])));
    }

    #[tokio::test]
    async fn shutdown_before_use_is_a_no_op() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("creds.db");
        let store = SqliteCredentialStore::new(make_config(db_path.to_str().unwrap()));
        store.shutdown().await.unwrap();
    }
}
