// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential persistence for the Zapline session orchestrator.
//!
//! Three [`CredentialStore`] backends: one file per tenant, a WAL-mode SQLite
//! database written through `tokio-rusqlite`'s single writer thread, and an
//! in-memory map for tests and throwaway deployments.

pub mod database;
pub mod file;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;
use zapline_config::model::{StorageBackend, StorageConfig};
use zapline_core::{CredentialStore, PluginAdapter, ZaplineError};

pub use database::Database;
pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;

/// Builds the configured credential store. SQLite is opened eagerly so a
/// bad path fails at startup rather than on the first pairing.
pub async fn open_credential_store(
    config: &StorageConfig,
) -> Result<Arc<dyn CredentialStore>, ZaplineError> {
    let store: Arc<dyn CredentialStore> = match config.backend {
        StorageBackend::File => Arc::new(FileCredentialStore::new(&config.credentials_dir)),
        StorageBackend::Sqlite => {
            let store = SqliteCredentialStore::new(config.clone());
            store.initialize().await?;
            Arc::new(store)
        }
        StorageBackend::Memory => Arc::new(MemoryCredentialStore::new()),
    };
    info!(backend = store.name(), "credential store ready");
    Ok(store)
}
