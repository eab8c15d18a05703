// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behavior shared by every credential store backend.

use std::sync::Arc;

use tempfile::tempdir;
use zapline_config::model::{StorageBackend, StorageConfig};
use zapline_core::{CredentialBlob, CredentialStore, PluginAdapter, TenantId};
use zapline_storage::{
    FileCredentialStore, MemoryCredentialStore, SqliteCredentialStore, open_credential_store,
};

async fn exercise(store: &dyn CredentialStore) {
    let acme = TenantId::from("acme");
    let other = TenantId::from("other");

    assert_eq!(store.load(&acme).await.unwrap(), None, "missing is not an error");

    let blob = CredentialBlob(vec![0, 159, 146, 150, 255]);
    store.save(&acme, &blob).await.unwrap();
    assert_eq!(store.load(&acme).await.unwrap(), Some(blob.clone()));
    assert_eq!(store.load(&other).await.unwrap(), None);

    store.delete(&acme).await.unwrap();
    assert_eq!(store.load(&acme).await.unwrap(), None);

    store.delete(&acme).await.unwrap();
}

#[tokio::test]
async fn memory_store_contract() {
    exercise(&MemoryCredentialStore::new()).await;
}

#[tokio::test]
async fn file_store_contract() {
    let dir = tempdir().unwrap();
    exercise(&FileCredentialStore::new(dir.path())).await;
}

#[tokio::test]
async fn sqlite_store_contract() {
    let dir = tempdir().unwrap();
    let config = StorageConfig {
        backend: StorageBackend::Sqlite,
        database_path: dir.path().join("creds.db").display().to_string(),
        ..StorageConfig::default()
    };
    exercise(&SqliteCredentialStore::new(config)).await;
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempdir().unwrap();
    let tenant = TenantId::from("acme");
    let blob = CredentialBlob(b"linked-device".to_vec());

    FileCredentialStore::new(dir.path())
        .save(&tenant, &blob)
        .await
        .unwrap();

    let reopened = FileCredentialStore::new(dir.path());
    assert_eq!(reopened.load(&tenant).await.unwrap(), Some(blob));
}

#[tokio::test]
async fn sqlite_store_survives_restart() {
    let dir = tempdir().unwrap();
    let config = StorageConfig {
        backend: StorageBackend::Sqlite,
        database_path: dir.path().join("creds.db").display().to_string(),
        ..StorageConfig::default()
    };
    let tenant = TenantId::from("acme");
    let blob = CredentialBlob(b"linked-device".to_vec());

    {
        let store = SqliteCredentialStore::new(config.clone());
        store.save(&tenant, &blob).await.unwrap();
        store.shutdown().await.unwrap();
    }

    let reopened = SqliteCredentialStore::new(config);
    assert_eq!(reopened.load(&tenant).await.unwrap(), Some(blob));
}

#[tokio::test]
async fn factory_honours_backend_choice() {
    let dir = tempdir().unwrap();
    let mut config = StorageConfig {
        credentials_dir: dir.path().join("files").display().to_string(),
        database_path: dir.path().join("creds.db").display().to_string(),
        ..StorageConfig::default()
    };

    for (backend, name) in [
        (StorageBackend::File, "file"),
        (StorageBackend::Sqlite, "sqlite"),
        (StorageBackend::Memory, "memory"),
    ] {
        config.backend = backend;
        let store: Arc<dyn CredentialStore> = open_credential_store(&config).await.unwrap();
        assert_eq!(store.name(), name);
    }
    assert!(dir.path().join("creds.db").exists());
}

#[tokio::test]
async fn concurrent_tenants_do_not_interfere() {
    let dir = tempdir().unwrap();
    let store = Arc::new(FileCredentialStore::new(dir.path()));

    let mut tasks = Vec::new();
    for i in 0..16u8 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let tenant = TenantId(format!("tenant-{i}"));
            store.save(&tenant, &CredentialBlob(vec![i; 32])).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for i in 0..16u8 {
        let tenant = TenantId(format!("tenant-{i}"));
        assert_eq!(
            store.load(&tenant).await.unwrap(),
            Some(CredentialBlob(vec![i; 32]))
        );
    }
}
