//! Test fixtures and store helpers.
//!
//! Provides convenience constructors for stores over the in-memory
//! backend and common test scenarios.

use panelstore_core::{EncryptionKey, Store, StoreConfig};
use panelstore_storage::InMemoryBackend;
use std::sync::Arc;

/// A store over a fresh in-memory backend.
///
/// The backend handle stays reachable so tests can inspect or corrupt the
/// raw key space.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    /// The backend behind the store.
    pub backend: Arc<InMemoryBackend>,
}

impl TestStore {
    /// Creates a store with default configuration.
    pub fn memory() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store that encrypts every field with a random key.
    pub fn encrypted() -> Self {
        Self::with_config(StoreConfig::new().encryption_key(EncryptionKey::generate()))
    }

    /// Creates a store with the given scan step size.
    pub fn with_batch_size(size: usize) -> Self {
        let config = StoreConfig::new()
            .scan_batch_size(size)
            .expect("Scan batch size must be positive");
        Self::with_config(config)
    }

    /// Creates a store with `config`.
    pub fn with_config(config: StoreConfig) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let store = Store::with_backend(backend.clone(), &config);
        Self { store, backend }
    }

    /// Returns every raw key in the backend, sorted.
    pub fn raw_keys(&self) -> Vec<String> {
        self.backend.keys()
    }

    /// Returns the raw index keys in the backend, sorted.
    pub fn index_keys(&self) -> Vec<String> {
        self.raw_keys()
            .into_iter()
            .filter(|key| key.starts_with("idx:"))
            .collect()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use panelstore_core::models::{Node, Profile, Server};
    use panelstore_core::FieldValue;

    /// Creates a store with `count` profiles `u0..u{count}`, each with a
    /// unique email and username.
    pub async fn populated_profiles(count: usize) -> TestStore {
        let store = TestStore::with_batch_size(7);
        let profiles = store.table::<Profile>();
        for i in 0..count {
            profiles
                .insert(
                    format!("u{i}"),
                    [
                        ("email", FieldValue::from(format!("user{i}@test.com"))),
                        ("username", FieldValue::from(format!("user{i}"))),
                        ("password", FieldValue::from("hash")),
                    ],
                )
                .await
                .expect("Failed to insert profile");
        }
        store
    }

    /// Creates a store with two nodes and `per_node` servers on each,
    /// all owned by `owner`.
    pub async fn hosting_layout(owner: &str, per_node: usize) -> TestStore {
        let store = TestStore::memory();
        let nodes = store.table::<Node>();
        let servers = store.table::<Server>();
        for node in ["n1", "n2"] {
            nodes
                .insert(
                    node,
                    [("fqdn", FieldValue::from(format!("{node}.example.com")))],
                )
                .await
                .expect("Failed to insert node");
            for i in 0..per_node {
                servers
                    .insert(
                        format!("{node}-s{i}"),
                        [
                            ("name", FieldValue::from(format!("server {i}"))),
                            ("owner_id", FieldValue::from(owner)),
                            ("node_id", FieldValue::from(node)),
                            ("memory", FieldValue::Int(1024)),
                        ],
                    )
                    .await
                    .expect("Failed to insert server");
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelstore_core::models::Profile;

    #[tokio::test]
    async fn test_memory_store_starts_empty() {
        let store = TestStore::memory();
        assert!(store.raw_keys().is_empty());
        assert_eq!(store.table::<Profile>().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_populated_profiles() {
        let store = scenarios::populated_profiles(10).await;
        assert_eq!(store.table::<Profile>().count().await.unwrap(), 10);
        // Two indexed columns per profile, all values distinct.
        assert_eq!(store.index_keys().len(), 20);
    }

    #[tokio::test]
    async fn test_hosting_layout() {
        let store = scenarios::hosting_layout("owner", 3).await;
        assert_eq!(store.raw_keys().len(), 2 + 6 + 2 + 2 + 1);
    }
}
