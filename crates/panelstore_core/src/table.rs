//! Typed table façade and the store handle.

use crate::codec::FieldValue;
use crate::config::{RebuildMode, StoreConfig};
use crate::connector::{Connector, FieldMap, IndexReport, RebuildReport};
use crate::entity::{Entity, EntityKind};
use crate::error::CoreResult;
use panelstore_storage::KeyValueBackend;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Entry point for application code.
///
/// A store owns one [`Connector`] and hands out [`Table`] handles bound to
/// it. Cloning is cheap; every clone shares the same connection.
///
/// # Example
///
/// ```rust
/// use panelstore_core::models::Profile;
/// use panelstore_core::{FieldValue, Store, StoreConfig};
/// use panelstore_storage::InMemoryBackend;
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = Store::with_backend(Arc::new(InMemoryBackend::new()), &StoreConfig::default());
/// let profiles = store.table::<Profile>();
///
/// profiles
///     .insert("u1", [("email", FieldValue::from("a@test.com"))])
///     .await
///     .unwrap();
///
/// let found = profiles.find_by_param("email", "a@test.com").await.unwrap();
/// assert_eq!(found[0].id(), "u1");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    connector: Arc<Connector>,
}

impl Store {
    /// Creates a store for the Redis server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    #[cfg(feature = "redis")]
    pub fn open(config: &StoreConfig) -> CoreResult<Self> {
        Ok(Self::from_connector(Connector::open(config)?))
    }

    /// Creates a store over an existing backend.
    pub fn with_backend(backend: Arc<dyn KeyValueBackend>, config: &StoreConfig) -> Self {
        Self::from_connector(Connector::new(backend, config))
    }

    /// Wraps a connector.
    pub fn from_connector(connector: Connector) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Returns the shared connector.
    #[must_use]
    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// Connects, logging and swallowing failures.
    pub async fn connect(&self) {
        self.connector.connect().await;
    }

    /// Connects, returning any failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    pub async fn try_connect(&self) -> CoreResult<()> {
        self.connector.try_connect().await
    }

    /// Releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close.
    pub async fn disconnect(&self) -> CoreResult<()> {
        self.connector.disconnect().await
    }

    /// Returns the table of kind `K`.
    #[must_use]
    pub fn table<K: EntityKind>(&self) -> Table<K> {
        Table {
            connector: Arc::clone(&self.connector),
            _kind: PhantomData,
        }
    }
}

/// Typed access to the records of one entity kind.
pub struct Table<K: EntityKind> {
    connector: Arc<Connector>,
    _kind: PhantomData<K>,
}

impl<K: EntityKind> Clone for Table<K> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            _kind: PhantomData,
        }
    }
}

impl<K: EntityKind> std::fmt::Debug for Table<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &K::schema().table_name)
            .finish_non_exhaustive()
    }
}

impl<K: EntityKind> Table<K> {
    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        K::schema().table_name
    }

    fn wrap(&self, id: String, fields: FieldMap) -> Entity<K> {
        Entity::new(Arc::clone(&self.connector), id, fields, true)
    }

    /// Builds an unsaved entity.
    pub fn create<I, F>(&self, id: impl Into<String>, data: I) -> Entity<K>
    where
        I: IntoIterator<Item = (F, FieldValue)>,
        F: Into<String>,
    {
        let fields = data
            .into_iter()
            .map(|(field, value)| (field.into(), value))
            .filter(|(_, value)| !value.is_null())
            .collect();
        Entity::new(Arc::clone(&self.connector), id, fields, false)
    }

    /// Creates and saves an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn insert<I, F>(&self, id: impl Into<String>, data: I) -> CoreResult<Entity<K>>
    where
        I: IntoIterator<Item = (F, FieldValue)>,
        F: Into<String>,
    {
        let mut entity = self.create(id, data);
        entity.save().await?;
        Ok(entity)
    }

    /// Loads the entity with `id`, or `None` if it has no stored fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get(&self, id: &str) -> CoreResult<Option<Entity<K>>> {
        let found = self.connector.find(K::schema(), id).await?;
        Ok(found.map(|fields| self.wrap(id.to_string(), fields)))
    }

    /// Loads every entity, keyed by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get_all(&self) -> CoreResult<BTreeMap<String, Entity<K>>> {
        let records = self.connector.get_all(K::schema()).await?;
        Ok(records
            .into_iter()
            .map(|(id, fields)| (id.clone(), self.wrap(id, fields)))
            .collect())
    }

    /// Loads every entity whose indexed `field` holds `value`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::FieldNotIndexed`] if `field` is not an
    /// indexed column, or an error if the backend fails.
    pub async fn find_by_param(
        &self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> CoreResult<Vec<Entity<K>>> {
        let value = value.into();
        let found = self
            .connector
            .find_by_param(K::schema(), field, &value)
            .await?;
        Ok(found
            .into_iter()
            .map(|(id, fields)| self.wrap(id, fields))
            .collect())
    }

    /// Returns true if an entity with `id` is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn exists(&self, id: &str) -> CoreResult<bool> {
        self.connector.exists(K::schema(), id).await
    }

    /// Counts the stored entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn count(&self) -> CoreResult<usize> {
        self.connector.count(K::schema()).await
    }

    /// Rebuilds the index sets using the configured default mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn rebuild_indexes(&self) -> CoreResult<RebuildReport> {
        self.rebuild_indexes_with(self.connector.rebuild_mode()).await
    }

    /// Rebuilds the index sets using `mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn rebuild_indexes_with(&self, mode: RebuildMode) -> CoreResult<RebuildReport> {
        self.connector.rebuild_indexes(K::schema(), mode).await
    }

    /// Checks the index sets against the stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn verify_indexes(&self) -> CoreResult<IndexReport> {
        self.connector.verify_indexes(K::schema()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, Profile};
    use panelstore_storage::InMemoryBackend;

    fn store() -> Store {
        Store::with_backend(Arc::new(InMemoryBackend::new()), &StoreConfig::default())
    }

    #[test]
    fn create_does_not_persist() {
        let store = store();
        let entity = store
            .table::<Node>()
            .create("n1", [("fqdn", FieldValue::from("node1.example.com"))]);
        assert!(entity.is_dirty());
        assert_eq!(entity.get_str("fqdn"), Some("node1.example.com"));
    }

    #[test]
    fn create_drops_null_fields() {
        let store = store();
        let entity = store
            .table::<Node>()
            .create("n1", [("fqdn", FieldValue::Null)]);
        assert!(entity.fields().is_empty());
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = store();
        let nodes = store.table::<Node>();
        nodes
            .insert("n1", [("fqdn", FieldValue::from("node1.example.com"))])
            .await
            .unwrap();

        let loaded = nodes.get("n1").await.unwrap().unwrap();
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.get_str("fqdn"), Some("node1.example.com"));
        assert!(nodes.exists("n1").await.unwrap());
        assert!(nodes.get("n2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tables_share_one_connection() {
        let store = store();
        let profiles = store.table::<Profile>();
        let nodes = store.table::<Node>();
        profiles
            .insert("u1", [("email", FieldValue::from("a@test.com"))])
            .await
            .unwrap();
        nodes
            .insert("u1", [("fqdn", FieldValue::from("n.example.com"))])
            .await
            .unwrap();

        assert_eq!(profiles.count().await.unwrap(), 1);
        assert_eq!(nodes.count().await.unwrap(), 1);

        store.disconnect().await.unwrap();
        assert!(profiles.get("u1").await.is_err());
    }

    #[tokio::test]
    async fn get_all_keys_by_id() {
        let store = store();
        let nodes = store.table::<Node>();
        for id in ["a", "b", "c"] {
            nodes
                .insert(id, [("fqdn", FieldValue::from(format!("{id}.example.com")))])
                .await
                .unwrap();
        }
        let all = nodes.get_all().await.unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(all["b"].get_str("fqdn"), Some("b.example.com"));
    }
}
