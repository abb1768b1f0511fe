//! Entities: one in-memory record bound to an id and a field bag.

use crate::codec::FieldValue;
use crate::connector::{Connector, FieldMap};
use crate::error::CoreResult;
use crate::schema::TableSchema;
use serde_json::{Map, Value as Json};
use std::marker::PhantomData;
use std::sync::Arc;

/// Describes one kind of stored entity.
///
/// Implementors are marker types: they carry the table schema and the
/// fields hidden from the default JSON projection. All behaviour lives in
/// [`Entity`] and [`crate::Table`].
///
/// # Example
///
/// ```rust
/// use panelstore_core::{Column, ColumnType, EntityKind, TableSchema};
///
/// struct Widget;
///
/// static WIDGETS: TableSchema = TableSchema::new(
///     "widgets",
///     &[Column::new("label", ColumnType::String).indexed()],
/// );
///
/// impl EntityKind for Widget {
///     fn schema() -> &'static TableSchema {
///         &WIDGETS
///     }
/// }
///
/// assert!(Widget::schema().is_indexed("label"));
/// ```
pub trait EntityKind: Send + Sync + 'static {
    /// Fields omitted from [`Entity::to_json`].
    const SECRET_FIELDS: &'static [&'static str] = &[];

    /// Returns the table schema.
    fn schema() -> &'static TableSchema;
}

/// A mutable record of kind `K`.
///
/// Mutate fields with [`Entity::set`] and [`Entity::unset`], then call
/// [`Entity::save`]. Setting a field to null is the same as unsetting it:
/// the field is omitted from the stored record.
pub struct Entity<K: EntityKind> {
    id: String,
    fields: FieldMap,
    dirty: bool,
    connector: Arc<Connector>,
    _kind: PhantomData<K>,
}

impl<K: EntityKind> Entity<K> {
    /// Wraps a field map. `persisted` marks a record read from storage.
    pub(crate) fn new(
        connector: Arc<Connector>,
        id: impl Into<String>,
        fields: FieldMap,
        persisted: bool,
    ) -> Self {
        Self {
            id: id.into(),
            fields,
            dirty: !persisted,
            connector,
            _kind: PhantomData,
        }
    }

    /// Returns the entity id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the table schema.
    #[must_use]
    pub fn schema(&self) -> &'static TableSchema {
        K::schema()
    }

    /// Returns the current field bag.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Returns the value of `field`, or `None` if absent or null.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Returns `field` as text.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field)?.as_str()
    }

    /// Returns `field` as an integer.
    #[must_use]
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field)?.as_i64()
    }

    /// Returns `field` as a float.
    #[must_use]
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field)?.as_f64()
    }

    /// Returns `field` as a boolean.
    #[must_use]
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field)?.as_bool()
    }

    /// Returns `field` as binary content.
    #[must_use]
    pub fn get_bytes(&self, field: &str) -> Option<Vec<u8>> {
        self.get(field)?.to_bytes()
    }

    /// Sets `field` to `value`, returning the previous value.
    pub fn set(
        &mut self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let value = value.into();
        let field = field.into();
        let previous = if value.is_null() {
            self.fields.remove(&field)
        } else {
            self.fields.insert(field, value)
        };
        self.dirty = true;
        previous
    }

    /// Removes `field`, returning its value.
    pub fn unset(&mut self, field: &str) -> Option<FieldValue> {
        let previous = self.fields.remove(field);
        if previous.is_some() {
            self.dirty = true;
        }
        previous
    }

    /// Returns true if the bag changed since it was loaded or last saved.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the field bag as the complete stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn save(&mut self) -> CoreResult<()> {
        self.connector.save(K::schema(), &self.id, &self.fields).await?;
        self.dirty = false;
        Ok(())
    }

    /// Deletes the stored record and its index memberships.
    ///
    /// The in-memory entity is left as it was; saving it again recreates
    /// the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn delete(&mut self) -> CoreResult<()> {
        self.connector.delete(K::schema(), &self.id).await?;
        self.dirty = true;
        Ok(())
    }

    /// JSON projection: `id` merged with every field except the kind's
    /// secret fields.
    #[must_use]
    pub fn to_json(&self) -> Json {
        self.project(|field| !K::SECRET_FIELDS.iter().any(|secret| *secret == field))
    }

    /// JSON projection including secret fields.
    #[must_use]
    pub fn to_json_with_secrets(&self) -> Json {
        self.project(|_| true)
    }

    fn project(&self, include: impl Fn(&str) -> bool) -> Json {
        let mut object = Map::new();
        object.insert("id".to_string(), Json::String(self.id.clone()));
        for (field, value) in &self.fields {
            if field != "id" && include(field) {
                object.insert(field.clone(), value.to_json());
            }
        }
        Json::Object(object)
    }
}

impl<K: EntityKind> Clone for Entity<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            fields: self.fields.clone(),
            dirty: self.dirty,
            connector: Arc::clone(&self.connector),
            _kind: PhantomData,
        }
    }
}

impl<K: EntityKind> std::fmt::Debug for Entity<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let visible: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        f.debug_struct("Entity")
            .field("table", &K::schema().table_name)
            .field("id", &self.id)
            .field("fields", &visible)
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::schema::{Column, ColumnType};
    use panelstore_storage::{InMemoryBackend, KeyValueBackend};
    use serde_json::json;

    struct Account;

    static ACCOUNTS: TableSchema = TableSchema::new(
        "accounts",
        &[
            Column::new("email", ColumnType::TextUnique).indexed(),
            Column::new("password", ColumnType::String),
            Column::new("age", ColumnType::Int),
        ],
    );

    impl EntityKind for Account {
        const SECRET_FIELDS: &'static [&'static str] = &["password"];

        fn schema() -> &'static TableSchema {
            &ACCOUNTS
        }
    }

    fn setup() -> (Arc<InMemoryBackend>, Arc<Connector>) {
        let backend = Arc::new(InMemoryBackend::new());
        let connector = Arc::new(Connector::new(backend.clone(), &StoreConfig::default()));
        (backend, connector)
    }

    fn account(connector: &Arc<Connector>) -> Entity<Account> {
        let mut fields = FieldMap::new();
        fields.insert("email".into(), "a@test.com".into());
        fields.insert("password".into(), "hash".into());
        fields.insert("age".into(), FieldValue::Int(30));
        Entity::new(Arc::clone(connector), "a1", fields, false)
    }

    #[test]
    fn typed_getters() {
        let (_, connector) = setup();
        let entity = account(&connector);
        assert_eq!(entity.get_str("email"), Some("a@test.com"));
        assert_eq!(entity.get_i64("age"), Some(30));
        assert_eq!(entity.get_f64("age"), Some(30.0));
        assert_eq!(entity.get_bool("age"), None);
        assert_eq!(entity.get("missing"), None);
    }

    #[test]
    fn setting_null_removes_field() {
        let (_, connector) = setup();
        let mut entity = account(&connector);
        entity.set("email", FieldValue::Null);
        assert!(entity.get("email").is_none());
        assert!(!entity.fields().contains_key("email"));
    }

    #[test]
    fn to_json_hides_secrets() {
        let (_, connector) = setup();
        let entity = account(&connector);
        assert_eq!(
            entity.to_json(),
            json!({"id": "a1", "email": "a@test.com", "age": 30})
        );
        assert_eq!(entity.to_json_with_secrets()["password"], json!("hash"));
    }

    #[tokio::test]
    async fn save_clears_dirty_flag() {
        let (backend, connector) = setup();
        let mut entity = account(&connector);
        assert!(entity.is_dirty());
        entity.save().await.unwrap();
        assert!(!entity.is_dirty());

        entity.set("age", 31i64);
        assert!(entity.is_dirty());
        entity.save().await.unwrap();

        let raw = backend.hash_get_all("accounts:a1").await.unwrap();
        assert_eq!(raw["age"], "31");
    }

    #[tokio::test]
    async fn delete_keeps_in_memory_state() {
        let (backend, connector) = setup();
        let mut entity = account(&connector);
        entity.save().await.unwrap();
        entity.delete().await.unwrap();

        assert_eq!(backend.key_count(), 0);
        assert_eq!(entity.get_str("email"), Some("a@test.com"));
    }

    #[test]
    fn unset_missing_field_stays_clean() {
        let (_, connector) = setup();
        let mut entity: Entity<Account> =
            Entity::new(Arc::clone(&connector), "a2", FieldMap::new(), true);
        assert!(entity.unset("email").is_none());
        assert!(!entity.is_dirty());
    }
}
