//! Store connector: physical I/O, field encryption and index bookkeeping.
//!
//! # Key layout
//!
//! | Purpose | Key | Type |
//! |---|---|---|
//! | Primary record | `<table>:<id>` | hash of field → string |
//! | Secondary index | `idx:<table>:<field>:<value>` | set of ids |
//!
//! # Consistency
//!
//! `save` spans two round trips: it reads the previous record, then writes
//! index changes and the new record in one batch. Two concurrent saves of
//! the same id can therefore leave a stale index membership or revert the
//! record to the earlier caller's data. The batch itself is never
//! interleaved with other clients, and `rebuild_indexes` in
//! [`RebuildMode::Exact`] restores the index invariant wholesale.

use crate::codec::FieldValue;
use crate::config::{RebuildMode, StoreConfig};
use crate::crypto::{Decrypted, FieldCipher};
use crate::error::{CoreError, CoreResult};
use crate::schema::TableSchema;
use panelstore_storage::{Batch, KeyValueBackend, StorageError, SCAN_START};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Decoded fields of one record.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Summary of an index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Records scanned.
    pub records: usize,
    /// Index memberships written.
    pub memberships: usize,
    /// Index sets dropped before re-adding (exact mode only).
    pub dropped_sets: usize,
}

/// One index membership: `id` inside the set stored at `key`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct IndexEntry {
    /// Index set key.
    pub key: String,
    /// Entity id.
    pub id: String,
}

/// Result of checking the index invariant of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Memberships the records require but the index sets lack.
    pub missing: Vec<IndexEntry>,
    /// Memberships present in index sets that no record justifies.
    pub stale: Vec<IndexEntry>,
    /// Index sets under the table whose field is not an indexed column.
    /// Their members are also listed as stale.
    pub unindexed_sets: Vec<String>,
}

impl IndexReport {
    /// Returns true if the index sets match the records exactly.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty()
    }
}

/// Owns the backend connection and implements the storage primitives.
///
/// The connector is shared by every table of a store. All methods take
/// the table's [`TableSchema`] explicitly.
pub struct Connector {
    backend: Arc<dyn KeyValueBackend>,
    cipher: Option<FieldCipher>,
    scan_batch_size: usize,
    rebuild_mode: RebuildMode,
}

impl Connector {
    /// Creates a connector over an existing backend.
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: &StoreConfig) -> Self {
        Self {
            backend,
            cipher: config.encryption_key.clone().map(FieldCipher::new),
            scan_batch_size: config.scan_batch_size.max(1),
            rebuild_mode: config.rebuild_mode,
        }
    }

    /// Creates a connector for the Redis server named in `config`.
    ///
    /// The connection is not opened until [`Connector::connect`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    #[cfg(feature = "redis")]
    pub fn open(config: &StoreConfig) -> CoreResult<Self> {
        let backend = panelstore_storage::RedisBackend::new(&config.redis_url)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    /// Returns true if field encryption is enabled.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Returns the configured default rebuild mode.
    #[must_use]
    pub fn rebuild_mode(&self) -> RebuildMode {
        self.rebuild_mode
    }

    /// Connects to the backend, logging and swallowing any failure.
    ///
    /// Startup carries on with a connector that is not connected; the
    /// failure surfaces later as `NotConnected` errors from operations.
    pub async fn connect(&self) {
        if let Err(e) = self.try_connect().await {
            error!(error = %e, "backend connection failed");
        }
    }

    /// Connects to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    pub async fn try_connect(&self) -> CoreResult<()> {
        self.backend.connect().await?;
        debug!(encrypted = self.is_encrypted(), "connector ready");
        Ok(())
    }

    /// Releases the backend connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close.
    pub async fn disconnect(&self) -> CoreResult<()> {
        self.backend.disconnect().await?;
        Ok(())
    }

    /// Returns true if the backend holds a connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    fn seal(&self, plaintext: String) -> String {
        match &self.cipher {
            Some(cipher) => cipher.encrypt(&plaintext),
            None => plaintext,
        }
    }

    fn open_value(&self, stored: &str) -> Decrypted {
        match &self.cipher {
            Some(cipher) => cipher.decrypt(stored),
            None => Decrypted::Plain(stored.to_string()),
        }
    }

    /// Decrypts every field of a raw record into its plaintext encoding,
    /// failing open. Used for index bookkeeping.
    fn plaintexts(&self, raw: &HashMap<String, String>) -> BTreeMap<String, String> {
        raw.iter()
            .map(|(field, stored)| (field.clone(), self.open_value(stored).into_inner()))
            .collect()
    }

    /// Decrypts and decodes a raw record, applying each column's failure policy.
    fn decode_record(
        &self,
        schema: &TableSchema,
        id: &str,
        raw: HashMap<String, String>,
    ) -> CoreResult<FieldMap> {
        let mut fields = FieldMap::new();
        for (field, stored) in raw {
            let plain = match self.open_value(&stored) {
                Decrypted::Plain(plain) => plain,
                Decrypted::FailedOpen(original) => {
                    if !schema.is_fail_open(&field) {
                        return Err(CoreError::decryption_failed(schema.table_name, field, id));
                    }
                    warn!(
                        table = schema.table_name,
                        field = %field,
                        id,
                        "decryption failed, returning stored value"
                    );
                    original
                }
            };
            fields.insert(field, FieldValue::decode(&plain).into_value());
        }
        Ok(fields)
    }

    /// Returns the stored field map of a record without decryption or decoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn raw_record(
        &self,
        schema: &TableSchema,
        id: &str,
    ) -> CoreResult<HashMap<String, String>> {
        Ok(self.backend.hash_get_all(&schema.record_key(id)).await?)
    }

    /// Saves `data` as the complete record for `id`.
    ///
    /// Null fields are omitted. Index sets of indexed columns whose value
    /// changed are updated in the same batch that replaces the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn save(&self, schema: &TableSchema, id: &str, data: &FieldMap) -> CoreResult<()> {
        let record_key = schema.record_key(id);
        let previous = self.plaintexts(&self.backend.hash_get_all(&record_key).await?);

        let mut batch = Batch::new();
        for column in schema.indexed_columns() {
            let old_token = previous.get(column.name);
            let new_token = data.get(column.name).and_then(FieldValue::index_token);
            if old_token == new_token.as_ref() {
                continue;
            }
            if let Some(old) = old_token {
                batch.set_remove(schema.index_key(column.name, old), id);
            }
            if let Some(new) = new_token {
                batch.set_add(schema.index_key(column.name, &new), id);
            }
        }

        let encoded: Vec<(String, String)> = data
            .iter()
            .filter_map(|(field, value)| Some((field.clone(), self.seal(value.encode()?))))
            .collect();

        batch.delete(record_key.as_str());
        batch.hash_set(record_key, encoded);

        debug!(table = schema.table_name, id, commands = batch.len(), "save");
        self.backend.execute(batch).await?;
        Ok(())
    }

    /// Finds the record for `id`.
    ///
    /// Returns `None` if the record has no fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails, or if a strict column
    /// cannot be decrypted.
    pub async fn find(&self, schema: &TableSchema, id: &str) -> CoreResult<Option<FieldMap>> {
        let raw = self.raw_record(schema, id).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        self.decode_record(schema, id, raw).map(Some)
    }

    /// Returns true if a record exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn exists(&self, schema: &TableSchema, id: &str) -> CoreResult<bool> {
        Ok(!self.raw_record(schema, id).await?.is_empty())
    }

    /// Deletes the record for `id` and its index memberships.
    ///
    /// Deleting an id that does not exist is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn delete(&self, schema: &TableSchema, id: &str) -> CoreResult<()> {
        let record_key = schema.record_key(id);
        let current = self.plaintexts(&self.backend.hash_get_all(&record_key).await?);

        let mut batch = Batch::new();
        for column in schema.indexed_columns() {
            if let Some(token) = current.get(column.name) {
                batch.set_remove(schema.index_key(column.name, token), id);
            }
        }
        batch.delete(record_key);

        debug!(table = schema.table_name, id, "delete");
        self.backend.execute(batch).await?;
        Ok(())
    }

    /// Scans keys matching `pattern` step by step, fetching the hashes of
    /// each step's keys in one batch.
    async fn scan_hashes(
        &self,
        pattern: &str,
    ) -> CoreResult<Vec<(String, HashMap<String, String>)>> {
        let mut out = Vec::new();
        let mut cursor = SCAN_START;
        loop {
            let (next, keys) = self
                .backend
                .scan(cursor, pattern, self.scan_batch_size)
                .await?;

            if !keys.is_empty() {
                let mut batch = Batch::new();
                for key in &keys {
                    batch.hash_get_all(key.as_str());
                }
                let replies = self.backend.execute(batch).await?;
                for (key, reply) in keys.into_iter().zip(replies) {
                    let hash = reply.into_hash().ok_or(StorageError::UnexpectedReply {
                        command: "HGETALL",
                    })?;
                    out.push((key, hash));
                }
            }

            cursor = next;
            if cursor == SCAN_START {
                break;
            }
        }
        Ok(out)
    }

    /// Scans every key matching `pattern`.
    ///
    /// A scan may report the same key more than once, so keys are
    /// collected into a set.
    async fn scan_keys(&self, pattern: &str) -> CoreResult<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        let mut cursor = SCAN_START;
        loop {
            let (next, keys) = self
                .backend
                .scan(cursor, pattern, self.scan_batch_size)
                .await?;
            out.extend(keys);
            cursor = next;
            if cursor == SCAN_START {
                break;
            }
        }
        Ok(out)
    }

    /// Scans the raw records of a table, keyed by id. Empty hashes are skipped.
    async fn scan_records(
        &self,
        schema: &TableSchema,
    ) -> CoreResult<BTreeMap<String, HashMap<String, String>>> {
        let hashes = self.scan_hashes(&schema.scan_pattern()).await?;
        Ok(hashes
            .into_iter()
            .filter(|(_, raw)| !raw.is_empty())
            .filter_map(|(key, raw)| Some((schema.id_from_key(&key)?.to_string(), raw)))
            .collect())
    }

    /// Returns every record of a table, keyed by id.
    ///
    /// Uses a cursor scan in steps of the configured batch size, so the
    /// backend is never blocked by one large request.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails, or if a strict column
    /// cannot be decrypted.
    pub async fn get_all(&self, schema: &TableSchema) -> CoreResult<BTreeMap<String, FieldMap>> {
        let records = self.scan_records(schema).await?;
        debug!(table = schema.table_name, records = records.len(), "get_all");
        records
            .into_iter()
            .map(|(id, raw)| {
                let fields = self.decode_record(schema, &id, raw)?;
                Ok((id, fields))
            })
            .collect()
    }

    /// Counts the records of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn count(&self, schema: &TableSchema) -> CoreResult<usize> {
        Ok(self.scan_keys(&schema.scan_pattern()).await?.len())
    }

    /// Finds every record whose indexed `field` currently holds `value`.
    ///
    /// Ids in the index set whose record no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FieldNotIndexed`] if `field` is not declared
    /// as indexed, or an error if the backend fails.
    pub async fn find_by_param(
        &self,
        schema: &TableSchema,
        field: &str,
        value: &FieldValue,
    ) -> CoreResult<Vec<(String, FieldMap)>> {
        if !schema.is_indexed(field) {
            return Err(CoreError::field_not_indexed(schema.table_name, field));
        }
        let Some(token) = value.index_token() else {
            return Ok(Vec::new());
        };

        let ids = self
            .backend
            .set_members(&schema.index_key(field, &token))
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = Batch::new();
        for id in &ids {
            batch.hash_get_all(schema.record_key(id));
        }
        let replies = self.backend.execute(batch).await?;

        let mut found = Vec::with_capacity(ids.len());
        for (id, reply) in ids.into_iter().zip(replies) {
            let raw = reply.into_hash().ok_or(StorageError::UnexpectedReply {
                command: "HGETALL",
            })?;
            if raw.is_empty() {
                debug!(table = schema.table_name, field, id = %id, "skipping stale index member");
                continue;
            }
            let fields = self.decode_record(schema, &id, raw)?;
            found.push((id, fields));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    /// Re-adds every index membership implied by the current records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn rebuild_indexes(
        &self,
        schema: &TableSchema,
        mode: RebuildMode,
    ) -> CoreResult<RebuildReport> {
        let mut report = RebuildReport::default();

        if mode == RebuildMode::Exact {
            let index_keys: Vec<String> = self
                .scan_keys(&schema.index_scan_pattern())
                .await?
                .into_iter()
                .collect();
            for chunk in index_keys.chunks(self.scan_batch_size) {
                let mut batch = Batch::new();
                for key in chunk {
                    batch.delete(key.as_str());
                }
                self.backend.execute(batch).await?;
            }
            report.dropped_sets = index_keys.len();
        }

        let records = self.scan_records(schema).await?;
        report.records = records.len();

        let memberships = self.expected_memberships(schema, &records);
        for chunk in memberships.chunks(self.scan_batch_size) {
            let mut batch = Batch::new();
            for entry in chunk {
                batch.set_add(entry.key.as_str(), entry.id.as_str());
            }
            self.backend.execute(batch).await?;
        }
        report.memberships = memberships.len();

        debug!(
            table = schema.table_name,
            ?mode,
            records = report.records,
            memberships = report.memberships,
            dropped = report.dropped_sets,
            "rebuild_indexes"
        );
        Ok(report)
    }

    fn expected_memberships(
        &self,
        schema: &TableSchema,
        records: &BTreeMap<String, HashMap<String, String>>,
    ) -> Vec<IndexEntry> {
        let mut entries = Vec::new();
        for (id, raw) in records {
            let plain = self.plaintexts(raw);
            for column in schema.indexed_columns() {
                if let Some(token) = plain.get(column.name) {
                    entries.push(IndexEntry {
                        key: schema.index_key(column.name, token),
                        id: id.clone(),
                    });
                }
            }
        }
        entries
    }

    /// Compares index sets against the records of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn verify_indexes(&self, schema: &TableSchema) -> CoreResult<IndexReport> {
        let records = self.scan_records(schema).await?;
        let expected: BTreeSet<IndexEntry> = self
            .expected_memberships(schema, &records)
            .into_iter()
            .collect();

        let index_keys: Vec<String> = self
            .scan_keys(&schema.index_scan_pattern())
            .await?
            .into_iter()
            .collect();
        let unindexed_sets: Vec<String> = index_keys
            .iter()
            .filter(|key| schema.parse_index_key(key).is_none())
            .cloned()
            .collect();
        if !unindexed_sets.is_empty() {
            warn!(
                table = schema.table_name,
                sets = unindexed_sets.len(),
                "index sets for fields that are not indexed"
            );
        }

        let mut actual = BTreeSet::new();
        for chunk in index_keys.chunks(self.scan_batch_size) {
            let mut batch = Batch::new();
            for key in chunk {
                batch.set_members(key.as_str());
            }
            let replies = self.backend.execute(batch).await?;
            for (key, reply) in chunk.iter().zip(replies) {
                let members = reply.into_members().ok_or(StorageError::UnexpectedReply {
                    command: "SMEMBERS",
                })?;
                actual.extend(members.into_iter().map(|id| IndexEntry {
                    key: key.clone(),
                    id,
                }));
            }
        }

        Ok(IndexReport {
            missing: expected.difference(&actual).cloned().collect(),
            stale: actual.difference(&expected).cloned().collect(),
            unindexed_sets,
        })
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("encrypted", &self.is_encrypted())
            .field("scan_batch_size", &self.scan_batch_size)
            .field("rebuild_mode", &self.rebuild_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;
    use crate::schema::{Column, ColumnType};
    use async_trait::async_trait;
    use panelstore_storage::{InMemoryBackend, Reply, StorageResult};

    const USERS: TableSchema = TableSchema::new(
        "users",
        &[
            Column::new("email", ColumnType::TextUnique).indexed(),
            Column::new("name", ColumnType::String),
            Column::new("token", ColumnType::String).strict(),
        ],
    );

    fn connector() -> (Arc<InMemoryBackend>, Connector) {
        let backend = Arc::new(InMemoryBackend::new());
        let config = StoreConfig::new().scan_batch_size(3).unwrap();
        let connector = Connector::new(backend.clone(), &config);
        (backend, connector)
    }

    fn encrypted_connector() -> (Arc<InMemoryBackend>, Connector) {
        let backend = Arc::new(InMemoryBackend::new());
        let config = StoreConfig::new().encryption_key(EncryptionKey::generate());
        let connector = Connector::new(backend.clone(), &config);
        (backend, connector)
    }

    fn fields(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn save_omits_null_fields() {
        let (backend, connector) = connector();
        let data = fields(&[("name", "bob".into()), ("email", FieldValue::Null)]);
        connector.save(&USERS, "u1", &data).await.unwrap();

        let raw = backend.hash_get_all("users:u1").await.unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw["name"], "bob");
        assert_eq!(backend.keys(), vec!["users:u1".to_string()]);
    }

    #[tokio::test]
    async fn save_replaces_whole_record() {
        let (_, connector) = connector();
        let first = fields(&[("name", "bob".into()), ("email", "b@test.com".into())]);
        connector.save(&USERS, "u1", &first).await.unwrap();
        let second = fields(&[("name", "robert".into())]);
        connector.save(&USERS, "u1", &second).await.unwrap();

        let found = connector.find(&USERS, "u1").await.unwrap().unwrap();
        assert_eq!(found, second);
    }

    #[tokio::test]
    async fn save_with_no_fields_leaves_no_record() {
        let (backend, connector) = connector();
        connector.save(&USERS, "u1", &FieldMap::new()).await.unwrap();
        assert!(connector.find(&USERS, "u1").await.unwrap().is_none());
        assert_eq!(backend.key_count(), 0);
    }

    #[tokio::test]
    async fn unchanged_index_value_issues_no_set_commands() {
        let (backend, connector) = connector();
        let data = fields(&[("email", "a@test.com".into())]);
        connector.save(&USERS, "u1", &data).await.unwrap();
        connector.save(&USERS, "u1", &data).await.unwrap();

        let members = backend.set_members("idx:users:email:a@test.com").await.unwrap();
        assert_eq!(members, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn delete_missing_id_is_noop() {
        let (_, connector) = connector();
        connector.delete(&USERS, "ghost").await.unwrap();
    }

    #[tokio::test]
    async fn find_by_null_returns_nothing() {
        let (_, connector) = connector();
        let found = connector
            .find_by_param(&USERS, "email", &FieldValue::Null)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn find_by_unindexed_field_fails() {
        let (_, connector) = connector();
        let err = connector
            .find_by_param(&USERS, "name", &"bob".into())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::FieldNotIndexed { .. }));
    }

    #[tokio::test]
    async fn find_by_param_skips_stale_members() {
        let (backend, connector) = connector();
        let mut batch = Batch::new();
        batch.set_add("idx:users:email:a@test.com", "gone");
        backend.execute(batch).await.unwrap();

        let found = connector
            .find_by_param(&USERS, "email", &"a@test.com".into())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn encrypted_values_are_opaque() {
        let (backend, connector) = encrypted_connector();
        let data = fields(&[("name", "bob".into())]);
        connector.save(&USERS, "u1", &data).await.unwrap();

        let raw = backend.hash_get_all("users:u1").await.unwrap();
        assert_ne!(raw["name"], "bob");
        assert!(raw["name"].contains(':'));
        assert_eq!(connector.find(&USERS, "u1").await.unwrap().unwrap(), data);
    }

    #[tokio::test]
    async fn index_tokens_are_plaintext_under_encryption() {
        let (backend, connector) = encrypted_connector();
        let data = fields(&[("email", "a@test.com".into())]);
        connector.save(&USERS, "u1", &data).await.unwrap();
        assert!(!backend
            .set_members("idx:users:email:a@test.com")
            .await
            .unwrap()
            .is_empty());

        connector.delete(&USERS, "u1").await.unwrap();
        assert_eq!(backend.key_count(), 0);
    }

    #[tokio::test]
    async fn plaintext_legacy_values_fail_open() {
        let (backend, connector) = encrypted_connector();
        let mut batch = Batch::new();
        batch.hash_set("users:u1", vec![("name".into(), "legacy".into())]);
        backend.execute(batch).await.unwrap();

        let found = connector.find(&USERS, "u1").await.unwrap().unwrap();
        assert_eq!(found["name"], FieldValue::Text("legacy".into()));
    }

    #[tokio::test]
    async fn strict_column_surfaces_decryption_failure() {
        let (backend, connector) = encrypted_connector();
        let mut batch = Batch::new();
        batch.hash_set("users:u1", vec![("token".into(), "not-encrypted".into())]);
        backend.execute(batch).await.unwrap();

        let err = connector.find(&USERS, "u1").await.unwrap_err();
        assert!(matches!(err, CoreError::DecryptionFailed { .. }));
    }

    #[tokio::test]
    async fn exact_rebuild_drops_stale_sets() {
        let (backend, connector) = connector();
        connector
            .save(&USERS, "u1", &fields(&[("email", "a@test.com".into())]))
            .await
            .unwrap();
        let mut batch = Batch::new();
        batch.set_add("idx:users:email:old@test.com", "u1");
        backend.execute(batch).await.unwrap();

        let additive = connector
            .rebuild_indexes(&USERS, RebuildMode::Additive)
            .await
            .unwrap();
        assert_eq!(additive.dropped_sets, 0);
        assert!(!connector.verify_indexes(&USERS).await.unwrap().is_consistent());

        let exact = connector
            .rebuild_indexes(&USERS, RebuildMode::Exact)
            .await
            .unwrap();
        assert_eq!(exact.dropped_sets, 2);
        assert_eq!(exact.memberships, 1);
        assert!(connector.verify_indexes(&USERS).await.unwrap().is_consistent());
    }

    /// Reports every scanned key twice, as Redis may during a rehash.
    #[derive(Debug, Default)]
    struct RepeatingScan(InMemoryBackend);

    #[async_trait]
    impl KeyValueBackend for RepeatingScan {
        async fn connect(&self) -> StorageResult<()> {
            self.0.connect().await
        }

        async fn disconnect(&self) -> StorageResult<()> {
            self.0.disconnect().await
        }

        fn is_connected(&self) -> bool {
            self.0.is_connected()
        }

        async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>> {
            self.0.hash_get_all(key).await
        }

        async fn set_members(&self, key: &str) -> StorageResult<Vec<String>> {
            self.0.set_members(key).await
        }

        async fn scan(
            &self,
            cursor: u64,
            pattern: &str,
            count: usize,
        ) -> StorageResult<(u64, Vec<String>)> {
            let (next, keys) = self.0.scan(cursor, pattern, count).await?;
            let repeated = keys.iter().chain(&keys).cloned().collect();
            Ok((next, repeated))
        }

        async fn execute(&self, batch: Batch) -> StorageResult<Vec<Reply>> {
            self.0.execute(batch).await
        }
    }

    #[tokio::test]
    async fn repeated_scan_keys_are_counted_once() {
        let config = StoreConfig::new().scan_batch_size(2).unwrap();
        let connector = Connector::new(Arc::new(RepeatingScan::default()), &config);
        for (id, email) in [("u1", "a@test.com"), ("u2", "b@test.com"), ("u3", "c@test.com")] {
            connector
                .save(&USERS, id, &fields(&[("email", email.into())]))
                .await
                .unwrap();
        }

        assert_eq!(connector.count(&USERS).await.unwrap(), 3);
        assert_eq!(connector.get_all(&USERS).await.unwrap().len(), 3);
        assert!(connector.verify_indexes(&USERS).await.unwrap().is_consistent());

        let exact = connector
            .rebuild_indexes(&USERS, RebuildMode::Exact)
            .await
            .unwrap();
        assert_eq!(exact.dropped_sets, 3);
        assert_eq!(exact.records, 3);
        assert_eq!(exact.memberships, 3);
    }

    #[tokio::test]
    async fn verify_flags_sets_for_unindexed_fields() {
        let (backend, connector) = connector();
        connector
            .save(&USERS, "u1", &fields(&[("email", "a@test.com".into())]))
            .await
            .unwrap();
        let mut batch = Batch::new();
        batch.set_add("idx:users:name:bob", "u1");
        backend.execute(batch).await.unwrap();

        let report = connector.verify_indexes(&USERS).await.unwrap();
        assert_eq!(report.unindexed_sets, ["idx:users:name:bob"]);
        assert_eq!(
            report.stale,
            vec![IndexEntry {
                key: "idx:users:name:bob".into(),
                id: "u1".into()
            }]
        );
        assert!(report.missing.is_empty());
    }

    #[tokio::test]
    async fn verify_reports_missing_memberships() {
        let (backend, connector) = connector();
        connector
            .save(&USERS, "u1", &fields(&[("email", "a@test.com".into())]))
            .await
            .unwrap();
        let mut batch = Batch::new();
        batch.set_remove("idx:users:email:a@test.com", "u1");
        backend.execute(batch).await.unwrap();

        let report = connector.verify_indexes(&USERS).await.unwrap();
        assert_eq!(
            report.missing,
            vec![IndexEntry {
                key: "idx:users:email:a@test.com".into(),
                id: "u1".into()
            }]
        );
        assert!(report.stale.is_empty());
    }

    #[tokio::test]
    async fn disconnected_operations_fail_until_reconnect() {
        let (_, connector) = connector();
        connector.disconnect().await.unwrap();
        assert!(!connector.is_connected());
        let err = connector.find(&USERS, "u1").await.unwrap_err();
        assert!(err.is_connection_failure());

        connector.connect().await;
        assert!(connector.is_connected());
        assert!(connector.find(&USERS, "u1").await.unwrap().is_none());
    }
}
