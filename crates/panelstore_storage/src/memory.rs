//! In-memory key-value backend for testing.

use crate::backend::{Batch, Command, KeyValueBackend, Reply, SCAN_START};
use crate::error::{StorageError, StorageResult};
use crate::glob::glob_match;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A value stored under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
}

/// An in-memory key-value backend.
///
/// This backend keeps all data in memory and mirrors the observable
/// semantics of a Redis server for the commands panelstore uses:
/// - Empty hashes and sets disappear
/// - Commands against a key of the other type fail with `WrongType`
/// - Scans walk the key space in steps of `count` examined keys and may
///   return empty steps
/// - A key present for the whole of a scan is returned by it, even when
///   other keys are added or deleted between steps
///
/// Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across tasks. A batch
/// is applied under a single write lock, so it is never interleaved with
/// other commands.
#[derive(Debug)]
pub struct InMemoryBackend {
    data: RwLock<BTreeMap<String, Entry>>,
    connected: AtomicBool,
    /// Open scan cursors, each mapped to the last key it examined.
    cursors: Mutex<HashMap<u64, String>>,
    next_cursor: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            connected: AtomicBool::new(true),
            cursors: Mutex::new(HashMap::new()),
            next_cursor: AtomicU64::new(SCAN_START + 1),
        }
    }
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend, already connected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every key currently stored, in sorted order.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.data.read().len()
    }

    /// Clears all data from the backend.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    fn ensure_connected(&self) -> StorageResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::NotConnected)
        }
    }

    fn read_hash(data: &BTreeMap<String, Entry>, key: &str) -> StorageResult<HashMap<String, String>> {
        match data.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(fields)) => Ok(fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
            Some(Entry::Set(_)) => Err(StorageError::wrong_type(key)),
        }
    }

    fn read_set(data: &BTreeMap<String, Entry>, key: &str) -> StorageResult<Vec<String>> {
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(Entry::Hash(_)) => Err(StorageError::wrong_type(key)),
        }
    }

    /// Checks a command against current key types without mutating.
    fn check(data: &BTreeMap<String, Entry>, command: &Command) -> StorageResult<()> {
        match command {
            Command::HashGetAll(key) | Command::HashSet { key, .. } => match data.get(key) {
                Some(Entry::Set(_)) => Err(StorageError::wrong_type(key.as_str())),
                _ => Ok(()),
            },
            Command::SetAdd { key, .. }
            | Command::SetRemove { key, .. }
            | Command::SetMembers(key) => match data.get(key) {
                Some(Entry::Hash(_)) => Err(StorageError::wrong_type(key.as_str())),
                _ => Ok(()),
            },
            Command::Delete(_) => Ok(()),
        }
    }

    fn apply(data: &mut BTreeMap<String, Entry>, command: Command) -> StorageResult<Reply> {
        Self::check(data, &command)?;
        let reply = match command {
            Command::HashGetAll(key) => Reply::Hash(Self::read_hash(data, &key)?),
            Command::SetMembers(key) => Reply::Members(Self::read_set(data, &key)?),
            Command::HashSet { key, fields } => {
                let entry = data
                    .entry(key)
                    .or_insert_with(|| Entry::Hash(BTreeMap::new()));
                let mut added = 0;
                if let Entry::Hash(map) = entry {
                    for (field, value) in fields {
                        if map.insert(field, value).is_none() {
                            added += 1;
                        }
                    }
                }
                Reply::Count(added)
            }
            Command::Delete(key) => Reply::Count(i64::from(data.remove(&key).is_some())),
            Command::SetAdd { key, member } => {
                let entry = data
                    .entry(key)
                    .or_insert_with(|| Entry::Set(BTreeSet::new()));
                let added = match entry {
                    Entry::Set(set) => set.insert(member),
                    Entry::Hash(_) => false,
                };
                Reply::Count(i64::from(added))
            }
            Command::SetRemove { key, member } => {
                let mut removed = false;
                let mut now_empty = false;
                if let Some(Entry::Set(set)) = data.get_mut(&key) {
                    removed = set.remove(&member);
                    now_empty = set.is_empty();
                }
                if now_empty {
                    data.remove(&key);
                }
                Reply::Count(i64::from(removed))
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    async fn connect(&self) -> StorageResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        self.ensure_connected()?;
        Self::read_hash(&self.data.read(), key)
    }

    async fn set_members(&self, key: &str) -> StorageResult<Vec<String>> {
        self.ensure_connected()?;
        Self::read_set(&self.data.read(), key)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StorageResult<(u64, Vec<String>)> {
        self.ensure_connected()?;
        let data = self.data.read();
        let step = count.max(1);

        // Resume after the last examined key, so deletions behind the
        // cursor cannot shift unvisited keys out of reach.
        let resume = if cursor == SCAN_START {
            Bound::Unbounded
        } else {
            match self.cursors.lock().remove(&cursor) {
                Some(last) => Bound::Excluded(last),
                None => return Ok((SCAN_START, Vec::new())),
            }
        };

        let examined: Vec<&String> = data
            .range::<String, _>((resume, Bound::Unbounded))
            .take(step)
            .map(|(key, _)| key)
            .collect();
        let keys = examined
            .iter()
            .filter(|key| glob_match(pattern, key))
            .map(|key| (*key).clone())
            .collect();

        let next = match examined.last() {
            Some(last) if examined.len() == step => {
                let more = data
                    .range::<String, _>((Bound::Excluded(*last), Bound::Unbounded))
                    .next()
                    .is_some();
                if more {
                    let next = self.next_cursor.fetch_add(1, Ordering::Relaxed);
                    self.cursors.lock().insert(next, (*last).clone());
                    next
                } else {
                    SCAN_START
                }
            }
            _ => SCAN_START,
        };
        Ok((next, keys))
    }

    async fn execute(&self, batch: Batch) -> StorageResult<Vec<Reply>> {
        self.ensure_connected()?;
        let mut data = self.data.write();

        // Validate the whole batch first so a type error leaves no partial writes.
        for command in batch.commands() {
            Self::check(&data, command)?;
        }

        let mut replies = Vec::with_capacity(batch.len());
        for command in batch.into_commands() {
            replies.push(Self::apply(&mut data, command)?);
        }
        Ok(replies)
    }
}
