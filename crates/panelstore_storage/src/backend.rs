//! Key-value backend trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// Cursor value that both starts and ends a [`KeyValueBackend::scan`].
pub const SCAN_START: u64 = 0;

/// A single command inside a [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch every field of a hash (`HGETALL`).
    HashGetAll(String),
    /// Write fields into a hash (`HSET`). Must carry at least one field.
    HashSet {
        /// Hash key.
        key: String,
        /// Field/value pairs to write.
        fields: Vec<(String, String)>,
    },
    /// Remove a key of any type (`DEL`).
    Delete(String),
    /// Add a member to a set (`SADD`).
    SetAdd {
        /// Set key.
        key: String,
        /// Member to add.
        member: String,
    },
    /// Remove a member from a set (`SREM`).
    SetRemove {
        /// Set key.
        key: String,
        /// Member to remove.
        member: String,
    },
    /// Fetch every member of a set (`SMEMBERS`).
    SetMembers(String),
}

impl Command {
    /// Returns the backend command name, for logging and error reporting.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::HashGetAll(_) => "HGETALL",
            Command::HashSet { .. } => "HSET",
            Command::Delete(_) => "DEL",
            Command::SetAdd { .. } => "SADD",
            Command::SetRemove { .. } => "SREM",
            Command::SetMembers(_) => "SMEMBERS",
        }
    }
}

/// The reply to one [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Reply to `HashGetAll`. Empty when the key does not exist.
    Hash(HashMap<String, String>),
    /// Reply to `SetMembers`. Empty when the key does not exist.
    Members(Vec<String>),
    /// Reply to write commands: the number of elements affected.
    Count(i64),
}

impl Reply {
    /// Consumes the reply as a hash.
    #[must_use]
    pub fn into_hash(self) -> Option<HashMap<String, String>> {
        match self {
            Reply::Hash(map) => Some(map),
            _ => None,
        }
    }

    /// Consumes the reply as a member list.
    #[must_use]
    pub fn into_members(self) -> Option<Vec<String>> {
        match self {
            Reply::Members(members) => Some(members),
            _ => None,
        }
    }
}

/// An ordered group of commands submitted in one round trip.
///
/// The backend executes the commands in order and does not interleave
/// other clients' commands between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Appends a `HashGetAll`.
    pub fn hash_get_all(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::HashGetAll(key.into()))
    }

    /// Appends a `HashSet`. An empty field list is skipped.
    pub fn hash_set(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        if fields.is_empty() {
            return self;
        }
        self.push(Command::HashSet {
            key: key.into(),
            fields,
        })
    }

    /// Appends a `Delete`.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Delete(key.into()))
    }

    /// Appends a `SetAdd`.
    pub fn set_add(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SetAdd {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Appends a `SetRemove`.
    pub fn set_remove(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::SetRemove {
            key: key.into(),
            member: member.into(),
        })
    }

    /// Appends a `SetMembers`.
    pub fn set_members(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::SetMembers(key.into()))
    }

    /// Returns the queued commands.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no commands are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Consumes the batch, returning its commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// A key-value backend for panelstore.
///
/// Backends provide hash maps and sets addressed by string keys, a
/// non-blocking cursor scan over the key space, and batched execution.
/// panelstore owns the key layout - backends do not understand tables,
/// records or indexes.
///
/// # Invariants
///
/// - A hash or set that becomes empty ceases to exist
/// - `scan` returns [`SCAN_START`] as the next cursor once iteration is complete
/// - `scan` may return zero keys for a step that is not the last one
/// - `execute` returns exactly one [`Reply`] per command, in order
/// - Commands inside one batch are not interleaved with other clients
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::RedisBackend`] - For Redis-compatible servers
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Establishes the connection to the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn connect(&self) -> StorageResult<()>;

    /// Releases the connection. Later operations fail with `NotConnected`.
    async fn disconnect(&self) -> StorageResult<()>;

    /// Returns true if a connection is currently held.
    fn is_connected(&self) -> bool;

    /// Fetches every field of the hash stored at `key`.
    ///
    /// Returns an empty map if the key does not exist.
    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>>;

    /// Fetches every member of the set stored at `key`.
    ///
    /// Returns an empty list if the key does not exist.
    async fn set_members(&self, key: &str) -> StorageResult<Vec<String>>;

    /// Advances a cursor over keys matching the glob `pattern`.
    ///
    /// `count` is a hint for how many keys to examine in this step.
    /// Returns the next cursor and the matching keys found in this step.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> StorageResult<(u64, Vec<String>)>;

    /// Executes a batch of commands in one round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if any command fails; no replies are returned then.
    async fn execute(&self, batch: Batch) -> StorageResult<Vec<Reply>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hash_set_is_skipped() {
        let mut batch = Batch::new();
        batch.hash_set("users:1", Vec::new());
        assert!(batch.is_empty());
    }

    #[test]
    fn batch_keeps_order() {
        let mut batch = Batch::new();
        batch
            .set_remove("idx:users:email:a", "1")
            .set_add("idx:users:email:b", "1")
            .delete("users:1");

        let names: Vec<_> = batch.commands().iter().map(Command::name).collect();
        assert_eq!(names, vec!["SREM", "SADD", "DEL"]);
    }

    #[test]
    fn reply_conversions() {
        assert!(Reply::Count(1).into_hash().is_none());
        assert_eq!(
            Reply::Members(vec!["a".into()]).into_members(),
            Some(vec!["a".to_string()])
        );
    }
}
