//! Redis backend.

use crate::backend::{Batch, Command, KeyValueBackend, Reply};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::MultiplexedConnection;
use redis::{Client, FromRedisValue, RedisError, Value};
use std::collections::HashMap;

impl From<RedisError> for StorageError {
    fn from(err: RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StorageError::Connection(err.to_string())
        } else {
            StorageError::Backend(err.to_string())
        }
    }
}

/// A backend talking to a Redis-compatible server.
///
/// Holds one multiplexed connection shared by every caller. Batches run
/// as a `MULTI`/`EXEC` pipeline so they are never interleaved with other
/// clients' commands.
pub struct RedisBackend {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Creates a backend for the given `redis://` URL without connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn new(url: &str) -> StorageResult<Self> {
        let client = Client::open(url).map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
        })
    }

    fn connection(&self) -> StorageResult<MultiplexedConnection> {
        self.connection
            .read()
            .clone()
            .ok_or(StorageError::NotConnected)
    }

    fn convert_reply(command: &Command, value: &Value) -> StorageResult<Reply> {
        let unexpected = |_| StorageError::UnexpectedReply {
            command: command.name(),
        };
        match command {
            Command::HashGetAll(_) => HashMap::<String, String>::from_redis_value(value)
                .map(Reply::Hash)
                .map_err(unexpected),
            Command::SetMembers(_) => Vec::<String>::from_redis_value(value)
                .map(Reply::Members)
                .map_err(unexpected),
            _ => i64::from_redis_value(value)
                .map(Reply::Count)
                .map_err(unexpected),
        }
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn connect(&self) -> StorageResult<()> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *self.connection.write() = Some(connection);
        tracing::debug!("redis connection established");
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        self.connection.write().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        let mut conn = self.connection()?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(fields)
    }

    async fn set_members(&self, key: &str) -> StorageResult<Vec<String>> {
        let mut conn = self.connection()?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StorageResult<(u64, Vec<String>)> {
        let mut conn = self.connection()?;
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await?;
        Ok((next, keys))
    }

    async fn execute(&self, batch: Batch) -> StorageResult<Vec<Reply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in batch.commands() {
            match command {
                Command::HashGetAll(key) => {
                    pipe.cmd("HGETALL").arg(key);
                }
                Command::HashSet { key, fields } => {
                    let cmd = pipe.cmd("HSET").arg(key);
                    for (field, value) in fields {
                        cmd.arg(field).arg(value);
                    }
                }
                Command::Delete(key) => {
                    pipe.cmd("DEL").arg(key);
                }
                Command::SetAdd { key, member } => {
                    pipe.cmd("SADD").arg(key).arg(member);
                }
                Command::SetRemove { key, member } => {
                    pipe.cmd("SREM").arg(key).arg(member);
                }
                Command::SetMembers(key) => {
                    pipe.cmd("SMEMBERS").arg(key);
                }
            }
        }

        let values: Vec<Value> = pipe.query_async(&mut conn).await?;
        if values.len() != batch.len() {
            return Err(StorageError::UnexpectedReply { command: "EXEC" });
        }
        batch
            .commands()
            .iter()
            .zip(values.iter())
            .map(|(command, value)| Self::convert_reply(command, value))
            .collect()
    }
}
