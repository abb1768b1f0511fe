//! # panelstore Storage
//!
//! Key-value backend trait and implementations for panelstore.
//!
//! This crate provides the lowest-level storage abstraction. Backends are
//! **opaque string stores** built from two primitive data structures:
//! field→string hash maps and string sets. They know nothing about tables,
//! schemas, indexes or encryption.
//!
//! ## Design Principles
//!
//! - Backends expose hash, set, cursor-scan and batch primitives only
//! - A [`Batch`] runs without interleaving with other clients' commands
//! - Must be `Send + Sync` so one handle can be shared process-wide
//! - panelstore owns all key layout and value interpretation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`RedisBackend`] - For Redis-compatible servers (feature `redis`)
//!
//! ## Example
//!
//! ```rust
//! use panelstore_storage::{Batch, InMemoryBackend, KeyValueBackend};
//!
//! # tokio_test_block(async {
//! let backend = InMemoryBackend::new();
//! let mut batch = Batch::new();
//! batch.hash_set("users:1", vec![("name".into(), "alice".into())]);
//! backend.execute(batch).await.unwrap();
//!
//! let fields = backend.hash_get_all("users:1").await.unwrap();
//! assert_eq!(fields.get("name").map(String::as_str), Some("alice"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod glob;
mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

pub use backend::{Batch, Command, KeyValueBackend, Reply, SCAN_START};
pub use error::{StorageError, StorageResult};
pub use glob::{escape_glob, glob_match};
pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
