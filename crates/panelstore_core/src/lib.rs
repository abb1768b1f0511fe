//! # panelstore Core
//!
//! Schema-driven persistence for a hosting panel over a key-value backend.
//!
//! This crate provides:
//! - Table schemas with indexed and strict columns
//! - A value codec mapping dynamic field values to stored strings
//! - Optional per-field AES-256-CBC encryption
//! - A connector maintaining secondary index sets on every save and delete
//! - Typed tables and entities on top of the connector
//!
//! Records live at `<table>:<id>` as field hashes; index sets live at
//! `idx:<table>:<field>:<value>` and hold entity ids.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod connector;
mod crypto;
mod entity;
mod error;
pub mod models;
mod schema;
mod table;

pub use codec::{Decoded, FieldValue};
pub use config::{RebuildMode, StoreConfig, DEFAULT_REDIS_URL, DEFAULT_SCAN_BATCH_SIZE};
pub use connector::{Connector, FieldMap, IndexEntry, IndexReport, RebuildReport};
pub use crypto::{Decrypted, EncryptionKey, FieldCipher, IV_SIZE, KEY_SIZE};
pub use entity::{Entity, EntityKind};
pub use error::{CoreError, CoreResult};
pub use schema::{Column, ColumnType, TableSchema, INDEX_PREFIX};
pub use table::{Store, Table};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Generates a random entity id.
#[must_use]
pub fn new_entity_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_unique() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
