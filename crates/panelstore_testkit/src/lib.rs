//! # panelstore Testkit
//!
//! Test utilities for panelstore.
//!
//! This crate provides:
//! - Store fixtures over the in-memory backend
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use panelstore_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_store() {
//!     let store = TestStore::memory();
//!     let profiles = store.table::<Profile>();
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use panelstore_core::models::*;
}

pub use fixtures::*;
pub use generators::*;
