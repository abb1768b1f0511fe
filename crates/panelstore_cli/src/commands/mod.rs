//! CLI command implementations.

pub mod inspect;
pub mod rebuild;
pub mod verify;
