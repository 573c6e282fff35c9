//! Storage abstraction for the latchkey auth engine.
//!
//! This crate provides the uniform key-value contract the engine persists
//! session state through, plus the concrete adapters for different hosting
//! contexts:
//! - **In-memory**: ephemeral, for tests and persistence-free hosts
//! - **File**: JSON document on disk for long-lived daemon/CLI hosts
//! - **Cookie**: renders values into cookie strings via a pluggable jar
//! - **No-op**: for configurations with persistence explicitly disabled
//!
//! Adapters are drop-in substitutable; the engine never branches on which
//! one is active.

mod attributes;
mod cookie;
mod file;
mod keys;
mod memory;
mod noop;
mod traits;

pub use attributes::{SameSite, StorageAttributes};
pub use cookie::{CookieJar, CookieStore, MemoryJar};
pub use file::FileStore;
pub use keys::{StorageKeys, REMEMBER_TTL_DAYS};
pub use memory::MemoryStore;
pub use noop::NoopStore;
pub use traits::TokenStore;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backing-medium failure (jar rejected the write, document corrupt, etc.)
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
