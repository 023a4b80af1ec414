// src/cache/mod.rs

//! Key-value cache holding in-progress attempts.
//!
//! Every stored value carries a version token. Writers that read, modify and
//! write back an entry use [`AttemptCache::compare_and_set`] so that two
//! concurrent updates of the same key cannot silently overwrite each other.

pub mod memory;

use async_trait::async_trait;

use crate::error::AppError;

pub use memory::MemoryCache;

/// A cached value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[async_trait]
pub trait AttemptCache: Send + Sync {
    /// Returns the live (unexpired) entry for `key`.
    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>, AppError>;

    /// Stores `value` unconditionally, replacing any previous entry.
    async fn set(&self, key: &str, value: String) -> Result<(), AppError>;

    /// Stores `value` only if the entry still exists at `version`.
    /// Returns `false` when another writer got there first.
    async fn compare_and_set(&self, key: &str, version: u64, value: String)
    -> Result<bool, AppError>;

    async fn del(&self, key: &str) -> Result<(), AppError>;
}
