//! Key-value store contract.
//!
//! The coordinator is written against this capability set only: a
//! versioned read, an insert that refuses to overwrite, a compare-and-swap
//! keyed on the version returned by the read, and a delete. Every write
//! carries the absolute expiry the store should enforce as its TTL.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::InMemoryStore;

/// Store-assigned optimistic-concurrency version.
pub type Version = u64;

/// A value read from the store together with its current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// Raw stored bytes.
    pub value: Vec<u8>,
    /// Version to present on a subsequent compare-and-swap.
    pub version: Version,
}

/// Outcome of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStatus {
    /// The entry was created.
    Inserted,
    /// A live entry already exists under the key.
    AlreadyExists,
}

/// Outcome of a compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasStatus {
    /// The entry was replaced.
    Swapped,
    /// The entry exists but its version differs from the expected one.
    VersionMismatch,
    /// No live entry exists under the key.
    NotFound,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStatus {
    /// The entry was deleted.
    Removed,
    /// No live entry exists under the key.
    NotFound,
}

/// Transport or store-internal failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store reported an internal failure.
    #[error("store internal error: {0}")]
    Internal(String),

    /// A stored value could not be decoded.
    #[error("corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Remote key-value store consumed by the session coordinator.
///
/// Entries past their expiry must read as absent; the store is the only
/// component that purges them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the live entry under `key`.
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError>;

    /// Create an entry, refusing to overwrite a live one.
    async fn insert(
        &self,
        key: &str,
        value: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> Result<InsertStatus, StoreError>;

    /// Replace an entry only if its version still equals `expected`.
    async fn compare_and_swap(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Version,
        expires_at: DateTime<Utc>,
    ) -> Result<CasStatus, StoreError>;

    /// Delete the entry under `key`.
    async fn remove(&self, key: &str) -> Result<RemoveStatus, StoreError>;
}
