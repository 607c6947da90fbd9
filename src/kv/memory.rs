//! In-process key-value store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    CasStatus, InsertStatus, KeyValueStore, RemoveStatus, StoreError, Version, Versioned,
};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    version: Version,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe in-memory [`KeyValueStore`] with per-entry versions and TTL.
///
/// Expired entries read as absent. They are dropped when their key is
/// touched again, and every insert sweeps the whole map. Useful for tests and single-process deployments; clones are
/// cheap and share the same data.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    next_version: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    pending_fault: Arc<Mutex<Option<StoreError>>>,
}

impl InMemoryStore {
    /// Create an empty store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_version: Arc::new(AtomicU64::new(1)),
            clock,
            pending_fault: Arc::new(Mutex::new(None)),
        }
    }

    /// Make the next store call fail with `error`.
    pub fn fail_next(&self, error: StoreError) {
        if let Ok(mut pending) = self.pending_fault.lock() {
            *pending = Some(error);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .map(|e| e.values().filter(|entry| entry.is_live(now)).count())
            .unwrap_or(0)
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current version of the live entry under `key`, if any.
    pub fn version_of(&self, key: &str) -> Option<Version> {
        let now = self.clock.now();
        self.entries
            .read()
            .ok()?
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.version)
    }

    fn take_fault(&self) -> Result<(), StoreError> {
        let mut pending = self
            .pending_fault
            .lock()
            .map_err(|_| StoreError::Internal("fault slot poisoned".into()))?;
        match pending.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bump_version(&self) -> Version {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn write_entries(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Internal("entry map poisoned".into()))
    }

    /// Drop `key` if its entry has expired; returns the live entry otherwise.
    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("live_entries", &self.len())
            .finish()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        self.take_fault()?;
        let now = self.clock.now();
        let mut entries = self.write_entries()?;
        Ok(Self::live_entry(&mut entries, key, now).map(|entry| Versioned {
            value: entry.value.clone(),
            version: entry.version,
        }))
    }

    async fn insert(
        &self,
        key: &str,
        value: Vec<u8>,
        expires_at: DateTime<Utc>,
    ) -> Result<InsertStatus, StoreError> {
        self.take_fault()?;
        let now = self.clock.now();
        let mut entries = self.write_entries()?;
        entries.retain(|_, entry| entry.is_live(now));
        if entries.contains_key(key) {
            return Ok(InsertStatus::AlreadyExists);
        }

        let version = self.bump_version();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                version,
                expires_at,
            },
        );
        Ok(InsertStatus::Inserted)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Version,
        expires_at: DateTime<Utc>,
    ) -> Result<CasStatus, StoreError> {
        self.take_fault()?;
        let now = self.clock.now();
        let mut entries = self.write_entries()?;
        let Some(entry) = Self::live_entry(&mut entries, key, now) else {
            return Ok(CasStatus::NotFound);
        };
        if entry.version != expected {
            return Ok(CasStatus::VersionMismatch);
        }

        entry.value = value;
        entry.version = self.bump_version();
        entry.expires_at = expires_at;
        Ok(CasStatus::Swapped)
    }

    async fn remove(&self, key: &str) -> Result<RemoveStatus, StoreError> {
        self.take_fault()?;
        let now = self.clock.now();
        let mut entries = self.write_entries()?;
        if Self::live_entry(&mut entries, key, now).is_none() {
            return Ok(RemoveStatus::NotFound);
        }
        entries.remove(key);
        Ok(RemoveStatus::Removed)
    }
}
