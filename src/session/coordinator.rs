//! Lock coordination over a shared key-value store.
//!
//! Every mutating call is read -> decide -> conditional write. The store's
//! compare-and-swap is the only synchronization primitive, so the protocol
//! holds across processes sharing one store. Nothing here blocks or
//! retries: contention comes back to the caller as `Locked`,
//! `TokenMismatch` or `Conflict` and the caller picks the next step.

use std::future::Future;
use std::sync::Arc;

use super::events::{Operation, SessionEvent, SessionEventSink, TracingEventSink};
use super::{LockOutcome, SessionData, SessionId, SessionRecord, WriteOutcome};
use crate::clock::{Clock, SystemClock};
use crate::error::SessionStoreError;
use crate::kv::{CasStatus, InsertStatus, KeyValueStore, RemoveStatus, StoreError, Version};
use crate::Result;

/// Default idle timeout, in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: u32 = 20;

/// Default application name.
pub const DEFAULT_APPLICATION_NAME: &str = "/";

/// Shortest idle timeout a record may be written with.
const MIN_TIMEOUT_MINUTES: u32 = 1;

/// Settings for one coordinator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Namespace tag stamped on every record; records of other
    /// applications are invisible to this coordinator.
    pub application_name: String,
    /// Idle timeout for bodies created by this coordinator, in minutes.
    pub timeout_minutes: u32,
    /// Raise store failures as errors instead of logging them and
    /// returning a best-effort outcome.
    pub propagate_faults: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            propagate_faults: false,
        }
    }
}

impl CoordinatorConfig {
    /// Config for the given application with default timeout.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Default::default()
        }
    }

    /// Set the idle timeout.
    pub fn with_timeout_minutes(mut self, minutes: u32) -> Self {
        self.timeout_minutes = minutes;
        self
    }

    /// Raise store failures to the caller.
    pub fn propagating_faults(mut self) -> Self {
        self.propagate_faults = true;
        self
    }
}

trait OutcomeName {
    fn name(&self) -> &'static str;
}

impl OutcomeName for LockOutcome {
    fn name(&self) -> &'static str {
        self.as_str()
    }
}

impl OutcomeName for WriteOutcome {
    fn name(&self) -> &'static str {
        self.as_str()
    }
}

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Serializes access to session records stored in a [`KeyValueStore`].
///
/// The coordinator holds no session state of its own and can be shared
/// freely; any number of instances, in any number of processes, may point
/// at the same store.
pub struct SessionCoordinator<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn SessionEventSink>,
}

impl<S: KeyValueStore + ?Sized> Clone for SessionCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            events: Arc::clone(&self.events),
        }
    }
}

impl<S: KeyValueStore + ?Sized> SessionCoordinator<S> {
    /// Create a coordinator using the system clock and `tracing` events.
    pub fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingEventSink),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the event sink.
    pub fn with_event_sink(mut self, events: Arc<dyn SessionEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Build an empty session body for a brand-new session.
    pub fn create_new(&self, timeout_minutes: u32) -> SessionData {
        SessionData::new(timeout_minutes)
    }

    /// Read a session without taking its lock.
    ///
    /// Never writes. An unlocked record comes back as `Acquired` carrying
    /// its current token; a locked one as `Locked`.
    pub async fn get_item(&self, id: &SessionId) -> Result<LockOutcome> {
        self.run(
            Operation::GetItem,
            id,
            LockOutcome::NotFound,
            self.acquire(id, false),
        )
        .await
    }

    /// Read a session and take its lock.
    ///
    /// Returns immediately: `NotFound` when there is no record, `Locked`
    /// with the holder's lock age and token when someone else holds it,
    /// `Acquired` with a fresh token otherwise. A lost race on the write
    /// is reported as `Locked` from a fresh read.
    pub async fn get_item_exclusive(&self, id: &SessionId) -> Result<LockOutcome> {
        self.run(
            Operation::GetItemExclusive,
            id,
            LockOutcome::NotFound,
            self.acquire(id, true),
        )
        .await
    }

    /// Clear the lock held under `lock_token`.
    ///
    /// Also the forced-recovery path: a caller that saw an excessive lock
    /// age may release with the token reported in `Locked`. Releasing a
    /// record that is already unlocked under the same token is `Ok` and
    /// writes nothing.
    pub async fn release(&self, id: &SessionId, lock_token: u64) -> Result<WriteOutcome> {
        self.run(
            Operation::Release,
            id,
            WriteOutcome::StoreError,
            self.release_inner(id, lock_token),
        )
        .await
    }

    /// Store `data` and clear the lock.
    ///
    /// For a new session the record is inserted and an existing record is
    /// reported as `Conflict`. Otherwise the write only happens while the
    /// record is locked under `lock_token`.
    ///
    /// Fails with `InvalidTimeout` when `data` carries a timeout under one
    /// minute.
    pub async fn set_and_release(
        &self,
        id: &SessionId,
        lock_token: u64,
        data: SessionData,
        is_new_session: bool,
    ) -> Result<WriteOutcome> {
        check_timeout(data.timeout_minutes)?;
        self.run(
            Operation::SetAndRelease,
            id,
            WriteOutcome::StoreError,
            self.set_and_release_inner(id, lock_token, data, is_new_session),
        )
        .await
    }

    /// Slide the expiry window forward without touching the lock.
    pub async fn reset_timeout(&self, id: &SessionId) -> Result<WriteOutcome> {
        self.run(
            Operation::ResetTimeout,
            id,
            WriteOutcome::StoreError,
            self.reset_timeout_inner(id),
        )
        .await
    }

    /// Delete the session if it is locked under `lock_token`.
    pub async fn remove_item(&self, id: &SessionId, lock_token: u64) -> Result<WriteOutcome> {
        self.run(
            Operation::RemoveItem,
            id,
            WriteOutcome::StoreError,
            self.remove_inner(id, lock_token),
        )
        .await
    }

    /// Insert a cookie-less placeholder for `id`.
    ///
    /// `Conflict` means the session already exists and can be ignored.
    /// Fails with `InvalidTimeout` for a timeout under one minute.
    pub async fn create_uninitialized(
        &self,
        id: &SessionId,
        timeout_minutes: u32,
    ) -> Result<WriteOutcome> {
        check_timeout(timeout_minutes)?;
        self.run(
            Operation::CreateUninitialized,
            id,
            WriteOutcome::StoreError,
            self.create_uninitialized_inner(id, timeout_minutes),
        )
        .await
    }

    async fn run<T, F>(
        &self,
        operation: Operation,
        id: &SessionId,
        fallback: T,
        fut: F,
    ) -> Result<T>
    where
        T: OutcomeName,
        F: Future<Output = StoreResult<T>>,
    {
        let session_id = id.to_string();
        self.events.record(&SessionEvent::Started {
            operation,
            session_id: session_id.clone(),
        });

        let outcome = match fut.await {
            Ok(outcome) => outcome,
            Err(error) => {
                let propagated = self.config.propagate_faults;
                self.events.record(&SessionEvent::StoreFault {
                    operation,
                    session_id: session_id.clone(),
                    error: error.clone(),
                    propagated,
                });
                if propagated {
                    return Err(SessionStoreError::store(session_id, error));
                }
                fallback
            }
        };

        self.events.record(&SessionEvent::Finished {
            operation,
            session_id,
            outcome: outcome.name(),
        });
        Ok(outcome)
    }

    /// Read the record for `id`, hiding records of other applications.
    async fn load(&self, id: &SessionId) -> StoreResult<Option<(SessionRecord, Version)>> {
        let Some(found) = self.store.get(id.as_str()).await? else {
            return Ok(None);
        };
        let record = SessionRecord::decode(id.as_str(), &found.value)?;
        if record.application_name != self.config.application_name {
            return Ok(None);
        }
        Ok(Some((record, found.version)))
    }

    async fn swap(&self, record: &SessionRecord, expected: Version) -> StoreResult<CasStatus> {
        let value = encode(record)?;
        self.store
            .compare_and_swap(record.session_id.as_str(), value, expected, record.expires_at)
            .await
    }

    async fn acquire(&self, id: &SessionId, want_lock: bool) -> StoreResult<LockOutcome> {
        let now = self.clock.now();
        let Some((mut record, version)) = self.load(id).await? else {
            return Ok(LockOutcome::NotFound);
        };

        if record.locked {
            return Ok(LockOutcome::Locked {
                lock_age: record.lock_age(now),
                lock_token: record.lock_token,
            });
        }

        let actions = record.init_state;
        let data = if actions.needs_init() {
            self.create_new(self.config.timeout_minutes.max(MIN_TIMEOUT_MINUTES))
        } else {
            record.data()
        };

        if !want_lock {
            return Ok(LockOutcome::Acquired {
                data,
                lock_token: record.lock_token,
                actions,
            });
        }

        record.payload = data.items.clone();
        record.timeout_minutes = data.timeout_minutes;
        record.init_state = actions.after_acquire();
        record.lock(now);
        record.refresh_expiry(now);

        match self.swap(&record, version).await? {
            CasStatus::Swapped => Ok(LockOutcome::Acquired {
                data,
                lock_token: record.lock_token,
                actions,
            }),
            CasStatus::NotFound => Ok(LockOutcome::NotFound),
            CasStatus::VersionMismatch => {
                let now = self.clock.now();
                Ok(match self.load(id).await? {
                    None => LockOutcome::NotFound,
                    Some((current, _)) => LockOutcome::Locked {
                        lock_age: current.lock_age(now),
                        lock_token: current.lock_token,
                    },
                })
            }
        }
    }

    async fn release_inner(&self, id: &SessionId, lock_token: u64) -> StoreResult<WriteOutcome> {
        let Some((mut record, version)) = self.load(id).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        if record.lock_token != lock_token {
            return Ok(WriteOutcome::TokenMismatch);
        }
        if !record.locked {
            return Ok(WriteOutcome::Ok);
        }

        record.unlock();
        record.refresh_expiry(self.clock.now());
        Ok(match self.swap(&record, version).await? {
            CasStatus::Swapped => WriteOutcome::Ok,
            CasStatus::VersionMismatch => WriteOutcome::TokenMismatch,
            CasStatus::NotFound => WriteOutcome::NotFound,
        })
    }

    async fn set_and_release_inner(
        &self,
        id: &SessionId,
        lock_token: u64,
        data: SessionData,
        is_new_session: bool,
    ) -> StoreResult<WriteOutcome> {
        let now = self.clock.now();
        if is_new_session {
            let record =
                SessionRecord::new(id.clone(), self.config.application_name.clone(), data, now);
            let value = encode(&record)?;
            return Ok(
                match self.store.insert(id.as_str(), value, record.expires_at).await? {
                    InsertStatus::Inserted => WriteOutcome::Ok,
                    InsertStatus::AlreadyExists => WriteOutcome::Conflict,
                },
            );
        }

        let Some((mut record, version)) = self.load(id).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        if !record.locked || record.lock_token != lock_token {
            return Ok(WriteOutcome::TokenMismatch);
        }

        record.payload = data.items;
        record.timeout_minutes = data.timeout_minutes;
        record.init_state = record.init_state.after_acquire();
        record.unlock();
        record.refresh_expiry(now);
        Ok(match self.swap(&record, version).await? {
            CasStatus::Swapped => WriteOutcome::Ok,
            CasStatus::VersionMismatch => WriteOutcome::TokenMismatch,
            CasStatus::NotFound => WriteOutcome::NotFound,
        })
    }

    async fn reset_timeout_inner(&self, id: &SessionId) -> StoreResult<WriteOutcome> {
        let Some((mut record, version)) = self.load(id).await? else {
            return Ok(WriteOutcome::NotFound);
        };

        record.refresh_expiry(self.clock.now());
        Ok(match self.swap(&record, version).await? {
            // A concurrent write already stamped a fresh expiry.
            CasStatus::Swapped | CasStatus::VersionMismatch => WriteOutcome::Ok,
            CasStatus::NotFound => WriteOutcome::NotFound,
        })
    }

    async fn remove_inner(&self, id: &SessionId, lock_token: u64) -> StoreResult<WriteOutcome> {
        let Some((record, _)) = self.load(id).await? else {
            return Ok(WriteOutcome::NotFound);
        };
        if !record.locked || record.lock_token != lock_token {
            return Ok(WriteOutcome::TokenMismatch);
        }

        Ok(match self.store.remove(id.as_str()).await? {
            RemoveStatus::Removed => WriteOutcome::Ok,
            RemoveStatus::NotFound => WriteOutcome::NotFound,
        })
    }

    async fn create_uninitialized_inner(
        &self,
        id: &SessionId,
        timeout_minutes: u32,
    ) -> StoreResult<WriteOutcome> {
        let record = SessionRecord::uninitialized(
            id.clone(),
            self.config.application_name.clone(),
            timeout_minutes,
            self.clock.now(),
        );
        let value = encode(&record)?;
        Ok(
            match self.store.insert(id.as_str(), value, record.expires_at).await? {
                InsertStatus::Inserted => WriteOutcome::Ok,
                InsertStatus::AlreadyExists => WriteOutcome::Conflict,
            },
        )
    }
}

fn check_timeout(minutes: u32) -> Result<()> {
    if minutes < MIN_TIMEOUT_MINUTES {
        return Err(SessionStoreError::InvalidTimeout(minutes));
    }
    Ok(())
}

fn encode(record: &SessionRecord) -> StoreResult<Vec<u8>> {
    record
        .encode()
        .map_err(|e| StoreError::Internal(format!("failed to encode session record: {e}")))
}
