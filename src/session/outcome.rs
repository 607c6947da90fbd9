//! Typed results of coordinator operations.

use chrono::Duration;

use super::{InitState, SessionData};

/// Result of reading a session, with or without taking its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// No record for this application; the caller should start a new
    /// session.
    NotFound,
    /// Another request holds the lock. Nothing was written.
    Locked {
        /// How long the current holder has had the lock.
        lock_age: Duration,
        /// Token the holder was issued, usable to force a release.
        lock_token: u64,
    },
    /// The body is available to the caller. For an exclusive read the
    /// caller now holds the lock under `lock_token`; for a plain read
    /// `lock_token` is the record's current token and nothing was written.
    Acquired {
        data: SessionData,
        lock_token: u64,
        /// Initialization state of the stored record before this call.
        actions: InitState,
    },
}

impl LockOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockOutcome::NotFound => "not_found",
            LockOutcome::Locked { .. } => "locked",
            LockOutcome::Acquired { .. } => "acquired",
        }
    }

    /// Token of the lock now held by the caller, if any.
    pub fn lock_token(&self) -> Option<u64> {
        match self {
            LockOutcome::Acquired { lock_token, .. } => Some(*lock_token),
            _ => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, LockOutcome::Locked { .. })
    }
}

/// Result of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied.
    Ok,
    /// No record exists (expired, removed or never created).
    NotFound,
    /// The presented lock token is not the record's current token, or the
    /// record changed between read and write. Nothing was written.
    TokenMismatch,
    /// The record already exists and was not overwritten.
    Conflict,
    /// The store failed and the coordinator swallowed the fault.
    StoreError,
}

impl WriteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOutcome::Ok => "ok",
            WriteOutcome::NotFound => "not_found",
            WriteOutcome::TokenMismatch => "token_mismatch",
            WriteOutcome::Conflict => "conflict",
            WriteOutcome::StoreError => "store_error",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Ok)
    }
}
