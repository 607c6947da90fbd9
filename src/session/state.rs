//! Initialization state of a stored session.

use serde::{Deserialize, Serialize};

/// Whether a stored record is a cookie-less placeholder awaiting its first
/// real body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    /// Created by `create_uninitialized`; the next exclusive read must
    /// hand out a fresh empty body instead of the stored placeholder.
    NeedsInit,
    /// Placeholder already materialized by an exclusive read.
    Initialized,
    /// Ordinary record with no cookie-less history.
    #[default]
    None,
}

impl InitState {
    /// Check if the stored body is a placeholder.
    pub fn needs_init(&self) -> bool {
        matches!(self, InitState::NeedsInit)
    }

    /// State to persist once a caller has taken the lock.
    ///
    /// Only `NeedsInit -> Initialized` changes; every other state is kept.
    pub fn after_acquire(self) -> Self {
        match self {
            InitState::NeedsInit => InitState::Initialized,
            other => other,
        }
    }
}
