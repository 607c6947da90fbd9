//! # kv-session
//!
//! Lock-coordinated session persistence on top of a remote key-value store.
//!
//! Many concurrent requests may reference the same session. The
//! [`SessionCoordinator`] guarantees that at most one of them at a time can
//! mutate a session's data, using nothing but the store's versioned read,
//! insert and compare-and-swap. Contended calls never block: they return
//! the lock age and token so the caller can retry later or force a release.
//!
//! ## Features
//!
//! - **Token-gated writes**: every release, update and delete presents the
//!   lock token it was issued and is rejected if the record moved on
//! - **Store-native expiry**: each write carries the record's TTL; there is
//!   no background sweep
//! - **Namespaced**: several applications can share one store
//! - **Pluggable**: any [`KeyValueStore`] implementation, with an
//!   in-memory one included
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kv_session::{CoordinatorConfig, InMemoryStore, LockOutcome, SessionCoordinator, SessionId};
//!
//! #[tokio::main]
//! async fn main() -> kv_session::Result<()> {
//!     kv_session::logging::try_init().ok();
//!
//!     let store = Arc::new(InMemoryStore::new());
//!     let sessions = SessionCoordinator::new(store, CoordinatorConfig::new("shop"));
//!     let id = SessionId::new("s1")?;
//!
//!     sessions.create_uninitialized(&id, 20).await?;
//!     if let LockOutcome::Acquired { data, lock_token, .. } = sessions.get_item_exclusive(&id).await? {
//!         let data = data.with_items(b"cart=3".to_vec());
//!         sessions.set_and_release(&id, lock_token, data, false).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod kv;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, SessionStoreError};
pub use kv::{InMemoryStore, KeyValueStore, StoreError};
pub use session::{
    CoordinatorConfig, InitState, LockOutcome, SessionCoordinator, SessionData, SessionEventSink,
    SessionId, SessionPayload, SessionRecord, WriteOutcome,
};
