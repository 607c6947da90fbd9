//! Session persistence and lock coordination.
//!
//! This module provides the persisted session record, the typed outcomes
//! callers act on, and the coordinator that serializes access to a session
//! across every process sharing the store.

mod coordinator;
pub mod events;
mod id;
mod outcome;
mod record;
mod state;

pub use coordinator::{
    CoordinatorConfig, SessionCoordinator, DEFAULT_APPLICATION_NAME, DEFAULT_TIMEOUT_MINUTES,
};
pub use events::{
    NullEventSink, Operation, RecordingEventSink, SessionEvent, SessionEventSink,
    TracingEventSink,
};
pub use id::SessionId;
pub use outcome::{LockOutcome, WriteOutcome};
pub use record::{SessionData, SessionPayload, SessionRecord};
pub use state::InitState;
