//! Structured events emitted by the coordinator.

use std::fmt;
use std::sync::Mutex;

use crate::kv::StoreError;

/// Coordinator operation an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetItem,
    GetItemExclusive,
    Release,
    SetAndRelease,
    ResetTimeout,
    RemoveItem,
    CreateUninitialized,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetItem => "get_item",
            Operation::GetItemExclusive => "get_item_exclusive",
            Operation::Release => "release",
            Operation::SetAndRelease => "set_and_release",
            Operation::ResetTimeout => "reset_timeout",
            Operation::RemoveItem => "remove_item",
            Operation::CreateUninitialized => "create_uninitialized",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something worth recording about a coordinator call.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An operation was entered.
    Started {
        operation: Operation,
        session_id: String,
    },
    /// An operation returned a business outcome.
    Finished {
        operation: Operation,
        session_id: String,
        outcome: &'static str,
    },
    /// The store failed underneath an operation.
    StoreFault {
        operation: Operation,
        session_id: String,
        error: StoreError,
        propagated: bool,
    },
}

/// Receiver for coordinator events.
pub trait SessionEventSink: Send + Sync {
    fn record(&self, event: &SessionEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl SessionEventSink for TracingEventSink {
    fn record(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Started {
                operation,
                session_id,
            } => {
                tracing::trace!(%operation, %session_id, "session operation started");
            }
            SessionEvent::Finished {
                operation,
                session_id,
                outcome,
            } => {
                tracing::trace!(%operation, %session_id, outcome, "session operation finished");
            }
            SessionEvent::StoreFault {
                operation,
                session_id,
                error,
                propagated,
            } => {
                tracing::error!(
                    %operation,
                    %session_id,
                    propagated,
                    "could not retrieve, remove or write key '{}': {}",
                    session_id,
                    error
                );
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl SessionEventSink for NullEventSink {
    fn record(&self, _event: &SessionEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Outcomes of finished operations, in order.
    pub fn outcomes(&self) -> Vec<(Operation, &'static str)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Finished {
                    operation, outcome, ..
                } => Some((operation, outcome)),
                _ => None,
            })
            .collect()
    }

    /// Number of store faults seen.
    pub fn fault_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::StoreFault { .. }))
            .count()
    }
}

impl SessionEventSink for RecordingEventSink {
    fn record(&self, event: &SessionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
