//! Persisted session record and the caller-facing session body.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{InitState, SessionId};
use crate::kv::StoreError;

/// Opaque serialized session item bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionPayload(Vec<u8>);

impl SessionPayload {
    /// An empty item bag.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SessionPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Session body as seen by the caller: the items plus the idle timeout
/// they should be stored with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    /// Serialized session items.
    pub items: SessionPayload,
    /// Idle-expiry window in minutes.
    pub timeout_minutes: u32,
}

impl SessionData {
    /// Create an empty body with the given timeout.
    pub fn new(timeout_minutes: u32) -> Self {
        Self {
            items: SessionPayload::empty(),
            timeout_minutes,
        }
    }

    /// Replace the items.
    pub fn with_items(mut self, items: impl Into<SessionPayload>) -> Self {
        self.items = items.into();
        self
    }
}

/// One session as it is persisted in the key-value store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub application_name: String,
    pub payload: SessionPayload,
    /// True while a request holds exclusive access.
    pub locked: bool,
    /// Incremented on every unlocked -> locked transition.
    pub lock_token: u64,
    /// Set whenever `locked` is true.
    pub lock_acquired_at: Option<DateTime<Utc>>,
    pub timeout_minutes: u32,
    /// Absolute expiry, written as the store entry's TTL.
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub init_state: InitState,
}

impl SessionRecord {
    /// Build an unlocked record holding `data`.
    pub fn new(
        session_id: SessionId,
        application_name: impl Into<String>,
        data: SessionData,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            session_id,
            application_name: application_name.into(),
            payload: data.items,
            locked: false,
            lock_token: 0,
            lock_acquired_at: None,
            timeout_minutes: data.timeout_minutes,
            expires_at: now,
            init_state: InitState::None,
        };
        record.refresh_expiry(now);
        record
    }

    /// Build a cookie-less placeholder awaiting initialization.
    pub fn uninitialized(
        session_id: SessionId,
        application_name: impl Into<String>,
        timeout_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::new(
            session_id,
            application_name,
            SessionData::new(timeout_minutes),
            now,
        );
        record.init_state = InitState::NeedsInit;
        record
    }

    /// Idle-expiry window.
    pub fn timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.timeout_minutes))
    }

    /// Absolute expiry for a write made at `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.timeout()
    }

    /// Recompute `expires_at` from `timeout` as of `now`.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) {
        self.expires_at = self.expiry_from(now);
    }

    /// Time the current lock has been held, zero when unlocked.
    pub fn lock_age(&self, now: DateTime<Utc>) -> Duration {
        match (self.locked, self.lock_acquired_at) {
            (true, Some(acquired)) => (now - acquired).max(Duration::zero()),
            _ => Duration::zero(),
        }
    }

    /// Take the lock: bump the token and stamp the acquisition time.
    pub fn lock(&mut self, now: DateTime<Utc>) {
        self.lock_token += 1;
        self.locked = true;
        self.lock_acquired_at = Some(now);
    }

    /// Clear the lock, keeping the token as the last issued value.
    pub fn unlock(&mut self) {
        self.locked = false;
        self.lock_acquired_at = None;
    }

    /// Caller-facing view of the body.
    pub fn data(&self) -> SessionData {
        SessionData {
            items: self.payload.clone(),
            timeout_minutes: self.timeout_minutes,
        }
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub(crate) fn decode(key: &str, bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    #[test]
    fn test_new_record_is_unlocked() {
        let now = Utc::now();
        let record = SessionRecord::new(sid("s1"), "app", SessionData::new(20), now);

        assert!(!record.locked);
        assert_eq!(record.lock_token, 0);
        assert!(record.lock_acquired_at.is_none());
        assert_eq!(record.expires_at, now + Duration::minutes(20));
        assert_eq!(record.init_state, InitState::None);
    }

    #[test]
    fn test_uninitialized_record() {
        let record = SessionRecord::uninitialized(sid("s1"), "app", 5, Utc::now());
        assert_eq!(record.init_state, InitState::NeedsInit);
        assert!(record.payload.is_empty());
        assert_eq!(record.timeout_minutes, 5);
    }

    #[test]
    fn test_lock_and_unlock() {
        let now = Utc::now();
        let mut record = SessionRecord::new(sid("s1"), "app", SessionData::new(20), now);

        record.lock(now);
        assert!(record.locked);
        assert_eq!(record.lock_token, 1);
        assert_eq!(record.lock_acquired_at, Some(now));

        record.unlock();
        assert!(!record.locked);
        assert!(record.lock_acquired_at.is_none());
        assert_eq!(record.lock_token, 1);

        record.lock(now);
        assert_eq!(record.lock_token, 2);
    }

    #[test]
    fn test_lock_age() {
        let now = Utc::now();
        let mut record = SessionRecord::new(sid("s1"), "app", SessionData::new(20), now);
        assert_eq!(record.lock_age(now), Duration::zero());

        record.lock(now);
        assert_eq!(record.lock_age(now + Duration::seconds(3)), Duration::seconds(3));
        // Clock skew between processes never yields a negative age.
        assert_eq!(record.lock_age(now - Duration::seconds(3)), Duration::zero());
    }

    #[test]
    fn test_encode_decode() {
        let now = Utc::now();
        let mut record = SessionRecord::new(
            sid("s1"),
            "app",
            SessionData::new(20).with_items(b"payload".to_vec()),
            now,
        );
        record.lock(now);

        let bytes = record.encode().unwrap();
        let back = SessionRecord::decode("s1", &bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_decode_garbage() {
        let err = SessionRecord::decode("s1", b"not json").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "s1"));
    }
}
