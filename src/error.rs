//! Error types for kv-session.

use thiserror::Error;

use crate::config::ConfigError;
use crate::kv::StoreError;

/// Main error type for kv-session operations.
///
/// Lock contention, missing records and token mismatches are not errors;
/// they come back as typed outcomes from the coordinator.
#[derive(Error, Debug)]
pub enum SessionStoreError {
    /// Session id was empty or otherwise unusable as a store key.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Idle timeout shorter than one minute; the record would expire as
    /// soon as it is written.
    #[error("invalid session timeout: {0} minutes")]
    InvalidTimeout(u32),

    /// The backing store failed and the coordinator is configured to
    /// propagate faults.
    #[error("could not retrieve, remove or write key '{key}': {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionStoreError {
    /// Wrap a store failure for the given key.
    pub fn store(key: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            key: key.into(),
            source,
        }
    }
}

/// Convenience Result type for kv-session operations.
pub type Result<T> = std::result::Result<T, SessionStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_session_id_display() {
        let err = SessionStoreError::InvalidSessionId(String::new());
        assert!(err.to_string().contains("invalid session id"));
    }

    #[test]
    fn test_invalid_timeout_display() {
        let err = SessionStoreError::InvalidTimeout(0);
        assert_eq!(err.to_string(), "invalid session timeout: 0 minutes");
    }

    #[test]
    fn test_store_error_display() {
        let err = SessionStoreError::store("s1", StoreError::Unavailable("connection reset".into()));
        let msg = err.to_string();
        assert!(msg.contains("'s1'"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_store_error_source() {
        use std::error::Error as _;

        let err = SessionStoreError::store("s1", StoreError::Internal("boom".into()));
        let source = err.source().expect("store error carries a source");
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: SessionStoreError = ConfigError::InvalidValue("timeout_minutes", "0".into()).into();
        assert!(matches!(err, SessionStoreError::Config(_)));
        assert!(err.to_string().contains("timeout_minutes"));
    }
}
