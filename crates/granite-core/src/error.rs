//! Error types and result aliases shared across Granite.
//!
//! Errors are structured for programmatic handling: callers match on
//! variants to distinguish expected outcomes (a released record that is
//! already gone) from transient failures (store unavailability, retried by
//! background tasks) and from fatal invariant violations.

use std::fmt;

/// The result type used throughout Granite.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Granite operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// For `release` this is expected and success-equivalent: the record
    /// was already released.
    #[error("not found: {resource} with id {id}")]
    NotFound {
        /// The type of resource that was looked up.
        resource: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A resource with the same identifier already exists.
    ///
    /// Indicates an identifier-generation bug; fatal to the single call,
    /// never to the process.
    #[error("already exists: {resource} with id {id}")]
    AlreadyExists {
        /// The type of resource that collided.
        resource: &'static str,
        /// The colliding identifier.
        id: String,
    },

    /// The underlying store is transiently unavailable.
    ///
    /// Background tasks absorb this and retry on their next tick; it is
    /// never surfaced to GC decision logic.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// An internal consistency check failed.
    ///
    /// Indicates corruption. The affected operation must abort rather
    /// than serve an inconsistent view.
    #[error("corrupt state: {message}")]
    CorruptState {
        /// Description of the violated invariant.
        message: String,
    },

    /// A compare-and-swap precondition failed due to a concurrent
    /// modification. Callers re-read and retry.
    #[error("CAS failed: {message}")]
    CasFailed {
        /// Description of the CAS failure.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Creates a new already-exists error.
    #[must_use]
    pub fn already_exists(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            resource,
            id: id.to_string(),
        }
    }

    /// Creates a new transient-unavailability error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new CAS-failed error.
    #[must_use]
    pub fn cas_failed(message: impl Into<String>) -> Self {
        Self::CasFailed {
            message: message.into(),
        }
    }

    /// Creates a new corrupt-state error.
    #[must_use]
    pub fn corrupt_state(message: impl Into<String>) -> Self {
        Self::CorruptState {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::unavailable("kv down").is_transient());
        assert!(!Error::not_found("record", "abc").is_transient());
        assert!(!Error::corrupt_state("count mismatch").is_transient());
    }

    #[test]
    fn display_includes_identifier() {
        let err = Error::not_found("record", "1234");
        assert_eq!(err.to_string(), "not found: record with id 1234");
    }
}
