//! Error taxonomy for the sync core.
//!
//! DESIGN
//! ======
//! Writer flows (create/update/delete) never let these unwind UI state: the
//! rollback and the user notice have already happened by the time a
//! `SyncError` is returned, so callers are free to ignore the `Result`.
//! `InvalidViewport` and `MalformedSnapshot` are produced internally and
//! logged; they only surface through helper APIs that validate input.

use crate::shape::{ShapeError, ShapeId};

/// Grepable error code attached to every error enum in the crate.
pub trait ErrorCode {
    /// Stable machine-readable code (e.g. `"E_VERSION_CONFLICT"`).
    fn error_code(&self) -> &'static str;
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Failure reported by the remote store collaborator. Distinct from a version
/// conflict: the write never reached a commit decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store timed out after {0} ms")]
    Timeout(u64),
    #[error("remote store rejected request: {0}")]
    Rejected(String),
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "E_TRANSPORT_UNAVAILABLE",
            Self::Timeout(_) => "E_TRANSPORT_TIMEOUT",
            Self::Rejected(_) => "E_TRANSPORT_REJECTED",
        }
    }
}

// =============================================================================
// SYNC
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The store's version moved past the base this write was computed from.
    #[error("version conflict on {id}: local base {local}, server {server}")]
    VersionConflict {
        id: ShapeId,
        local: u64,
        server: u64,
        /// Display name (or id) of whoever committed the winning version.
        holder: Option<String>,
    },
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),
    #[error("shape not found: {0}")]
    NotFound(ShapeId),
    #[error("invalid shape: {0}")]
    InvalidShape(#[from] ShapeError),
    #[error("invalid viewport: {0}")]
    InvalidViewport(String),
    #[error("malformed snapshot entity: {0}")]
    MalformedSnapshot(String),
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::VersionConflict { .. } => "E_VERSION_CONFLICT",
            Self::TransportFailure(_) => "E_TRANSPORT_FAILURE",
            Self::NotFound(_) => "E_SHAPE_NOT_FOUND",
            Self::InvalidShape(_) => "E_INVALID_SHAPE",
            Self::InvalidViewport(_) => "E_INVALID_VIEWPORT",
            Self::MalformedSnapshot(_) => "E_MALFORMED_SNAPSHOT",
        }
    }
}

impl SyncError {
    /// Conflicts and transport failures are expected under concurrent use and
    /// can be resolved by re-issuing the action.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::TransportFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn conflict_code_and_message() {
        let id = Uuid::new_v4();
        let err = SyncError::VersionConflict { id, local: 5, server: 7, holder: Some("Alice".into()) };
        assert_eq!(err.error_code(), "E_VERSION_CONFLICT");
        assert!(err.to_string().contains("local base 5, server 7"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn transport_error_converts_into_sync_error() {
        let err: SyncError = TransportError::Timeout(250).into();
        assert_eq!(err.error_code(), "E_TRANSPORT_FAILURE");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("250 ms"));
    }

    #[test]
    fn viewport_and_snapshot_errors_are_not_recoverable() {
        assert!(!SyncError::InvalidViewport("nan scale".into()).is_recoverable());
        assert!(!SyncError::MalformedSnapshot("missing id".into()).is_recoverable());
        assert!(!SyncError::NotFound(Uuid::new_v4()).is_recoverable());
    }

    #[test]
    fn transport_codes_are_distinct() {
        let codes = [
            TransportError::Unavailable("down".into()).error_code(),
            TransportError::Timeout(1).error_code(),
            TransportError::Rejected("no".into()).error_code(),
        ];
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[1], codes[2]);
        assert_ne!(codes[0], codes[2]);
    }
}
