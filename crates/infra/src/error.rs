//! Error taxonomy shared by stores and orchestration services.

use serde::Serialize;
use thiserror::Error;

use creatives_core::DomainError;

/// Store operation error.
///
/// These are **infrastructure errors** (storage, isolation) as opposed to
/// domain errors (validation, illegal transitions).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("owner isolation violation")]
    OwnerIsolation,

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The stored record changed since it was read; the write was not applied.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub(crate) fn poisoned() -> Self {
        Self::Storage("lock poisoned".to_string())
    }
}

/// Error surfaced by orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed input (empty format set, unknown tag, empty outcome). Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying store failed. Creation has already been rolled back when
    /// this reaches the caller.
    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),

    /// Operation not allowed in the current status. No partial effect.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown request or job for this owner.
    #[error("not found: {0}")]
    NotFound(String),
}

impl OrchestratorError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<StoreError> for OrchestratorError {
    /// A lost write race means the record is no longer in the state the
    /// operation was decided on.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => Self::InvalidState(msg),
            other => Self::Persistence(other),
        }
    }
}

impl From<DomainError> for OrchestratorError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvalidTransition { .. } => Self::InvalidState(err.to_string()),
        }
    }
}

/// Non-fatal failure to signal the image worker.
///
/// Carried inside successful outcomes; the state change that triggered the
/// signal stands and the jobs wait for the next trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchWarning {
    pub message: String,
}

impl DispatchWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl core::fmt::Display for DispatchWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "dispatch warning: {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creatives_core::JobStatus;

    #[test]
    fn domain_errors_map_to_taxonomy() {
        let v: OrchestratorError = DomainError::validation("bad").into();
        assert!(matches!(v, OrchestratorError::Validation(m) if m == "bad"));

        let t: OrchestratorError = DomainError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Queued,
        }
        .into();
        assert!(matches!(t, OrchestratorError::InvalidState(m) if m.contains("completed -> queued")));
    }

    #[test]
    fn store_conflicts_are_state_errors() {
        let c: OrchestratorError = StoreError::Conflict("job moved on".into()).into();
        assert!(matches!(c, OrchestratorError::InvalidState(m) if m == "job moved on"));

        let s: OrchestratorError = StoreError::storage("disk full").into();
        assert!(matches!(s, OrchestratorError::Persistence(StoreError::Storage(_))));
    }
}
