//! Store error model.

use thiserror::Error;

/// Result type used by every store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// Hard store failure.
///
/// Recoverable outcomes (a stale concurrency stamp, a missing role) are not
/// errors; stores report those through `IdentityResult`. This enum covers
/// everything the caller cannot inspect and retry around.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The caller's cancellation token fired before the operation started.
    #[error("operation was cancelled")]
    Cancelled,

    /// The store was closed and can no longer be used.
    #[error("cannot access a closed store: {0}")]
    Disposed(&'static str),

    /// A required argument was blank or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is permanently unsupported by this store.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// The backing database failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Fail with `InvalidArgument` when `value` is empty or whitespace.
    pub fn require_non_blank(value: &str, name: &str) -> StoreResult<()> {
        if value.trim().is_empty() {
            return Err(Self::InvalidArgument(format!("{name} must not be blank")));
        }
        Ok(())
    }
}
