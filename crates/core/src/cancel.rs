//! Cancellation guard checked at the entry of every store operation.

use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};

/// Fail with `StoreError::Cancelled` if `token` has already fired.
///
/// Must run before any I/O so that a cancelled call never performs a
/// partial write.
pub fn ensure_not_cancelled(token: &CancellationToken) -> StoreResult<()> {
    if token.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_after_cancel() {
        let token = CancellationToken::new();
        assert!(ensure_not_cancelled(&token).is_ok());

        token.cancel();
        assert_eq!(ensure_not_cancelled(&token), Err(StoreError::Cancelled));
    }

    #[test]
    fn child_tokens_follow_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert_eq!(ensure_not_cancelled(&child), Err(StoreError::Cancelled));
    }
}
