//! Cooperative cancellation for long-running parallel loops.
//!
//! Row-parallel loops poll the token once per row; a cancelled run stops at
//! the next row boundary and reports `PreprocessingError::Cancelled` instead of
//! returning partial output.

use super::types::PreprocessingError;

/// Token checked between rows of every parallel region.
///
/// Wraps `tokio_util`'s token so a signal handler running on an async
/// runtime can cancel synchronous rayon work. Clones share state, so a clone
/// handed to another thread can cancel a run started with the original.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), PreprocessingError> {
        if self.is_cancelled() {
            Err(PreprocessingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(PreprocessingError::Cancelled));
    }
}
