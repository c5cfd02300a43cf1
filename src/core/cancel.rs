//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag signalling that a run should stop.
///
/// Cloning yields a handle to the same flag. The pipeline checks it before
/// dispatching each page and between stages; work already in flight on a page
/// finishes its current stage.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(LayoutError::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), crate::core::LayoutError> {
        if self.is_cancelled() {
            Err(crate::core::LayoutError::Cancelled)
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
        let handle = token.clone();
        assert!(token.check().is_ok());
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            token.check(),
            Err(crate::core::LayoutError::Cancelled)
        ));
    }
}
