//! Media scanner: attribute normalization, file walker, extension
//! classification, scan orchestration, and deletion.

pub mod attributes;
pub mod classify;
pub mod deletion;
pub mod engine;
pub mod walker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation token checked between file operations in the
/// walker and deletion loops. Cancellation never corrupts the flagged-set
/// invariant: a file is either fully deleted and removed from the set, or
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::CancelToken;

    #[test]
    fn token_starts_clear_and_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());

        // Clones observe the same flag.
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }
}
