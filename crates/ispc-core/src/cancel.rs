//! Cooperative cancellation (§5): every entry point accepts a token, and
//! checks it at host-function entry and at semaphore acquisition. A
//! cancelled context still runs through to orderly destruction — this
//! token only ever gets *observed*, never used to abort a thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let tok = CancellationToken::new();
        assert!(!tok.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let tok = CancellationToken::new();
        let clone = tok.clone();
        clone.cancel();
        assert!(tok.is_cancelled());
    }
}
