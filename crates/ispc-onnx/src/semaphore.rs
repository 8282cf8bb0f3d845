//! A counting permit gate for bounding concurrent ONNX sessions (§5's "ONNX
//! concurrency gate"). Built from `Mutex` + `Condvar` rather than an async
//! semaphore, matching the node's own `std::sync`-only concurrency style
//! (no tokio in this workspace's synchronous engines).

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use ispc_core::CancellationToken;

pub struct Semaphore {
    state: Mutex<usize>,
    available: Condvar,
}

/// An acquired slot; releases automatically on drop.
pub struct Permit<'a> {
    sem: &'a Semaphore,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut count = self.sem.state.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        self.sem.available.notify_one();
    }
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        Semaphore {
            state: Mutex::new(capacity),
            available: Condvar::new(),
        }
    }

    /// Blocks until a slot is free, polling `cancel` periodically so
    /// cancellation is honored at acquisition (§5).
    pub fn acquire(&self, cancel: &CancellationToken) -> Option<Permit<'_>> {
        let mut count = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if *count > 0 {
                *count -= 1;
                return Some(Permit { sem: self });
            }
            let (guard, _timeout) = self
                .available
                .wait_timeout(count, Duration::from_millis(50))
                .unwrap_or_else(|e| e.into_inner());
            count = guard;
        }
    }
}
