//! Single-fire completion latch.
//!
//! Bridges callback-style completion (network task finished, user pressed
//! cancel, a transport error surfaced) onto one awaited result. The first
//! caller of [`CompletionLatch::complete`] wins; every later call is a no-op.

use std::sync::Mutex;

use tokio::sync::oneshot;

pub struct CompletionLatch<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> CompletionLatch<T> {
    /// Creates the latch and the receiver its single value is delivered to.
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let latch = Self {
            sender: Mutex::new(Some(tx)),
        };
        (latch, rx)
    }

    /// Delivers `value` if nothing was delivered yet.
    ///
    /// Returns `true` for the winning call. A dropped receiver still
    /// counts as completed.
    pub fn complete(&self, value: T) -> bool {
        let sender = self.sender.lock().unwrap().take();
        match sender {
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.sender.lock().unwrap().is_none()
    }
}
