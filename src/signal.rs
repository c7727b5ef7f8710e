/// One-shot readiness rendezvous between a caller and its dispatch thread

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ReadySignal {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl ReadySignal {
    pub fn new() -> Self {
        ReadySignal::default()
    }

    /// Mark ready and wake every waiter.
    pub fn set(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.cond.notify_all();
    }

    /// Block until `set()` has been called.
    pub fn wait(&self) {
        let mut ready = self.ready.lock();
        while !*ready {
            self.cond.wait(&mut ready);
        }
    }

    /// Block at most `timeout`; returns whether the signal is set.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.lock();
        if !*ready {
            self.cond.wait_while_for(&mut ready, |r| !*r, timeout);
        }
        *ready
    }

    pub fn is_set(&self) -> bool {
        *self.ready.lock()
    }

    pub fn reset(&self) {
        *self.ready.lock() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_returns_after_set() {
        let sig = Arc::new(ReadySignal::new());
        let s = Arc::clone(&sig);
        let handle = thread::spawn(move || s.set());
        sig.wait();
        assert!(sig.is_set());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_times_out() {
        let sig = ReadySignal::new();
        assert!(!sig.wait_for(Duration::from_millis(10)));
        sig.set();
        assert!(sig.wait_for(Duration::from_millis(10)));
        sig.reset();
        assert!(!sig.is_set());
    }
}
