//! Cooperative cancellation shared by every background thread.
//!
//! All fixed delays in the crate go through [`ShutdownToken::sleep`], which
//! wakes immediately when the token is cancelled so loops stop promptly.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cloneable cancellation token backed by a `(Mutex<bool>, Condvar)` pair.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeping thread.
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was
    /// (or already is) cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            cancelled = match cvar.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(!ShutdownToken::new().is_cancelled());
    }

    #[test]
    fn sleep_completes_when_not_cancelled() {
        let token = ShutdownToken::new();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn sleep_returns_false_after_cancel() {
        let token = ShutdownToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(!token.sleep(Duration::from_secs(60)));
    }

    #[test]
    fn cancel_wakes_sleeping_thread() {
        let token = ShutdownToken::new();
        let sleeper = token.clone();
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let finished = sleeper.sleep(Duration::from_secs(30));
            (finished, start.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (finished, elapsed) = handle.join().unwrap();
        assert!(!finished);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn clones_share_cancellation() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
