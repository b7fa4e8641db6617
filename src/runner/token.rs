//! Cooperative stop signal for unit worker threads.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// One-way cancellation flag shared between the runner and a unit.
///
/// Built on a condvar rather than an async primitive because unit entries
/// run on plain threads: a unit sleeping in [`wait_timeout`] wakes
/// immediately when the runner cancels, instead of sleeping out its
/// interval.
///
/// Cancellation is sticky. There is no reset; every run gets a fresh token.
///
/// [`wait_timeout`]: StopToken::wait_timeout
#[derive(Clone, Default)]
pub struct StopToken {
    shared: Arc<(Mutex<bool>, Condvar)>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter.
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.shared;
        if let Ok(mut cancelled) = flag.lock() {
            *cancelled = true;
        }
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.shared;
        flag.lock().map(|cancelled| *cancelled).unwrap_or(true)
    }

    /// Blocks until cancelled or `timeout` elapses. Returns `true` when the
    /// token was cancelled.
    ///
    /// Units should use this instead of `thread::sleep` for any pause so
    /// stop requests take effect promptly.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.shared;
        let Ok(guard) = flag.lock() else {
            return true;
        };
        let result = condvar.wait_timeout_while(guard, timeout, |cancelled| !*cancelled);
        match result {
            Ok((cancelled, _)) => *cancelled,
            Err(_) => true,
        }
    }
}
