//! Rate limiting for high-frequency pointer input.
//!
//! `Throttle` lets the first call of every window through and drops the rest.
//! `Debounce` waits for a quiet period and then fires once with the last value.
//! Both read time from `tokio::time`, so paused-clock tests drive them exactly.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// A boxed callback taking one argument.
pub type Callback<T> = Box<dyn FnMut(T) + Send + Sync>;

/// Leading-edge, fixed-window throttle.
///
/// The window starts when a call is let through. Calls inside the window are
/// dropped, not queued; the first call after it passes immediately.
pub struct Throttle<T> {
    interval: Duration,
    last_fired: Option<Instant>,
    callback: Callback<T>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration, callback: impl FnMut(T) + Send + Sync + 'static) -> Self {
        Self {
            interval,
            last_fired: None,
            callback: Box::new(callback),
        }
    }

    /// Invokes the callback unless the current window is still open.
    /// Returns `true` if the callback ran.
    pub fn call(&mut self, arg: T) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_fired {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_fired = Some(now);
        (self.callback)(arg);
        true
    }

    /// Closes the current window so the next call passes.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Trailing-edge debounce.
///
/// Every call restarts the wait. The callback runs on a tokio task once no
/// call has arrived for the whole wait, with the most recent argument.
/// Must be called from within a tokio runtime.
pub struct Debounce<T> {
    wait: Duration,
    callback: Arc<Mutex<Callback<T>>>,
    pending: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debounce<T> {
    pub fn new(wait: Duration, callback: impl FnMut(T) + Send + Sync + 'static) -> Self {
        Self {
            wait,
            callback: Arc::new(Mutex::new(Box::new(callback))),
            pending: None,
        }
    }

    pub fn call(&mut self, arg: T) {
        self.cancel();
        let callback = Arc::clone(&self.callback);
        let wait = self.wait;
        self.pending = Some(tokio::spawn(async move {
            time::sleep(wait).await;
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            (callback)(arg);
        }));
    }

    /// Drops a pending invocation. Returns `true` if one was waiting.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                let was_waiting = !handle.is_finished();
                handle.abort();
                was_waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<T> Drop for Debounce<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
