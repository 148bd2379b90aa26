//! Lifecycle flags shared between the shutdown path, the supervisor
//! and the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Granularity at which interruptible sleeps re-check the stop flag.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// `stop_requested` is monotonic: set once, never cleared. `started`
/// flips once the worker's run loop is confirmed live, so the shutdown
/// path can tell "worker draining" from "worker never ran".
pub struct WorkerState {
    stop_requested: AtomicBool,
    started: Mutex<bool>,
    started_cv: Condvar,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            started: Mutex::new(false),
            started_cv: Condvar::new(),
        }
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Called by the worker when its run loop is live.
    pub fn mark_started(&self) {
        let mut started = self.started.lock();
        *started = true;
        self.started_cv.notify_all();
    }

    /// Wait up to `timeout` for the worker to signal `started`.
    pub fn wait_started(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut started = self.started.lock();
        while !*started {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.started_cv.wait_for(&mut started, remaining);
        }
        true
    }

    /// Sleep `total`, sliced so a stop request cuts it short. Returns
    /// `true` when the full duration elapsed without interruption.
    pub fn sleep_interruptibly(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.stop_requested() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}
