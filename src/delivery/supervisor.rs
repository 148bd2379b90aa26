//! Supervised execution of the delivery worker.
//!
//! The worker's run loop executes on a dedicated thread under
//! `catch_unwind`, so a crash in delivery logic cannot poison the
//! caller's process. On a panic or otherwise unexpected exit the
//! supervisor waits a fixed interval and starts a fresh worker over the
//! same queue; unconsumed items survive because the queue lives outside
//! the worker. A deliberate stop exits the loop without restarting.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use log::{info, warn};

use super::shutdown::WorkerState;

/// Spawn the supervisor thread. `run_worker` builds and runs one worker
/// to completion; it is invoked again for every restart. The returned
/// receiver yields one message when the supervisor has fully exited,
/// giving the shutdown path a bounded join.
pub(crate) fn spawn<F>(
    state: Arc<WorkerState>,
    restart_delay: Duration,
    mut run_worker: F,
) -> (JoinHandle<()>, Receiver<()>)
where
    F: FnMut() + Send + 'static,
{
    let (done_tx, done_rx) = bounded(1);
    let handle = thread::spawn(move || {
        supervise(&state, restart_delay, &mut run_worker);
        let _ = done_tx.send(());
    });
    (handle, done_rx)
}

fn supervise<F: FnMut()>(state: &WorkerState, restart_delay: Duration, run_worker: &mut F) {
    loop {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_worker()));
        if state.stop_requested() {
            break;
        }
        match outcome {
            Ok(()) => warn!("delivery worker exited unexpectedly; restarting in {restart_delay:?}"),
            Err(_) => warn!("delivery worker panicked; restarting in {restart_delay:?}"),
        }
        if !state.sleep_interruptibly(restart_delay) {
            break;
        }
        info!("starting replacement delivery worker");
    }
}
