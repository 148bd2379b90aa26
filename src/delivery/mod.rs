//! Durable delivery subsystem: queue draining, HTTP posting, supervised
//! restart and graceful shutdown.
//!
//! [`DeliveryService`] is an explicitly constructed value shared via
//! `Arc`. Constructing one performs startup recovery (every persisted
//! record is fed back into the queue before new records are accepted)
//! and then starts the supervised worker.

mod shutdown;
mod supervisor;
mod worker;

pub use shutdown::WorkerState;
pub use worker::{CycleOutcome, DeliveryError};

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::warn;
use parking_lot::Mutex;

use crate::buffer::{BufferError, BufferMap};
use crate::config::ShipperConfig;
use crate::queue::DeliveryQueue;
use crate::record::{Envelope, LogRecord};
use crate::token::TokenSigner;

use worker::{DeliveryConfig, Worker};

/// How long the worker blocks per dequeue before re-checking the stop
/// flag.
pub(crate) const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);
/// HTTP attempts per delivery cycle.
pub(crate) const ATTEMPTS_PER_CYCLE: u32 = 3;
/// Pause before a crashed worker is replaced.
const RESTART_DELAY: Duration = Duration::from_secs(3);
/// Shutdown grace for a worker that has not yet signalled `started`.
const STARTED_WAIT: Duration = Duration::from_secs(2);
/// Shutdown grace for the supervisor to finish draining.
const DRAIN_WAIT: Duration = Duration::from_secs(2);

/// One queue + buffer + supervised worker set for a delivery target.
pub struct DeliveryService {
    queue: DeliveryQueue,
    buffers: Arc<BufferMap>,
    state: Arc<WorkerState>,
    supervisor: Mutex<Option<(JoinHandle<()>, Receiver<()>)>>,
}

impl DeliveryService {
    /// Build the service, requeue everything the disk buffer holds,
    /// then start the supervised worker.
    pub fn start(
        config: &ShipperConfig,
        signer: Arc<dyn TokenSigner>,
    ) -> Result<Arc<Self>, BufferError> {
        let buffers = Arc::new(BufferMap::new(&config.buffer_root));
        let queue = DeliveryQueue::new();
        // Startup recovery: no persisted record is skipped, and all of
        // them precede newly accepted records in the queue.
        for envelope in buffers.read_all() {
            if queue.enqueue(envelope).is_err() {
                break;
            }
        }

        let state = Arc::new(WorkerState::new());
        let delivery_config = DeliveryConfig {
            endpoint: config.endpoint.clone(),
            api_timeout: config.api_timeout,
            max_retries: config.max_retries,
            max_backoff: config.max_backoff,
        };
        let worker_queue = queue.clone();
        let worker_buffers = Arc::clone(&buffers);
        let worker_state = Arc::clone(&state);
        let supervisor = supervisor::spawn(Arc::clone(&state), RESTART_DELAY, move || {
            Worker::new(
                worker_queue.clone(),
                Arc::clone(&worker_buffers),
                Arc::clone(&signer),
                Arc::clone(&worker_state),
                delivery_config.clone(),
            )
            .run();
        });

        Ok(Arc::new(Self {
            queue,
            buffers,
            state,
            supervisor: Mutex::new(Some(supervisor)),
        }))
    }

    /// Accept a record for delivery. O(1) on the caller's critical
    /// path; never blocks, never raises.
    pub fn enqueue(&self, record: LogRecord) {
        self.enqueue_envelope(Envelope::new(record));
    }

    pub(crate) fn enqueue_envelope(&self, envelope: Envelope) {
        if self.state.stop_requested() {
            // Nobody drains the queue any more; late records go
            // straight to disk rather than being silently discarded.
            if let Err(err) = self
                .buffers
                .for_service(&envelope.record.service)
                .and_then(|buffer| buffer.write(&envelope))
            {
                warn!(
                    "failed to buffer record {} after shutdown: {err}",
                    envelope.record.request_id
                );
            }
            return;
        }
        if let Err(err) = self.queue.enqueue(envelope) {
            warn!("failed to enqueue record: {err}");
        }
    }

    /// Number of records currently queued in memory.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Graceful drain and shutdown. Idempotent; returns within a
    /// bounded wait no matter how often it is called.
    ///
    /// Sets the stop flag, pushes the sentinel, and then either waits
    /// for the worker to drain or, if the worker never started, flushes
    /// the in-memory queue to disk so nothing is left only in memory.
    pub fn stop(&self) {
        self.state.request_stop();
        self.queue.push_shutdown();

        if !self.state.wait_started(STARTED_WAIT) {
            warn!("delivery worker never started; flushing queued records to disk");
            self.flush_queue_to_disk();
            // Nothing to join: the supervisor will observe the stop
            // flag and exit on its own.
            drop(self.supervisor.lock().take());
            return;
        }

        let Some((handle, done_rx)) = self.supervisor.lock().take() else {
            return;
        };
        if done_rx.recv_timeout(DRAIN_WAIT).is_ok() {
            let _ = handle.join();
        } else {
            warn!("delivery worker did not drain within {DRAIN_WAIT:?}; detaching");
            drop(handle);
        }
    }

    /// Alias for [`stop`](Self::stop), matching the facade's flush
    /// semantics: both drain and shut the worker down.
    pub fn flush(&self) {
        self.stop();
    }

    fn flush_queue_to_disk(&self) {
        for envelope in self.queue.drain_now() {
            if let Err(err) = self
                .buffers
                .for_service(&envelope.record.service)
                .and_then(|buffer| buffer.write(&envelope))
            {
                warn!(
                    "failed to flush record {} to disk: {err}",
                    envelope.record.request_id
                );
            }
        }
    }
}

impl Drop for DeliveryService {
    fn drop(&mut self) {
        self.stop();
    }
}
