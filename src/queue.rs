//! In-process FIFO bridging producer calls to the delivery worker.
//!
//! The queue is unbounded so `enqueue` stays O(1) and non-blocking on
//! the caller's critical path; the worker side blocks with a short
//! timeout so it can poll the stop flag without spinning.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use thiserror::Error;

use crate::record::Envelope;

/// Items carried by the queue. `Shutdown` is the sentinel: drain what
/// remains, then exit.
#[derive(Debug)]
enum Item {
    Record(Envelope),
    Shutdown,
}

/// Outcome of a blocking dequeue.
#[derive(Debug)]
pub enum Dequeued {
    Record(Envelope),
    Shutdown,
    TimedOut,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// All receivers are gone. Only reachable through resource
    /// exhaustion or teardown bugs; reported, never retried.
    #[error("delivery queue disconnected")]
    Disconnected,
}

/// Cloneable handle to the shared FIFO. The queue itself lives for the
/// process, so unconsumed items survive worker restarts.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: Sender<Item>,
    rx: Receiver<Item>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Never blocks. Fails only when the channel is disconnected.
    pub fn enqueue(&self, envelope: Envelope) -> Result<(), QueueError> {
        self.tx
            .send(Item::Record(envelope))
            .map_err(|_| QueueError::Disconnected)
    }

    /// Push the drain-then-exit sentinel, unblocking a blocked dequeue.
    pub fn push_shutdown(&self) {
        let _ = self.tx.send(Item::Shutdown);
    }

    /// Block up to `timeout` for the next item.
    pub fn dequeue(&self, timeout: Duration) -> Dequeued {
        match self.rx.recv_timeout(timeout) {
            Ok(Item::Record(envelope)) => Dequeued::Record(envelope),
            Ok(Item::Shutdown) => Dequeued::Shutdown,
            Err(RecvTimeoutError::Timeout) => Dequeued::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Dequeued::Disconnected,
        }
    }

    /// Pop the next record without blocking, skipping sentinels.
    pub fn try_dequeue_record(&self) -> Option<Envelope> {
        loop {
            match self.rx.try_recv() {
                Ok(Item::Record(envelope)) => return Some(envelope),
                Ok(Item::Shutdown) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Empty the queue without blocking, returning every queued record.
    pub fn drain_now(&self) -> Vec<Envelope> {
        let mut drained = Vec::new();
        while let Some(envelope) = self.try_dequeue_record() {
            drained.push(envelope);
        }
        drained
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::level::Level;
    use crate::record::{Envelope, LogRecord};

    use super::{Dequeued, DeliveryQueue};

    fn envelope(message: &str) -> Envelope {
        Envelope::new(LogRecord::new("svc", "svc", Level::Info, message))
    }

    #[test]
    fn preserves_fifo_order() {
        let queue = DeliveryQueue::new();
        queue.enqueue(envelope("first")).unwrap();
        queue.enqueue(envelope("second")).unwrap();

        match queue.dequeue(Duration::from_millis(10)) {
            Dequeued::Record(e) => assert_eq!(e.record.message, "first"),
            other => panic!("expected record, got {other:?}"),
        }
        match queue.dequeue(Duration::from_millis(10)) {
            Dequeued::Record(e) => assert_eq!(e.record.message, "second"),
            other => panic!("expected record, got {other:?}"),
        }
    }

    #[test]
    fn dequeue_times_out_on_empty_queue() {
        let queue = DeliveryQueue::new();
        assert!(matches!(
            queue.dequeue(Duration::from_millis(10)),
            Dequeued::TimedOut
        ));
    }

    #[test]
    fn sentinel_is_distinct_from_records() {
        let queue = DeliveryQueue::new();
        queue.enqueue(envelope("only")).unwrap();
        queue.push_shutdown();

        assert!(matches!(
            queue.dequeue(Duration::from_millis(10)),
            Dequeued::Record(_)
        ));
        assert!(matches!(
            queue.dequeue(Duration::from_millis(10)),
            Dequeued::Shutdown
        ));
    }

    #[test]
    fn drain_now_returns_records_and_discards_sentinels() {
        let queue = DeliveryQueue::new();
        queue.enqueue(envelope("a")).unwrap();
        queue.push_shutdown();
        queue.enqueue(envelope("b")).unwrap();

        let drained = queue.drain_now();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }
}
