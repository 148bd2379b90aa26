//! Worker loop driving HTTP delivery.
//!
//! The worker maintains a ureq Agent for connection pooling. Each
//! dequeued record gets one delivery cycle: up to three attempts with
//! exponential backoff, a fresh bearer token per attempt, then a buffer
//! write or a permanent drop once the cycle and the retry budget are
//! exhausted. Every step has an explicit error kind; all of them are
//! converted to local diagnostics at this boundary, so the worker never
//! raises to its caller.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use thiserror::Error;
use ureq::{Agent, AgentBuilder};

use crate::buffer::BufferMap;
use crate::queue::{DeliveryQueue, Dequeued};
use crate::record::Envelope;
use crate::token::{SignError, TokenSigner};

use super::shutdown::WorkerState;
use super::{ATTEMPTS_PER_CYCLE, DEQUEUE_TIMEOUT};

/// Failure of a single delivery attempt. All variants are transient
/// from the cycle's point of view: the attempt is retried, and the
/// record buffered if the cycle exhausts.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("token signing failed: {0}")]
    Sign(#[from] SignError),
    #[error("record serialisation failed: {0}")]
    Serialise(#[from] serde_json::Error),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Where an envelope ended up after one delivery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Delivered,
    Buffered,
    Dropped,
}

/// Worker-facing snapshot of the shipper configuration.
#[derive(Clone, Debug)]
pub(crate) struct DeliveryConfig {
    pub endpoint: String,
    pub api_timeout: Duration,
    pub max_retries: u32,
    pub max_backoff: Duration,
}

pub(crate) struct Worker {
    queue: DeliveryQueue,
    buffers: Arc<BufferMap>,
    signer: Arc<dyn TokenSigner>,
    state: Arc<WorkerState>,
    agent: Agent,
    config: DeliveryConfig,
}

impl Worker {
    pub(crate) fn new(
        queue: DeliveryQueue,
        buffers: Arc<BufferMap>,
        signer: Arc<dyn TokenSigner>,
        state: Arc<WorkerState>,
        config: DeliveryConfig,
    ) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(config.api_timeout)
            .timeout(config.api_timeout)
            .build();
        Self {
            queue,
            buffers,
            signer,
            state,
            agent,
            config,
        }
    }

    /// Consume the queue until a stop request or the sentinel arrives,
    /// then drain what is left and exit.
    pub(crate) fn run(&mut self) {
        self.state.mark_started();
        loop {
            if self.state.stop_requested() && self.queue.is_empty() {
                break;
            }
            match self.queue.dequeue(DEQUEUE_TIMEOUT) {
                Dequeued::Record(envelope) => {
                    self.deliver_cycle(envelope);
                }
                Dequeued::Shutdown => {
                    self.drain_remaining();
                    break;
                }
                Dequeued::TimedOut => continue,
                Dequeued::Disconnected => break,
            }
        }
    }

    fn drain_remaining(&mut self) {
        while let Some(envelope) = self.queue.try_dequeue_record() {
            self.deliver_cycle(envelope);
        }
    }

    /// One delivery cycle: up to [`ATTEMPTS_PER_CYCLE`] attempts with
    /// interruptible exponential backoff between them.
    fn deliver_cycle(&mut self, envelope: Envelope) -> CycleOutcome {
        for attempt in 1..=ATTEMPTS_PER_CYCLE {
            match self.attempt_post(&envelope) {
                Ok(()) => return CycleOutcome::Delivered,
                Err(err) => {
                    warn!(
                        "delivery attempt {attempt}/{ATTEMPTS_PER_CYCLE} for {} failed: {err}",
                        envelope.record.request_id
                    );
                    if attempt < ATTEMPTS_PER_CYCLE {
                        // A stop request cuts the sleep short; remaining
                        // attempts then run back to back so the drain
                        // stays bounded.
                        self.state
                            .sleep_interruptibly(backoff_delay(attempt, self.config.max_backoff));
                    }
                }
            }
        }
        self.cycle_exhausted(envelope)
    }

    /// All attempts in the cycle failed: persist for a future cycle or
    /// drop once the retry budget is spent.
    fn cycle_exhausted(&mut self, mut envelope: Envelope) -> CycleOutcome {
        envelope.retry_count += 1;
        if envelope.retry_count >= self.config.max_retries {
            warn!(
                "dropping record {} permanently after {} delivery cycles",
                envelope.record.request_id, envelope.retry_count
            );
            return CycleOutcome::Dropped;
        }
        let written = self
            .buffers
            .for_service(&envelope.record.service)
            .and_then(|buffer| buffer.write(&envelope));
        match written {
            Ok(()) => CycleOutcome::Buffered,
            Err(err) => {
                // Best-effort boundary: the record is lost, the caller
                // is never told.
                warn!(
                    "failed to buffer record {}: {err}",
                    envelope.record.request_id
                );
                CycleOutcome::Dropped
            }
        }
    }

    /// A single HTTP attempt with a freshly signed bearer token.
    fn attempt_post(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let token = self.signer.sign(&envelope.record.service)?;
        let body = serde_json::to_string(envelope)?;
        let response = self
            .agent
            .post(&self.config.endpoint)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {token}"))
            .send_string(&body);
        match response {
            Ok(resp) => {
                let status = resp.status();
                if (200..300).contains(&status) {
                    Ok(())
                } else {
                    Err(DeliveryError::Status(status))
                }
            }
            Err(ureq::Error::Status(status, _)) => Err(DeliveryError::Status(status)),
            Err(ureq::Error::Transport(transport)) => {
                Err(DeliveryError::Transport(transport.to_string()))
            }
        }
    }
}

/// Backoff before the next attempt of a cycle:
/// `min(2^attempt, max_backoff)` seconds.
pub(crate) fn backoff_delay(attempt: u32, max_backoff: Duration) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt)).min(max_backoff)
}
