//! logship: a client-side log-shipping library.
//!
//! Structured records are accepted without blocking the caller,
//! delivered to a central logging service over HTTP by a supervised
//! background worker, and persisted to a per-service JSON-lines disk
//! buffer whenever delivery fails, so accepted records survive process
//! restarts and network partitions. Delivery is at-least-once: every
//! accepted record is eventually delivered or explicitly dropped after
//! exhausting its retry budget, and its `request_id` stays stable
//! across retries so downstream consumers can deduplicate.
//!
//! Quick start:
//!
//! ```no_run
//! use logship::{EventFields, Level};
//!
//! let logger = logship::get_logger("billing").expect("open buffer");
//! logger.info("invoice created");
//! logger.log_with(
//!     Level::Error,
//!     "charge failed",
//!     EventFields {
//!         user_id: Some("u-7".into()),
//!         ..EventFields::default()
//!     },
//! );
//! logship::shutdown();
//! ```
//!
//! The process-wide registry above is a convenience layer; the delivery
//! core is an ordinary value that can be constructed explicitly and
//! shared by reference:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logship::{DeliveryService, JwtSigner, Logger, Level, ShipperConfig};
//!
//! let config = ShipperConfig::from_env();
//! let signer = Arc::new(JwtSigner::new(&config.signing_secret));
//! let delivery = DeliveryService::start(&config, signer).expect("open buffer");
//! let logger = Logger::new("billing", None, Level::Info, false, Arc::clone(&delivery));
//! logger.warn("low balance");
//! delivery.stop();
//! ```

pub mod buffer;
pub mod config;
pub mod delivery;
pub mod level;
pub mod logger;
pub mod queue;
pub mod record;
pub mod registry;
pub mod token;

pub use buffer::{BufferError, BufferMap, DiskBuffer};
pub use config::ShipperConfig;
pub use delivery::{CycleOutcome, DeliveryError, DeliveryService};
pub use level::Level;
pub use logger::{EventFields, Logger, should_log};
pub use queue::{DeliveryQueue, Dequeued, QueueError};
pub use record::{Envelope, LogRecord};
pub use registry::{
    get_logger, log, log_debug, log_error, log_fatal, log_info, log_warn, reset_registry,
    set_log_level, shutdown,
};
pub use token::{JwtSigner, SignError, TokenSigner};
