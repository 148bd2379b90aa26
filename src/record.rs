//! Log record representation for the logship delivery subsystem.
//!
//! A [`LogRecord`] is the immutable log event the caller produced. The
//! delivery path never mutates it; the attempt counter lives on the
//! [`Envelope`] wrapper that travels through the queue and the disk
//! buffer.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::level::Level;

/// One structured log event.
///
/// `request_id` is assigned exactly once at creation and stays stable
/// across retries and re-buffering so downstream consumers can
/// deduplicate duplicate deliveries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: Level,
    pub service: String,
    pub logger_name: String,
    pub message: String,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub request_id: String,
    pub context: BTreeMap<String, String>,
    pub client_log_datetime: DateTime<Utc>,
}

impl LogRecord {
    /// Construct a record with a fresh `request_id` and the current time.
    pub fn new(service: &str, logger_name: &str, level: Level, message: &str) -> Self {
        Self {
            level,
            service: service.to_owned(),
            logger_name: logger_name.to_owned(),
            message: message.to_owned(),
            user_id: None,
            tenant_id: None,
            request_id: Uuid::new_v4().to_string(),
            context: BTreeMap::new(),
            client_log_datetime: Utc::now(),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.level, self.message)
    }
}

/// Delivery-attempt wrapper around an immutable [`LogRecord`].
///
/// Serialised flat: buffer lines and the wire body are one JSON object
/// holding the record fields plus `retry_count`. `retry_count` counts
/// exhausted delivery cycles, starts at 0 and only ever grows; a line
/// written before the field existed deserialises as 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub record: LogRecord,
    #[serde(default)]
    pub retry_count: u32,
}

impl Envelope {
    pub fn new(record: LogRecord) -> Self {
        Self {
            record,
            retry_count: 0,
        }
    }
}

impl From<LogRecord> for Envelope {
    fn from(record: LogRecord) -> Self {
        Self::new(record)
    }
}
