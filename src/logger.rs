//! Level-filtered logging facade bound to the delivery service.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::delivery::DeliveryService;
use crate::level::Level;
use crate::record::LogRecord;

/// Level comparison used by the facade: a logger configured at
/// `configured` accepts `message` levels at or above it.
pub fn should_log(configured: Level, message: Level) -> bool {
    message >= configured
}

/// Optional per-event fields carried alongside the message.
#[derive(Clone, Debug, Default)]
pub struct EventFields {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    /// Supplied to correlate with an upstream request; generated when
    /// absent.
    pub request_id: Option<String>,
    pub context: BTreeMap<String, String>,
    /// Event time; defaults to now.
    pub client_log_datetime: Option<DateTime<Utc>>,
}

/// Named logger handing accepted records to the delivery service.
///
/// Every method is non-blocking and swallows delivery-side failures;
/// the only work on the caller's path is the level check, record
/// construction and an O(1) enqueue.
pub struct Logger {
    service: String,
    name: String,
    level: AtomicU8,
    stdout_mirror: bool,
    delivery: Arc<DeliveryService>,
}

impl Logger {
    pub fn new(
        service: &str,
        name: Option<&str>,
        level: Level,
        stdout_mirror: bool,
        delivery: Arc<DeliveryService>,
    ) -> Self {
        Self {
            service: service.to_owned(),
            name: name.unwrap_or(service).to_owned(),
            level: AtomicU8::new(level as u8),
            stdout_mirror,
            delivery,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn enabled_for(&self, level: Level) -> bool {
        should_log(self.level(), level)
    }

    pub fn log(&self, level: Level, message: &str) {
        self.log_with(level, message, EventFields::default());
    }

    pub fn log_with(&self, level: Level, message: &str, fields: EventFields) {
        if !self.enabled_for(level) {
            return;
        }
        let record = self.build_record(level, message, fields);
        if self.stdout_mirror {
            println!(
                "{} | {} | {} | {}",
                record.client_log_datetime.format("%Y-%m-%d %H:%M:%S%.3f"),
                level,
                self.name,
                message
            );
        }
        self.delivery.enqueue(record);
    }

    fn build_record(&self, level: Level, message: &str, fields: EventFields) -> LogRecord {
        LogRecord {
            level,
            service: self.service.clone(),
            logger_name: self.name.clone(),
            message: message.to_owned(),
            user_id: fields.user_id,
            tenant_id: fields.tenant_id,
            request_id: fields
                .request_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            context: fields.context,
            client_log_datetime: fields.client_log_datetime.unwrap_or_else(Utc::now),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    pub fn fatal(&self, message: &str) {
        self.log(Level::Fatal, message);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::level::Level;

    use super::should_log;

    #[rstest]
    #[case(Level::Warn, Level::Debug, false)]
    #[case(Level::Warn, Level::Info, false)]
    #[case(Level::Warn, Level::Warn, true)]
    #[case(Level::Warn, Level::Error, true)]
    #[case(Level::Warn, Level::Fatal, true)]
    #[case(Level::Debug, Level::Debug, true)]
    #[case(Level::Fatal, Level::Error, false)]
    fn filters_below_the_configured_level(
        #[case] configured: Level,
        #[case] message: Level,
        #[case] accepted: bool,
    ) {
        assert_eq!(should_log(configured, message), accepted);
    }
}
