//! Process-wide logger registry and convenience functions.
//!
//! The delivery service itself is an explicitly constructed value (see
//! [`DeliveryService::start`]); this module is the thin convenience
//! layer over it. On first use it lazily builds exactly one shared
//! service from environment configuration under a creation lock, so
//! concurrent first lookups from multiple threads still yield a single
//! instance, and every named logger holds an `Arc` reference to it.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::buffer::BufferError;
use crate::config::ShipperConfig;
use crate::delivery::DeliveryService;
use crate::level::Level;
use crate::logger::{EventFields, Logger};
use crate::token::JwtSigner;

struct Registry {
    config: ShipperConfig,
    service: Option<Arc<DeliveryService>>,
    loggers: HashMap<String, Arc<Logger>>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        config: ShipperConfig::from_env(),
        service: None,
        loggers: HashMap::new(),
    })
});

fn shared_service(registry: &mut Registry) -> Result<Arc<DeliveryService>, BufferError> {
    if let Some(service) = &registry.service {
        return Ok(Arc::clone(service));
    }
    let signer = Arc::new(JwtSigner::new(&registry.config.signing_secret));
    let service = DeliveryService::start(&registry.config, signer)?;
    registry.service = Some(Arc::clone(&service));
    Ok(service)
}

/// Look up or lazily create a logger named (and servicing) `name`,
/// bound to the shared delivery service.
pub fn get_logger(name: &str) -> Result<Arc<Logger>, BufferError> {
    let mut registry = REGISTRY.lock();
    if let Some(existing) = registry.loggers.get(name) {
        return Ok(Arc::clone(existing));
    }
    let service = shared_service(&mut registry)?;
    let logger = Arc::new(Logger::new(
        name,
        None,
        registry.config.default_level,
        registry.config.stdout_mirror,
        service,
    ));
    registry.loggers.insert(name.to_owned(), Arc::clone(&logger));
    Ok(logger)
}

/// Adjust the minimum level of the named logger, creating it if needed.
pub fn set_log_level(name: &str, level: Level) {
    match get_logger(name) {
        Ok(logger) => logger.set_level(level),
        Err(err) => warn!("set_log_level could not obtain logger {name}: {err}"),
    }
}

/// One-shot logging through the shared service. Failures to obtain a
/// logger are reported locally and swallowed, like every other failure
/// on this path.
pub fn log(level: Level, service: &str, message: &str, fields: EventFields) {
    match get_logger(service) {
        Ok(logger) => logger.log_with(level, message, fields),
        Err(err) => warn!("log could not obtain logger {service}: {err}"),
    }
}

pub fn log_debug(service: &str, message: &str) {
    log(Level::Debug, service, message, EventFields::default());
}

pub fn log_info(service: &str, message: &str) {
    log(Level::Info, service, message, EventFields::default());
}

pub fn log_warn(service: &str, message: &str) {
    log(Level::Warn, service, message, EventFields::default());
}

pub fn log_error(service: &str, message: &str) {
    log(Level::Error, service, message, EventFields::default());
}

pub fn log_fatal(service: &str, message: &str) {
    log(Level::Fatal, service, message, EventFields::default());
}

/// Drain and stop the shared delivery service. Loggers created earlier
/// stay usable: records they accept afterwards are buffered to disk for
/// the next startup. Idempotent.
pub fn shutdown() {
    let service = REGISTRY.lock().service.take();
    if let Some(service) = service {
        service.stop();
    }
}

/// Tear the registry down completely: stop the shared service, forget
/// all named loggers and re-read configuration on next use.
pub fn reset_registry() {
    let mut registry = REGISTRY.lock();
    if let Some(service) = registry.service.take() {
        service.stop();
    }
    registry.loggers.clear();
    registry.config = ShipperConfig::from_env();
}
