//! Runtime configuration for the shipper.
//!
//! Every option has a sensible default; [`ShipperConfig::from_env`]
//! overlays the recognised `LOGSHIP_*` environment variables on top.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::level::Level;

pub const DEFAULT_SERVICE: &str = "unspecified-service";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/log";
pub const DEFAULT_BUFFER_ROOT: &str = "./var/log";
/// Per-attempt HTTP timeout.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(2);
/// Exhausted delivery cycles before a record is permanently dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Upper bound on the exponential backoff between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ShipperConfig {
    /// Service the shared buffer and signed tokens default to.
    pub service: String,
    /// URL records are POSTed to.
    pub endpoint: String,
    /// HS256 secret handed to the token signer.
    pub signing_secret: String,
    /// Minimum level newly created loggers accept.
    pub default_level: Level,
    /// Per-attempt HTTP timeout.
    pub api_timeout: Duration,
    /// Root directory for the per-service disk buffers.
    pub buffer_root: PathBuf,
    /// Mirror accepted records to stdout.
    pub stdout_mirror: bool,
    pub max_retries: u32,
    pub max_backoff: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_owned(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            signing_secret: String::new(),
            default_level: Level::Info,
            api_timeout: DEFAULT_API_TIMEOUT,
            buffer_root: PathBuf::from(DEFAULT_BUFFER_ROOT),
            stdout_mirror: true,
            max_retries: DEFAULT_MAX_RETRIES,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl ShipperConfig {
    /// Defaults overlaid with the recognised environment variables:
    /// `LOGSHIP_SERVICE`, `LOGSHIP_URL`, `LOGSHIP_API_KEY`,
    /// `LOGSHIP_DEFAULT_LEVEL`, `LOGSHIP_BUFFER_ROOT` and
    /// `LOGSHIP_STDOUT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(service) = env::var("LOGSHIP_SERVICE") {
            config.service = service;
        }
        if let Ok(endpoint) = env::var("LOGSHIP_URL") {
            config.endpoint = endpoint;
        }
        if let Ok(secret) = env::var("LOGSHIP_API_KEY") {
            config.signing_secret = secret;
        }
        if let Ok(level) = env::var("LOGSHIP_DEFAULT_LEVEL") {
            config.default_level = Level::parse_or_info(&level);
        }
        if let Ok(root) = env::var("LOGSHIP_BUFFER_ROOT") {
            config.buffer_root = PathBuf::from(root);
        }
        if let Ok(stdout) = env::var("LOGSHIP_STDOUT") {
            config.stdout_mirror = !matches!(stdout.as_str(), "0" | "false" | "no");
        }
        config
    }
}
