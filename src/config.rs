//! Service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparseable values fall
//! back to defaults; only an invalid `LISTEN_ADDR` is fatal.

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use crate::service::ServiceOptions;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`ServiceConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Base URL of the OpenAI-compatible vision API.
    pub vision_api_url: String,

    /// Bearer token for the vision API.
    pub vision_api_key: Option<String>,

    /// Vision model identifier.
    pub vision_model: String,

    /// Budget for one vision call, in milliseconds.
    pub vision_timeout_ms: u64,

    /// Maximum tokens the vision model may generate.
    pub vision_max_tokens: u32,

    /// Budget for one enrichment step, in milliseconds.
    pub enrichment_timeout_ms: u64,

    /// Maximum items per batch request.
    pub batch_max_items: usize,

    /// Batch items processed concurrently.
    pub batch_concurrency: usize,

    /// Maximum decoded image size in bytes.
    pub max_image_bytes: usize,

    /// Whether the VIN processor calls the remote decoder.
    pub vin_decoder_enabled: bool,

    /// Base URL of the VIN decoding API.
    pub vin_decoder_url: String,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Log output format.
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, AddrParseError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AddrParseError> {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let listen_addr: SocketAddr = text("LISTEN_ADDR", "0.0.0.0:3000").parse()?;
        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            vision_api_url: text("VISION_API_URL", "https://api.openai.com/v1"),
            vision_api_key: lookup("VISION_API_KEY").filter(|k| !k.trim().is_empty()),
            vision_model: text("VISION_MODEL", "gpt-4o-mini"),
            vision_timeout_ms: parse_value(&lookup, "VISION_TIMEOUT_MS", 30_000),
            vision_max_tokens: parse_value(&lookup, "VISION_MAX_TOKENS", 1024),
            enrichment_timeout_ms: parse_value(&lookup, "ENRICHMENT_TIMEOUT_MS", 5_000),
            batch_max_items: parse_value(&lookup, "BATCH_MAX_ITEMS", 20),
            batch_concurrency: parse_value(&lookup, "BATCH_CONCURRENCY", 4),
            max_image_bytes: parse_value(&lookup, "MAX_IMAGE_BYTES", 10 * 1024 * 1024),
            vin_decoder_enabled: parse_bool(&lookup, "VIN_DECODER_ENABLED", true),
            vin_decoder_url: text("VIN_DECODER_URL", "https://vpic.nhtsa.dot.gov/api"),
            event_bus_capacity: parse_value(&lookup, "EVENT_BUS_CAPACITY", 10_000),
            log_format,
        })
    }

    /// Limits handed to the document service.
    #[must_use]
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            vision_timeout: Duration::from_millis(self.vision_timeout_ms),
            enrichment_timeout: Duration::from_millis(self.enrichment_timeout_ms),
            batch_max_items: self.batch_max_items,
            batch_concurrency: self.batch_concurrency.max(1),
            max_image_bytes: self.max_image_bytes,
        }
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_value<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
