//! Environment variable names used by this crate for configuring the
//! snapshot layer from services.
//!
//! These are purely helpers; the event model and codec never read the
//! environment.

use std::str::FromStr;

/// Capacity of the handoff channel.
pub const LOG_EVENT_CHANNEL_BUFFER_ENV: &str = "LOG_EVENT_CHANNEL_BUFFER";

/// Number of events passed to the sink per batch.
pub const LOG_EVENT_BATCH_SIZE_ENV: &str = "LOG_EVENT_BATCH_SIZE";

/// Maximum delay between flushes of a partial batch, in milliseconds.
pub const LOG_EVENT_FLUSH_MS_ENV: &str = "LOG_EVENT_FLUSH_MS";

/// `true`/`false`: also print events through the `fmt` layer.
pub const LOG_EVENT_STDOUT_ENV: &str = "LOG_EVENT_STDOUT";

/// Least severe level that is snapshotted, e.g. `INFO`.
pub const LOG_EVENT_MAX_LEVEL_ENV: &str = "LOG_EVENT_MAX_LEVEL";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to `default` when
/// it is unset or does not parse.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
