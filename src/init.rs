use crate::env::{
    env_or, env_parse, LOG_EVENT_BATCH_SIZE_ENV, LOG_EVENT_CHANNEL_BUFFER_ENV,
    LOG_EVENT_FLUSH_MS_ENV, LOG_EVENT_MAX_LEVEL_ENV, LOG_EVENT_STDOUT_ENV,
};
use crate::layer::SnapshotLayer;
use crate::level::Level;
use crate::sink::EventSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the snapshot layer.
///
/// **Fields**
/// - `channel_buffer`: maximum number of prepared events waiting for the
///   sink before new ones are dropped.
/// - `batch_size`: number of events handed to the sink per batch.
/// - `flush_interval`: maximum delay before a partial batch is sent.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed next to the snapshot layer.
/// - `max_level`: least severe level that gets snapshotted.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub enable_stdout: bool,
    pub max_level: Level,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            enable_stdout: true,
            max_level: Level::INFO,
        }
    }
}

impl LayerConfig {
    /// Build a config from `LOG_EVENT_*` environment variables, using the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_level = Level::from_name(&env_or(LOG_EVENT_MAX_LEVEL_ENV, defaults.max_level.name()))
            .unwrap_or(defaults.max_level);

        Self {
            channel_buffer: env_parse(LOG_EVENT_CHANNEL_BUFFER_ENV, defaults.channel_buffer),
            batch_size: env_parse(LOG_EVENT_BATCH_SIZE_ENV, defaults.batch_size),
            flush_interval: Duration::from_millis(env_parse(
                LOG_EVENT_FLUSH_MS_ENV,
                defaults.flush_interval.as_millis() as u64,
            )),
            enable_stdout: env_parse(LOG_EVENT_STDOUT_ENV, defaults.enable_stdout),
            max_level,
        }
    }
}

/// Error returned when the global subscriber cannot be installed.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already set")]
    AlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global `tracing` subscriber with a [`SnapshotLayer`]
/// feeding `sink`.
///
/// **Returns**
/// - the handle of the background task that drives the sink.
///
/// Must be called from within a Tokio runtime.
pub fn init_tracing_with_config(
    sink: Arc<dyn EventSink>,
    config: LayerConfig,
) -> Result<JoinHandle<()>, InitError> {
    let (layer, handle) = SnapshotLayer::new(
        sink,
        config.channel_buffer,
        config.batch_size,
        config.flush_interval,
    );
    let layer = layer.with_max_level(config.max_level);

    // The two subscriber shapes differ in type, so each branch installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(handle)
}

/// Initialize tracing with [`LayerConfig::from_env`].
pub fn init_tracing(sink: Arc<dyn EventSink>) -> Result<JoinHandle<()>, InitError> {
    init_tracing_with_config(sink, LayerConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = LayerConfig::default();
        assert_eq!(config.channel_buffer, 1024);
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.max_level, Level::INFO);
        assert!(config.enable_stdout);
    }
}
