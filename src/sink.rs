use crate::event::LogEvent;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous consumer of [`LogEvent`]s handed off by the
/// [`SnapshotLayer`](crate::layer::SnapshotLayer).
///
/// Every event reaching a sink has been prepared on its originating thread,
/// so thread name, message, nested and mapped context are already fixed
/// and safe to read from the background task.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Consume a single event.
    ///
    /// **Returns**
    /// - `Ok(())` if the event was accepted.
    /// - `Err(..)` if the consumer failed. The layer treats this as a
    ///   transient failure and retries the batch with backoff.
    async fn send(&self, event: &LogEvent) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered events. Called once the layer's channel closes.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
