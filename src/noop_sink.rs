use crate::event::LogEvent;
use crate::sink::EventSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all events.
///
/// Useful for measuring the cost of snapshotting and handoff without any
/// consumer work.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn send(&self, _event: &LogEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
