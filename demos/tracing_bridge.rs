use std::sync::Arc;

use async_trait::async_trait;
use log_event_snapshot::init::{init_tracing_with_config, LayerConfig};
use log_event_snapshot::sink::EventSink;
use log_event_snapshot::{EventCodec, LogEvent, Ndc};
use tokio::time::{sleep, Duration};
use tracing::{error, info, info_span};

/// Consumer that encodes every handed-off event, as a socket writer would.
struct EncodingSink {
    codec: EventCodec,
}

#[async_trait]
impl EventSink for EncodingSink {
    async fn send(&self, event: &LogEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let bytes = self.codec.encode(event)?;
        println!(
            "[{} bytes] {} {} ndc={:?}",
            bytes.len(),
            event.level(),
            event.rendered_message().unwrap_or_default(),
            event.ndc(),
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let sink: Arc<dyn EventSink> = Arc::new(EncodingSink { codec: EventCodec::default() });
    let config = LayerConfig { enable_stdout: false, ..LayerConfig::default() };
    if let Err(e) = init_tracing_with_config(sink, config) {
        eprintln!("{}", e);
        return;
    }

    Ndc::push("demo");
    let span = info_span!("checkout");
    let _enter = span.enter();
    info!(order = 42, "order received");
    error!(order = 42, "payment declined");

    // Give background task a little time to drain the channel
    sleep(Duration::from_millis(1500)).await;
}
