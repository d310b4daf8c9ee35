use crate::context::{ContextMap, DiagnosticContext, ThreadContext};
use crate::event::{EventParts, LogEvent};
use crate::level::Level;
use crate::location::{LocationInfo, NA};
use crate::message::RawMessage;
use crate::sink::EventSink;
use chrono::Utc;
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const MAX_SEND_ATTEMPTS: u32 = 8;

/// `tracing_subscriber` layer that snapshots events into [`LogEvent`]s and
/// hands them to an asynchronous [`EventSink`] via a bounded channel and
/// background task.
///
/// Each snapshot is prepared on the thread that emitted it: the thread
/// name, the message, the nested context (thread [`Ndc`] followed by the
/// names of the enclosing spans) and the mapped context (thread [`Mdc`]
/// overlaid with the event's fields) are fixed before the event leaves
/// that thread.
///
/// [`Ndc`]: crate::context::Ndc
/// [`Mdc`]: crate::context::Mdc
pub struct SnapshotLayer {
    sender: mpsc::Sender<LogEvent>,
    max_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_events: Arc<AtomicU64>,
}

impl SnapshotLayer {
    /// Create a new layer and spawn a background task that pulls
    /// [`LogEvent`]s from a bounded channel and sends them to the provided
    /// [`EventSink`].
    ///
    /// Minimal thresholds are enforced for `buffer`, `batch_size` and
    /// `flush_interval` to avoid degenerate configurations. Must be called
    /// from within a Tokio runtime.
    pub fn new(
        sink: Arc<dyn EventSink>,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<LogEvent>(buffer);

        let total_events = Arc::new(AtomicU64::new(0));
        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            let backoff = Duration::from_millis(100);
            let max_backoff = Duration::from_secs(10);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(event) => {
                            batch.push(event);
                            if batch.len() >= batch_size {
                                if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                                    eprintln!("error sending event batch: {}", e);
                                }
                            }
                        }
                        None => {
                            if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                                eprintln!("error sending final event batch: {}", e);
                            }
                            if let Err(e) = sink.flush().await {
                                eprintln!("error flushing event sink: {}", e);
                            }
                            break;
                        }
                    },
                    _ = sleep(flush_interval) => {
                        if !batch.is_empty() {
                            if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff).await {
                                eprintln!("error flushing event batch: {}", e);
                            }
                        }
                    }
                }
            }
        });

        (Self {
            sender: tx,
            max_level: Level::INFO,
            total_events,
            enqueued_events,
            dropped_events,
        }, handle)
    }

    /// Only snapshot events at least as severe as `level`.
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    fn snapshot<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> LogEvent
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let meta = event.metadata();

        let mut properties = ThreadContext.mapped().unwrap_or_default();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor { fields: &mut properties, message: &mut message };
        event.record(&mut visitor);

        let spans = ctx
            .event_scope(event)
            .map(|scope| scope.from_root().map(|span| span.name()).collect::<Vec<_>>())
            .unwrap_or_default();
        let ndc: Vec<String> = ThreadContext
            .nested()
            .into_iter()
            .chain(spans.into_iter().map(str::to_string))
            .collect();

        let file = meta
            .file()
            .and_then(|f| Path::new(f).file_name())
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| NA.to_string());
        let location = LocationInfo::new(
            meta.module_path().unwrap_or(NA),
            NA,
            file,
            meta.line().map(|l| l.to_string()).unwrap_or_else(|| NA.to_string()),
        );

        LogEvent::from_parts(EventParts {
            fqn_of_category_class: None,
            logger: None,
            logger_name: Some(meta.target().to_string()),
            timestamp: Utc::now().timestamp_millis(),
            level: Level::from(meta.level()),
            message: message.map(RawMessage::Text),
            thread_name: None,
            throwable: None,
            ndc: if ndc.is_empty() { None } else { Some(ndc.join(" ")) },
            location: Some(location),
            properties: if properties.is_empty() { None } else { Some(properties) },
        })
    }
}

async fn send_batch(
    sink: &dyn EventSink,
    batch: &mut Vec<LogEvent>,
    mut backoff: Duration,
    max_backoff: Duration,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut sent = 0;
    for attempt in 1..=MAX_SEND_ATTEMPTS {
        let mut last_err: Option<Box<dyn Error + Send + Sync>> = None;
        for event in &batch[sent..] {
            if let Err(e) = sink.send(event).await {
                last_err = Some(e);
                break;
            }
            sent += 1;
        }

        let Some(err) = last_err else {
            batch.clear();
            return Ok(());
        };

        if attempt == MAX_SEND_ATTEMPTS {
            let lost = batch.len() - sent;
            batch.clear();
            return Err(format!("giving up on {} events: {}", lost, err).into());
        }

        eprintln!("event sink send failed, retrying in {:?}", backoff);
        sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, max_backoff);
    }

    Ok(())
}

impl<S> Layer<S> for SnapshotLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if !Level::from(event.metadata().level()).is_greater_or_equal(&self.max_level) {
            return;
        }

        let snapshot = self.snapshot(event, &ctx);
        snapshot.prepare_for_deferred_processing();

        match self.sender.try_send(snapshot) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_e) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("event channel full, dropping log event");
            }
        }
    }
}

/// Collects a `tracing` event's fields into mapped context properties,
/// keeping the `message` field apart.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut ContextMap,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
