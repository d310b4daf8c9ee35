use crate::context::{ContextMap, DiagnosticContext, ThreadContext};
use crate::level::Level;
use crate::location::LocationInfo;
use crate::logger::Logger;
use crate::message::RawMessage;
use crate::throwable::ThrowableInfo;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock};

static START_TIME: OnceLock<i64> = OnceLock::new();

/// Snapshot of a single logging request.
///
/// Only the timestamp, level, logger name and failure text are fixed at
/// construction. Rendered message, thread name, nested and mapped context
/// and call-site location are captured on first access and cached; a set
/// slot never changes afterwards. Capturing happens on whichever thread
/// asks first, so call [`prepare_for_deferred_processing`] on the
/// originating thread before handing the event to anybody else.
///
/// [`prepare_for_deferred_processing`]: LogEvent::prepare_for_deferred_processing
#[derive(Clone)]
pub struct LogEvent {
    fqn_of_category_class: Option<String>,
    logger: Option<Arc<dyn Logger>>,
    logger_name: Option<String>,
    level: Level,
    timestamp: i64,
    message: Option<RawMessage>,
    throwable: Option<ThrowableInfo>,
    context: Arc<dyn DiagnosticContext>,

    rendered_message: OnceLock<Option<String>>,
    thread_name: OnceLock<String>,
    ndc: OnceLock<Option<String>>,
    mdc: OnceLock<Option<ContextMap>>,
    location: OnceLock<LocationInfo>,
}

/// Fully populated field set for rebuilding an event from another
/// representation.
pub struct EventParts {
    pub fqn_of_category_class: Option<String>,
    pub logger: Option<Arc<dyn Logger>>,
    pub logger_name: Option<String>,
    pub timestamp: i64,
    pub level: Level,
    pub message: Option<RawMessage>,
    /// `None` leaves the thread name to be looked up on first access.
    pub thread_name: Option<String>,
    pub throwable: Option<ThrowableInfo>,
    pub ndc: Option<String>,
    /// `None` becomes the unknown location; the stack is never walked.
    pub location: Option<LocationInfo>,
    /// `None` means no mapped context was captured.
    pub properties: Option<ContextMap>,
}

impl LogEvent {
    /// Create an event stamped with the current time.
    ///
    /// **Parameters**
    /// - `fqn_of_category_class`: path of the logging wrapper, bounds the
    ///   stack walk that finds the call site.
    /// - `logger`: issuing logger, `None` for anonymous events.
    /// - `failure`: rendered to [`ThrowableInfo`] immediately.
    pub fn new(
        fqn_of_category_class: Option<&str>,
        logger: Option<Arc<dyn Logger>>,
        level: Level,
        message: Option<RawMessage>,
        failure: Option<&(dyn Error + 'static)>,
    ) -> Self {
        Self::with_timestamp(
            fqn_of_category_class,
            logger,
            Utc::now().timestamp_millis(),
            level,
            message,
            failure,
        )
    }

    /// Create an event with an explicit epoch-millisecond timestamp.
    pub fn with_timestamp(
        fqn_of_category_class: Option<&str>,
        logger: Option<Arc<dyn Logger>>,
        timestamp: i64,
        level: Level,
        message: Option<RawMessage>,
        failure: Option<&(dyn Error + 'static)>,
    ) -> Self {
        Self::start_time();
        let logger_name = logger.as_ref().map(|l| l.name().to_string());

        Self {
            fqn_of_category_class: fqn_of_category_class.map(str::to_string),
            logger,
            logger_name,
            level,
            timestamp,
            message,
            throwable: failure.map(ThrowableInfo::from_error),
            context: Arc::new(ThreadContext),
            rendered_message: OnceLock::new(),
            thread_name: OnceLock::new(),
            ndc: OnceLock::new(),
            mdc: OnceLock::new(),
            location: OnceLock::new(),
        }
    }

    /// Rebuild an event whose context has already been captured elsewhere.
    ///
    /// Nested context, mapped context and location count as looked up; no
    /// thread-local store is read and no stack is walked for this event.
    pub fn from_parts(parts: EventParts) -> Self {
        Self::start_time();
        let logger_name = parts
            .logger_name
            .or_else(|| parts.logger.as_ref().map(|l| l.name().to_string()));

        let thread_name = OnceLock::new();
        if let Some(name) = parts.thread_name {
            let _ = thread_name.set(name);
        }

        Self {
            fqn_of_category_class: parts.fqn_of_category_class,
            logger: parts.logger,
            logger_name,
            level: parts.level,
            timestamp: parts.timestamp,
            message: parts.message,
            throwable: parts.throwable,
            context: Arc::new(ThreadContext),
            rendered_message: OnceLock::new(),
            thread_name,
            ndc: OnceLock::from(parts.ndc),
            mdc: OnceLock::from(parts.properties),
            location: OnceLock::from(parts.location.unwrap_or_default()),
        }
    }

    /// Read diagnostic context through `context` instead of the calling
    /// thread's stores.
    pub fn with_context(mut self, context: Arc<dyn DiagnosticContext>) -> Self {
        self.context = context;
        self
    }

    pub(crate) fn with_rendered_message(self, rendered: Option<String>) -> Self {
        let _ = self.rendered_message.set(rendered);
        self
    }

    /// Epoch milliseconds of the first event created in this process.
    pub fn start_time() -> i64 {
        *START_TIME.get_or_init(|| Utc::now().timestamp_millis())
    }

    pub fn fqn_of_category_class(&self) -> Option<&str> {
        self.fqn_of_category_class.as_deref()
    }

    pub fn logger_name(&self) -> Option<&str> {
        self.logger_name.as_deref()
    }

    /// The issuing logger. Never present on a decoded event.
    pub fn logger(&self) -> Option<&Arc<dyn Logger>> {
        self.logger.as_ref()
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Replace the level after construction.
    ///
    /// Kept only for callers that relied on the level being writable; the
    /// rest of the event is immutable.
    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
    }

    /// The message as supplied. Never present on a decoded event.
    pub fn raw_message(&self) -> Option<&RawMessage> {
        self.message.as_ref()
    }

    /// String form of the message, rendered once.
    pub fn rendered_message(&self) -> Option<&str> {
        self.rendered_message
            .get_or_init(|| {
                let renderer = self.logger.as_deref().and_then(|l| l.renderer());
                self.message.as_ref().map(|m| m.render(renderer))
            })
            .as_deref()
    }

    /// Name of the originating thread, looked up once.
    pub fn thread_name(&self) -> &str {
        self.thread_name.get_or_init(|| {
            let current = std::thread::current();
            match current.name() {
                Some(name) => name.to_string(),
                None => format!("{:?}", current.id()),
            }
        })
    }

    /// Nested diagnostic context, looked up once.
    pub fn ndc(&self) -> Option<&str> {
        self.ndc.get_or_init(|| self.context.nested()).as_deref()
    }

    /// Mapped context value for `key`.
    ///
    /// The captured copy is searched first; when it has no such key, or
    /// nothing has been captured yet, the live context is consulted.
    pub fn mdc(&self, key: &str) -> Option<Value> {
        if let Some(Some(copy)) = self.mdc.get() {
            if let Some(value) = copy.get(key) {
                return Some(value.clone());
            }
        }
        self.context.mapped_value(key)
    }

    /// Capture a copy of the mapped context, once.
    pub fn capture_mdc(&self) -> Option<&ContextMap> {
        self.mdc.get_or_init(|| self.context.mapped()).as_ref()
    }

    /// All mapped context properties, capturing them if needed.
    pub fn properties(&self) -> ContextMap {
        self.capture_mdc().cloned().unwrap_or_default()
    }

    pub fn property_keys(&self) -> BTreeSet<String> {
        self.properties().into_keys().collect()
    }

    /// String form of a mapped context value.
    pub fn property(&self, key: &str) -> Option<String> {
        self.mdc(key).map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Set a property on this event's copy of the mapped context.
    ///
    /// The live context is captured first if that has not happened yet.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let mut copy = self.take_mdc_copy();
        copy.insert(key.into(), value.into());
        self.mdc = OnceLock::from(Some(copy));
    }

    /// Remove a property from this event's copy of the mapped context.
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        let mut copy = self.take_mdc_copy();
        let removed = copy.remove(key);
        self.mdc = OnceLock::from(Some(copy));
        removed
    }

    fn take_mdc_copy(&mut self) -> ContextMap {
        let captured = match self.mdc.take() {
            Some(copy) => copy,
            None => self.context.mapped(),
        };
        captured.unwrap_or_default()
    }

    /// Call site of the logging request, found once by walking the stack.
    pub fn location_information(&self) -> &LocationInfo {
        self.location
            .get_or_init(|| LocationInfo::capture(self.fqn_of_category_class.as_deref()))
    }

    /// Whether the location has already been determined.
    pub fn has_location_information(&self) -> bool {
        self.location.get().is_some()
    }

    pub fn throwable_information(&self) -> Option<&ThrowableInfo> {
        self.throwable.as_ref()
    }

    pub fn throwable_str_rep(&self) -> Option<&[String]> {
        self.throwable.as_ref().map(ThrowableInfo::throwable_str_rep)
    }

    /// Capture everything that depends on the originating thread.
    ///
    /// Must run on the thread that created the event before the event is
    /// handed to another thread or encoded. Location is left alone; it is
    /// costly and only captured when somebody asks for it.
    pub fn prepare_for_deferred_processing(&self) {
        self.thread_name();
        self.rendered_message();
        self.ndc();
        self.capture_mdc();
    }
}

impl fmt::Debug for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEvent")
            .field("fqn_of_category_class", &self.fqn_of_category_class)
            .field("logger_name", &self.logger_name)
            .field("level", &self.level)
            .field("timestamp", &self.timestamp)
            .field("message", &self.message)
            .field("rendered_message", &self.rendered_message.get())
            .field("thread_name", &self.thread_name.get())
            .field("ndc", &self.ndc.get())
            .field("mdc", &self.mdc.get())
            .field("location", &self.location.get())
            .field("throwable", &self.throwable)
            .finish()
    }
}
