//! Immutable snapshots of logging calls and their binary wire format.
//!
//! A [`LogEvent`] is created at the call site with only its cheap fields
//! filled in. Everything tied to the calling thread (thread name, nested and
//! mapped diagnostic context, rendered message, call-site location) is
//! captured on first access and never recaptured. Before an event leaves
//! its thread, [`LogEvent::prepare_for_deferred_processing`] forces those
//! captures; [`EventCodec`] does so itself before writing.
//!
//! ```
//! use std::sync::Arc;
//! use log_event_snapshot::{EventCodec, Level, LogEvent, Logger, NamedLogger, Producer};
//!
//! let root: Arc<dyn Logger> = Arc::new(NamedLogger::root());
//! let event = LogEvent::new(None, Some(root), Level::INFO, Some("Hello, world.".into()), None);
//!
//! let codec = EventCodec::new(Producer::Current);
//! let bytes = codec.encode(&event).unwrap();
//! let decoded = codec.decode(&bytes).unwrap();
//! assert_eq!(decoded.rendered_message(), Some("Hello, world."));
//! ```

pub mod codec;
pub mod context;
pub mod error;
pub mod event;
pub mod level;
pub mod location;
pub mod logger;
pub mod message;
pub mod registry;
pub mod throwable;

#[cfg(feature = "bridge")]
pub mod layer;
#[cfg(feature = "bridge")]
pub mod sink;
#[cfg(feature = "bridge")]
pub mod init;
#[cfg(feature = "bridge")]
pub mod noop_sink;

pub mod env;

pub use codec::{substitute_producer, EventCodec, Producer};
pub use context::{ContextMap, ContextSnapshot, DiagnosticContext, Mdc, Ndc, ThreadContext};
pub use error::{LevelResolveError, WireError};
pub use event::{EventParts, LogEvent};
pub use level::Level;
pub use location::LocationInfo;
pub use logger::{Logger, NamedLogger};
pub use message::{MessageObject, ObjectRenderer, RawMessage};
pub use registry::{CachingResolver, LevelRegistry, LevelResolver};
pub use throwable::ThrowableInfo;
