use std::any::Any;
use std::fmt::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Any value that can stand in for a log message.
///
/// Implemented for every `Display + Send + Sync + 'static` type.
pub trait MessageObject: fmt::Display + Send + Sync + 'static {
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: fmt::Display + Send + Sync + 'static> MessageObject for T {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Renders message objects that have a dedicated renderer registered.
///
/// Exposed by a [`Logger`](crate::logger::Logger) whose repository
/// supports object rendering.
pub trait ObjectRenderer: Send + Sync {
    fn find_and_render(&self, message: &dyn MessageObject) -> String;
}

/// Message exactly as the application supplied it.
///
/// Lives only in the originating process; the wire format carries the
/// rendered string instead.
#[derive(Clone)]
pub enum RawMessage {
    Text(String),
    Object(Arc<dyn MessageObject>),
}

impl RawMessage {
    pub fn object<T: MessageObject>(value: T) -> Self {
        RawMessage::Object(Arc::new(value))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawMessage::Text(s) => Some(s),
            RawMessage::Object(_) => None,
        }
    }

    /// Render to a string, never panicking.
    ///
    /// Text is returned verbatim. Objects go through `renderer` when one is
    /// given and through `Display` otherwise. A renderer or `Display` impl
    /// that panics or reports an error yields a placeholder naming the
    /// message type.
    pub fn render(&self, renderer: Option<&dyn ObjectRenderer>) -> String {
        let obj = match self {
            RawMessage::Text(s) => return s.clone(),
            RawMessage::Object(obj) => obj.as_ref(),
        };

        let rendered = panic::catch_unwind(AssertUnwindSafe(|| match renderer {
            Some(renderer) => Ok(renderer.find_and_render(obj)),
            None => {
                let mut out = String::new();
                write!(out, "{obj}").map(|_| out)
            }
        }));

        match rendered {
            Ok(Ok(s)) => s,
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(message_type = obj.type_name(), "message rendering failed");
                format!("[{}: message rendering failed]", obj.type_name())
            }
        }
    }
}

impl fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawMessage::Text(s) => f.debug_tuple("Text").field(s).finish(),
            RawMessage::Object(obj) => f.debug_tuple("Object").field(&obj.type_name()).finish(),
        }
    }
}

impl From<&str> for RawMessage {
    fn from(s: &str) -> Self {
        RawMessage::Text(s.to_string())
    }
}

impl From<String> for RawMessage {
    fn from(s: String) -> Self {
        RawMessage::Text(s)
    }
}
