use crate::message::ObjectRenderer;
use std::sync::Arc;

/// The logger that issued an event.
///
/// Only its name is part of the event; the logger itself never crosses a
/// boundary.
pub trait Logger: Send + Sync {
    fn name(&self) -> &str;

    /// Renderer for non-text messages, if the owning repository has one.
    fn renderer(&self) -> Option<&dyn ObjectRenderer> {
        None
    }
}

/// Logger identified by name only, optionally carrying a renderer.
#[derive(Clone)]
pub struct NamedLogger {
    name: String,
    renderer: Option<Arc<dyn ObjectRenderer>>,
}

impl NamedLogger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            renderer: None,
        }
    }

    pub fn root() -> Self {
        Self::new("root")
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ObjectRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }
}

impl Logger for NamedLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn renderer(&self) -> Option<&dyn ObjectRenderer> {
        self.renderer.as_deref()
    }
}
