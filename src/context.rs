//! Diagnostic context accessors.
//!
//! Two thread-scoped stores feed every event: the nested diagnostic context
//! ([`Ndc`], a stack of strings rendered as one line) and the mapped
//! diagnostic context ([`Mdc`], key/value properties). Events do not read
//! the stores directly. They go through a [`DiagnosticContext`], which is
//! [`ThreadContext`] by default and can be replaced by an explicit
//! [`ContextSnapshot`].

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Mapped diagnostic context properties.
pub type ContextMap = BTreeMap<String, Value>;

/// Read access to the diagnostic context of the calling thread.
pub trait DiagnosticContext: Send + Sync {
    /// Nested context rendered as a single string, `None` if empty.
    fn nested(&self) -> Option<String>;

    /// Independent copy of the mapped context, `None` if empty or absent.
    fn mapped(&self) -> Option<ContextMap>;

    /// Single mapped context value.
    fn mapped_value(&self, key: &str) -> Option<Value>;
}

thread_local! {
    static NDC_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static MDC_MAP: RefCell<Option<ContextMap>> = const { RefCell::new(None) };
}

/// Nested diagnostic context of the current thread.
pub struct Ndc;

impl Ndc {
    pub fn push(message: impl Into<String>) {
        NDC_STACK.with(|s| s.borrow_mut().push(message.into()));
    }

    pub fn pop() -> Option<String> {
        NDC_STACK.with(|s| s.borrow_mut().pop())
    }

    pub fn peek() -> Option<String> {
        NDC_STACK.with(|s| s.borrow().last().cloned())
    }

    pub fn depth() -> usize {
        NDC_STACK.with(|s| s.borrow().len())
    }

    pub fn clear() {
        NDC_STACK.with(|s| s.borrow_mut().clear());
    }

    /// Whole stack joined with single spaces, outermost first.
    pub fn get() -> Option<String> {
        NDC_STACK.with(|s| {
            let stack = s.borrow();
            if stack.is_empty() {
                None
            } else {
                Some(stack.join(" "))
            }
        })
    }
}

/// Mapped diagnostic context of the current thread.
pub struct Mdc;

impl Mdc {
    pub fn put(key: impl Into<String>, value: impl Into<Value>) {
        MDC_MAP.with(|m| {
            m.borrow_mut()
                .get_or_insert_with(ContextMap::new)
                .insert(key.into(), value.into());
        });
    }

    pub fn get(key: &str) -> Option<Value> {
        MDC_MAP.with(|m| m.borrow().as_ref().and_then(|map| map.get(key).cloned()))
    }

    pub fn remove(key: &str) -> Option<Value> {
        MDC_MAP.with(|m| m.borrow_mut().as_mut().and_then(|map| map.remove(key)))
    }

    /// Drop the whole store, so that it reads as absent.
    pub fn clear() {
        MDC_MAP.with(|m| *m.borrow_mut() = None);
    }

    /// Copy of the current store.
    pub fn context() -> Option<ContextMap> {
        MDC_MAP.with(|m| m.borrow().clone())
    }
}

/// Reads the thread-scoped [`Ndc`] and [`Mdc`] of whichever thread calls it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadContext;

impl DiagnosticContext for ThreadContext {
    fn nested(&self) -> Option<String> {
        Ndc::get()
    }

    fn mapped(&self) -> Option<ContextMap> {
        Mdc::context().filter(|map| !map.is_empty())
    }

    fn mapped_value(&self, key: &str) -> Option<Value> {
        Mdc::get(key)
    }
}

/// Diagnostic context fixed at construction time.
///
/// Passing one of these to
/// [`LogEvent::with_context`](crate::event::LogEvent::with_context) makes
/// the event independent of any thread-local state.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub nested: Option<String>,
    pub mapped: Option<ContextMap>,
}

impl ContextSnapshot {
    /// Snapshot the calling thread's stores.
    pub fn current() -> Self {
        Self {
            nested: ThreadContext.nested(),
            mapped: ThreadContext.mapped(),
        }
    }
}

impl DiagnosticContext for ContextSnapshot {
    fn nested(&self) -> Option<String> {
        self.nested.clone()
    }

    fn mapped(&self) -> Option<ContextMap> {
        self.mapped.clone().filter(|map| !map.is_empty())
    }

    fn mapped_value(&self, key: &str) -> Option<Value> {
        self.mapped.as_ref().and_then(|map| map.get(key).cloned())
    }
}
