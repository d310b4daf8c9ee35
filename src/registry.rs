//! Resolution of external level types by name.
//!
//! A level written with a type name is rebuilt on the reading side by a
//! factory that maps a priority to a [`Level`]. Factories are registered up
//! front in a [`LevelRegistry`]; decoders look them up through the
//! [`LevelResolver`] trait, usually behind a [`CachingResolver`].

use crate::error::LevelResolveError;
use crate::level::Level;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

/// Builds a level of one external type from its integer priority.
pub type LevelFactory = Arc<dyn Fn(i32) -> Result<Level, LevelResolveError> + Send + Sync>;

/// Source of level factories keyed by type name.
pub trait LevelResolver: Send + Sync {
    /// Resolve `type_name` to a factory.
    ///
    /// **Returns**
    /// - `Err(UnknownType)` if no such type is known.
    /// - `Err(MissingFactory)` if the type is known but cannot be built
    ///   from a priority.
    fn resolve(&self, type_name: &str) -> Result<LevelFactory, LevelResolveError>;
}

/// Typed registry of external level types.
#[derive(Default)]
pub struct LevelRegistry {
    types: RwLock<HashMap<String, Option<LevelFactory>>>,
}

impl LevelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry consulted by the default codec.
    pub fn global() -> &'static LevelRegistry {
        static GLOBAL: OnceLock<LevelRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LevelRegistry::new)
    }

    /// Register `type_name` with a from-priority factory, replacing any
    /// previous registration.
    ///
    /// A [`CachingResolver`] keeps the first factory it resolved for a type.
    /// The default codec reads the global registry through one such cache, so
    /// re-registering a type it has already decoded has no effect there.
    pub fn register<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(i32) -> Result<Level, LevelResolveError> + Send + Sync + 'static,
    {
        self.types
            .write()
            .insert(type_name.into(), Some(Arc::new(factory)));
    }

    /// Record that `type_name` exists but has no from-priority factory.
    ///
    /// Levels of such a type decode to the nearest built-in level.
    pub fn register_without_factory(&self, type_name: impl Into<String>) {
        self.types.write().insert(type_name.into(), None);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.read().contains_key(type_name)
    }
}

impl LevelResolver for LevelRegistry {
    fn resolve(&self, type_name: &str) -> Result<LevelFactory, LevelResolveError> {
        match self.types.read().get(type_name) {
            Some(Some(factory)) => Ok(Arc::clone(factory)),
            Some(None) => Err(LevelResolveError::MissingFactory(type_name.to_string())),
            None => Err(LevelResolveError::UnknownType(type_name.to_string())),
        }
    }
}

impl LevelResolver for &'static LevelRegistry {
    fn resolve(&self, type_name: &str) -> Result<LevelFactory, LevelResolveError> {
        (**self).resolve(type_name)
    }
}

/// Wraps a resolver and remembers every successfully resolved factory.
///
/// Failed resolutions are not cached, so a type registered later is still
/// picked up.
pub struct CachingResolver<R> {
    inner: R,
    cache: RwLock<HashMap<String, LevelFactory>>,
}

impl<R: LevelResolver> CachingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

impl<R: LevelResolver> LevelResolver for CachingResolver<R> {
    fn resolve(&self, type_name: &str) -> Result<LevelFactory, LevelResolveError> {
        if let Some(factory) = self.cache.read().get(type_name) {
            return Ok(Arc::clone(factory));
        }

        let factory = self.inner.resolve(type_name)?;
        self.cache
            .write()
            .insert(type_name.to_string(), Arc::clone(&factory));
        Ok(factory)
    }
}

/// Rebuild a level from its wire form.
///
/// Built-ins (`type_name == None`) resolve to the built-in with the given
/// priority. Named types go through `resolver`; any failure, a panicking
/// factory included, falls back to [`Level::nearest_builtin`] with a warning
/// rather than an error.
pub fn resolve_level(resolver: &dyn LevelResolver, priority: i32, type_name: Option<&str>) -> Level {
    let Some(type_name) = type_name else {
        return Level::nearest_builtin(priority);
    };

    let rebuilt = resolver.resolve(type_name).and_then(|factory| {
        panic::catch_unwind(AssertUnwindSafe(|| factory(priority))).unwrap_or_else(|_| {
            Err(LevelResolveError::FactoryFailed {
                type_name: type_name.to_string(),
                reason: "factory panicked".to_string(),
            })
        })
    });

    match rebuilt {
        Ok(level) => level,
        Err(e) => {
            let fallback = Level::nearest_builtin(priority);
            tracing::warn!(
                type_name,
                priority,
                fallback = %fallback,
                error = %e,
                "could not rebuild level, falling back to built-in"
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn notice_factory(priority: i32) -> Result<Level, LevelResolveError> {
        Ok(Level::custom("acme::Notice", priority, "NOTICE", 5))
    }

    #[test]
    fn resolves_registered_factory() {
        let registry = LevelRegistry::new();
        registry.register("acme::Notice", notice_factory);

        let level = resolve_level(&registry, 25_000, Some("acme::Notice"));
        assert_eq!(level, Level::custom("acme::Notice", 25_000, "NOTICE", 5));
    }

    #[test]
    fn unknown_type_falls_back_to_builtin() {
        let registry = LevelRegistry::new();
        assert_eq!(
            resolve_level(&registry, Level::WARN_INT, Some("gone::Level")),
            Level::WARN
        );
    }

    #[test]
    fn missing_factory_and_failing_factory_fall_back() {
        let registry = LevelRegistry::new();
        registry.register_without_factory("acme::Opaque");
        registry.register("acme::Broken", |p| {
            Err(LevelResolveError::FactoryFailed {
                type_name: "acme::Broken".into(),
                reason: format!("refused {p}"),
            })
        });

        assert!(matches!(
            registry.resolve("acme::Opaque"),
            Err(LevelResolveError::MissingFactory(_))
        ));
        assert_eq!(resolve_level(&registry, Level::ERROR_INT, Some("acme::Opaque")), Level::ERROR);
        assert_eq!(resolve_level(&registry, Level::DEBUG_INT, Some("acme::Broken")), Level::DEBUG);
    }

    #[test]
    fn panicking_factory_falls_back() {
        let registry = LevelRegistry::new();
        registry.register("acme::Panics", |_| panic!("factory blew up"));

        assert_eq!(resolve_level(&registry, Level::WARN_INT, Some("acme::Panics")), Level::WARN);
        assert_eq!(resolve_level(&registry, 25_000, Some("acme::Panics")), Level::INFO);
    }

    #[test]
    fn cached_factory_outlives_reregistration() {
        let registry: &'static LevelRegistry = Box::leak(Box::new(LevelRegistry::new()));
        registry.register("acme::Notice", notice_factory);
        let resolver = CachingResolver::new(registry);
        assert_eq!(resolve_level(&resolver, 25_000, Some("acme::Notice")).name(), "NOTICE");

        registry.register("acme::Notice", |p| Ok(Level::custom("acme::Notice", p, "RENAMED", 5)));
        assert_eq!(resolve_level(&resolver, 25_000, Some("acme::Notice")).name(), "NOTICE");
        assert_eq!(resolve_level(registry, 25_000, Some("acme::Notice")).name(), "RENAMED");
    }

    #[test]
    fn caching_resolver_resolves_each_type_once() {
        struct Counting(AtomicUsize);
        impl LevelResolver for Counting {
            fn resolve(&self, _type_name: &str) -> Result<LevelFactory, LevelResolveError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(notice_factory))
            }
        }

        let resolver = CachingResolver::new(Counting(AtomicUsize::new(0)));
        for _ in 0..3 {
            resolver.resolve("acme::Notice").unwrap();
        }
        assert_eq!(resolver.inner.0.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached_len(), 1);
    }
}
