use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// Severity of a [`LogEvent`](crate::event::LogEvent).
///
/// A level is an integer priority plus a display name. Built-in levels have
/// no `type_name`; levels defined outside this crate carry the name of the
/// type that knows how to rebuild them from a priority, which is what the
/// wire codec writes after the priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Level {
    priority: i32,
    name: Cow<'static, str>,
    syslog_equivalent: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    type_name: Option<Cow<'static, str>>,
}

impl Level {
    pub const OFF_INT: i32 = i32::MAX;
    pub const FATAL_INT: i32 = 50_000;
    pub const ERROR_INT: i32 = 40_000;
    pub const WARN_INT: i32 = 30_000;
    pub const INFO_INT: i32 = 20_000;
    pub const DEBUG_INT: i32 = 10_000;
    pub const TRACE_INT: i32 = 5_000;
    pub const ALL_INT: i32 = i32::MIN;

    pub const OFF: Level = Level::builtin(Self::OFF_INT, "OFF", 0);
    pub const FATAL: Level = Level::builtin(Self::FATAL_INT, "FATAL", 0);
    pub const ERROR: Level = Level::builtin(Self::ERROR_INT, "ERROR", 3);
    pub const WARN: Level = Level::builtin(Self::WARN_INT, "WARN", 4);
    pub const INFO: Level = Level::builtin(Self::INFO_INT, "INFO", 6);
    pub const DEBUG: Level = Level::builtin(Self::DEBUG_INT, "DEBUG", 7);
    pub const TRACE: Level = Level::builtin(Self::TRACE_INT, "TRACE", 7);
    pub const ALL: Level = Level::builtin(Self::ALL_INT, "ALL", 7);

    /// Built-in levels ordered from highest to lowest priority.
    pub const BUILTIN: [Level; 8] = [
        Level::OFF,
        Level::FATAL,
        Level::ERROR,
        Level::WARN,
        Level::INFO,
        Level::DEBUG,
        Level::TRACE,
        Level::ALL,
    ];

    const fn builtin(priority: i32, name: &'static str, syslog_equivalent: i32) -> Self {
        Level {
            priority,
            name: Cow::Borrowed(name),
            syslog_equivalent,
            type_name: None,
        }
    }

    /// Create a level owned by an external type.
    ///
    /// `type_name` is what the decoder hands to the
    /// [`LevelResolver`](crate::registry::LevelResolver) to rebuild this
    /// level on the reading side.
    pub fn custom(
        type_name: impl Into<Cow<'static, str>>,
        priority: i32,
        name: impl Into<Cow<'static, str>>,
        syslog_equivalent: i32,
    ) -> Self {
        Level {
            priority,
            name: name.into(),
            syslog_equivalent,
            type_name: Some(type_name.into()),
        }
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syslog_equivalent(&self) -> i32 {
        self.syslog_equivalent
    }

    /// Name of the external type this level belongs to, `None` for built-ins.
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn is_builtin(&self) -> bool {
        self.type_name.is_none()
    }

    /// Whether this level is at least as severe as `other`.
    pub fn is_greater_or_equal(&self, other: &Level) -> bool {
        self.priority >= other.priority
    }

    /// Built-in level with exactly this priority.
    pub fn builtin_for(priority: i32) -> Option<Level> {
        Self::BUILTIN.into_iter().find(|l| l.priority == priority)
    }

    /// Built-in level closest to `priority`.
    ///
    /// An exact match wins; otherwise the most severe built-in whose
    /// priority does not exceed `priority` is returned, bottoming out at
    /// [`Level::ALL`].
    pub fn nearest_builtin(priority: i32) -> Level {
        Self::BUILTIN
            .into_iter()
            .find(|l| l.priority <= priority)
            .unwrap_or(Level::ALL)
    }

    /// Look up a built-in level by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Level> {
        Self::BUILTIN
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::ERROR,
            tracing::Level::WARN => Level::WARN,
            tracing::Level::INFO => Level::INFO,
            tracing::Level::DEBUG => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
