/// Error type returned when reading or writing the binary event format.
///
/// Only structural problems surface here. Degradations the protocol
/// tolerates (an unresolvable level type, a message that fails to render)
/// are handled inside the codec and never reach the caller.
#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic {0:#06x}, not an encoded log event")]
    BadMagic(u16),

    #[error("producer mismatch: expected {expected:?}, found {found:?}")]
    ProducerMismatch { expected: String, found: String },

    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u16),

    #[error("stream uid mismatch: {0}")]
    StreamUidMismatch(i64),

    #[error("invalid utf-8 in string field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("length {0} exceeds the allowed maximum")]
    InvalidLength(i64),

    #[error("invalid marker byte {0}")]
    InvalidMarker(u8),

    #[error("invalid context value: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error type returned when a level type name cannot be turned into a level.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelResolveError {
    #[error("unknown level type {0:?}")]
    UnknownType(String),

    #[error("level type {0:?} has no from-priority factory")]
    MissingFactory(String),

    #[error("level factory for {type_name:?} failed: {reason}")]
    FactoryFailed { type_name: String, reason: String },
}
