//! Binary encoding of [`LogEvent`]s.
//!
//! # Layout
//!
//! All integers are big endian.
//!
//! | Part      | Encoding                                                    |
//! |-----------|-------------------------------------------------------------|
//! | magic     | `u16` `0x4C45`                                              |
//! | producer  | `u16` length + producer name bytes                          |
//! | version   | `u16`                                                       |
//! | stream id | `i64`                                                       |
//! | fields    | fqn, logger name, `i64` timestamp, thread name, message, NDC |
//! | MDC       | `i32` count (`-1` = absent), key/value strings, value as JSON |
//! | failure   | `i32` count (`-1` = absent), one string per line            |
//! | location  | marker byte, then class, method, file, line strings         |
//! | level     | `i32` priority, then optional type name string              |
//!
//! Strings are a marker byte (`0` absent, `1` present), a `u32` length and
//! UTF-8 bytes.
//!
//! # Producer names
//!
//! The two [`Producer`] names have the same byte length. A stream written
//! under one name becomes a valid stream of the other by overwriting the
//! name in place ([`substitute_producer`]); no other byte moves. Keep the
//! lengths equal when touching them.

use crate::context::ContextMap;
use crate::error::WireError;
use crate::event::{EventParts, LogEvent};
use crate::level::Level;
use crate::location::LocationInfo;
use crate::registry::{resolve_level, CachingResolver, LevelRegistry, LevelResolver};
use crate::throwable::ThrowableInfo;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, OnceLock};

pub const MAGIC: u16 = 0x4C45;
pub const WIRE_VERSION: u16 = 1;
/// Identifies the field layout shared by both producers.
pub const STREAM_UID: i64 = -868_428_216_207_166_145;

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;
const NAME_OFFSET: usize = 4;
const MAX_NAME_LEN: u16 = 256;
const MAX_LEN: u32 = 64 * 1024 * 1024;
const MAX_ENTRIES: i32 = 1 << 20;

/// Self-reported identity of the component that wrote a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    Legacy,
    Current,
}

impl Producer {
    pub const LEGACY_NAME: &'static str = "logsnap.spi.LoggingEvent";
    pub const CURRENT_NAME: &'static str = "logsnap.pattern.LogEvent";

    pub fn name(self) -> &'static str {
        match self {
            Producer::Legacy => Self::LEGACY_NAME,
            Producer::Current => Self::CURRENT_NAME,
        }
    }

    pub fn from_name(name: &str) -> Option<Producer> {
        match name {
            Self::LEGACY_NAME => Some(Producer::Legacy),
            Self::CURRENT_NAME => Some(Producer::Current),
            _ => None,
        }
    }

    /// The other identity, whose name can be swapped in for this one.
    pub fn counterpart(self) -> Producer {
        match self {
            Producer::Legacy => Producer::Current,
            Producer::Current => Producer::Legacy,
        }
    }
}

const _: () = assert!(Producer::LEGACY_NAME.len() == Producer::CURRENT_NAME.len());

/// Read the producer name of an encoded event without decoding it.
pub fn peek_producer(bytes: &[u8]) -> Result<String, WireError> {
    let mut cursor = Cursor::new(bytes);
    let magic = cursor.read_u16::<BigEndian>()?;
    if magic != MAGIC {
        return Err(WireError::BadMagic(magic));
    }
    let len = cursor.read_u16::<BigEndian>()?;
    if len > MAX_NAME_LEN {
        return Err(WireError::InvalidLength(len as i64));
    }
    let mut name = vec![0u8; len as usize];
    cursor.read_exact(&mut name)?;
    Ok(String::from_utf8(name)?)
}

/// Rewrite the producer name of an encoded event from `from` to `to`.
///
/// The names have equal length, so the rewrite happens in place and the
/// rest of the stream is untouched. Fails if `bytes` was not written under
/// `from`.
pub fn substitute_producer(bytes: &mut [u8], from: Producer, to: Producer) -> Result<(), WireError> {
    let found = peek_producer(bytes)?;
    if found != from.name() {
        return Err(WireError::ProducerMismatch {
            expected: from.name().to_string(),
            found,
        });
    }

    let end = NAME_OFFSET + to.name().len();
    bytes[NAME_OFFSET..end].copy_from_slice(to.name().as_bytes());
    Ok(())
}

fn default_resolver() -> Arc<dyn LevelResolver> {
    static RESOLVER: OnceLock<Arc<CachingResolver<&'static LevelRegistry>>> = OnceLock::new();
    let resolver = RESOLVER.get_or_init(|| Arc::new(CachingResolver::new(LevelRegistry::global())));
    Arc::clone(resolver) as Arc<dyn LevelResolver>
}

/// Encoder and decoder for one [`Producer`] identity.
#[derive(Clone)]
pub struct EventCodec {
    producer: Producer,
    resolver: Arc<dyn LevelResolver>,
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new(Producer::Current)
    }
}

impl EventCodec {
    /// Codec resolving external levels through the global
    /// [`LevelRegistry`], with resolutions cached for the process lifetime.
    pub fn new(producer: Producer) -> Self {
        Self::with_resolver(producer, default_resolver())
    }

    pub fn with_resolver(producer: Producer, resolver: Arc<dyn LevelResolver>) -> Self {
        Self { producer, resolver }
    }

    pub fn producer(&self) -> Producer {
        self.producer
    }

    /// Encode `event`, first capturing everything that is still lazy.
    pub fn encode(&self, event: &LogEvent) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(256);
        self.write_event(&mut buf, event)?;
        Ok(buf)
    }

    pub fn write_event<W: Write>(&self, w: &mut W, event: &LogEvent) -> Result<(), WireError> {
        event.prepare_for_deferred_processing();

        w.write_u16::<BigEndian>(MAGIC)?;
        let name = self.producer.name();
        w.write_u16::<BigEndian>(name.len() as u16)?;
        w.write_all(name.as_bytes())?;
        w.write_u16::<BigEndian>(WIRE_VERSION)?;
        w.write_i64::<BigEndian>(STREAM_UID)?;

        write_opt_str(w, event.fqn_of_category_class())?;
        write_opt_str(w, event.logger_name())?;
        w.write_i64::<BigEndian>(event.timestamp())?;
        write_opt_str(w, Some(event.thread_name()))?;
        write_opt_str(w, event.rendered_message())?;
        write_opt_str(w, event.ndc())?;

        match event.capture_mdc() {
            Some(map) => {
                write_count(w, map.len())?;
                for (key, value) in map {
                    write_opt_str(w, Some(key.as_str()))?;
                    write_opt_str(w, Some(serde_json::to_string(value)?.as_str()))?;
                }
            }
            None => w.write_i32::<BigEndian>(-1)?,
        }

        match event.throwable_str_rep() {
            Some(lines) => {
                write_count(w, lines.len())?;
                for line in lines {
                    write_opt_str(w, Some(line.as_str()))?;
                }
            }
            None => w.write_i32::<BigEndian>(-1)?,
        }

        if event.has_location_information() {
            let info = event.location_information();
            w.write_u8(PRESENT)?;
            for field in [&info.class_name, &info.method_name, &info.file_name, &info.line_number] {
                write_opt_str(w, Some(field.as_str()))?;
            }
        } else {
            w.write_u8(ABSENT)?;
        }

        write_level(w, event.level())
    }

    /// Decode an event written under this codec's producer name.
    pub fn decode(&self, bytes: &[u8]) -> Result<LogEvent, WireError> {
        self.read_event(&mut Cursor::new(bytes))
    }

    /// Decode an event written under either producer name.
    ///
    /// A stream from the counterpart producer has its name substituted
    /// before decoding, exactly as an older reader would do by hand.
    pub fn decode_compatible(&self, bytes: &[u8]) -> Result<LogEvent, WireError> {
        let found = peek_producer(bytes)?;
        match Producer::from_name(&found) {
            Some(p) if p == self.producer => self.decode(bytes),
            Some(p) => {
                let mut aliased = bytes.to_vec();
                substitute_producer(&mut aliased, p, self.producer)?;
                tracing::debug!(from = p.name(), to = self.producer.name(), "decoding aliased producer stream");
                self.decode(&aliased)
            }
            None => Err(WireError::ProducerMismatch {
                expected: self.producer.name().to_string(),
                found,
            }),
        }
    }

    pub fn read_event<R: Read>(&self, r: &mut R) -> Result<LogEvent, WireError> {
        self.read_header(r)?;

        let fqn_of_category_class = read_opt_str(r)?;
        let logger_name = read_opt_str(r)?;
        let timestamp = r.read_i64::<BigEndian>()?;
        let thread_name = read_opt_str(r)?;
        let rendered_message = read_opt_str(r)?;
        let ndc = read_opt_str(r)?;

        let properties = match read_count(r)? {
            Some(n) => {
                let mut map = ContextMap::new();
                for _ in 0..n {
                    let key = read_str(r)?;
                    let value = serde_json::from_str(&read_str(r)?)?;
                    map.insert(key, value);
                }
                Some(map)
            }
            None => None,
        };

        let throwable = match read_count(r)? {
            Some(n) => {
                let lines = (0..n).map(|_| read_str(r)).collect::<Result<Vec<_>, _>>()?;
                Some(ThrowableInfo::from_lines(lines))
            }
            None => None,
        };

        let location = if read_marker(r)? {
            Some(LocationInfo::new(read_str(r)?, read_str(r)?, read_str(r)?, read_str(r)?))
        } else {
            None
        };

        let level = self.read_level(r)?;

        let event = LogEvent::from_parts(EventParts {
            fqn_of_category_class,
            logger: None,
            logger_name,
            timestamp,
            level,
            message: None,
            thread_name,
            throwable,
            ndc,
            location,
            properties,
        });
        Ok(event.with_rendered_message(rendered_message))
    }

    fn read_header<R: Read>(&self, r: &mut R) -> Result<(), WireError> {
        let magic = r.read_u16::<BigEndian>()?;
        if magic != MAGIC {
            return Err(WireError::BadMagic(magic));
        }

        let len = r.read_u16::<BigEndian>()?;
        if len > MAX_NAME_LEN {
            return Err(WireError::InvalidLength(len as i64));
        }
        let mut name = vec![0u8; len as usize];
        r.read_exact(&mut name)?;
        if name != self.producer.name().as_bytes() {
            return Err(WireError::ProducerMismatch {
                expected: self.producer.name().to_string(),
                found: String::from_utf8_lossy(&name).into_owned(),
            });
        }

        let version = r.read_u16::<BigEndian>()?;
        if version == 0 || version > WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let uid = r.read_i64::<BigEndian>()?;
        if uid != STREAM_UID {
            return Err(WireError::StreamUidMismatch(uid));
        }
        Ok(())
    }

    /// Read the level sub-record. Never fails on an unknown level type.
    fn read_level<R: Read>(&self, r: &mut R) -> Result<Level, WireError> {
        let priority = r.read_i32::<BigEndian>()?;
        let type_name = read_opt_str(r)?;
        Ok(resolve_level(self.resolver.as_ref(), priority, type_name.as_deref()))
    }
}

fn write_level<W: Write>(w: &mut W, level: &Level) -> Result<(), WireError> {
    w.write_i32::<BigEndian>(level.priority())?;
    write_opt_str(w, level.type_name())
}

fn write_opt_str<W: Write>(w: &mut W, s: Option<&str>) -> Result<(), WireError> {
    let Some(s) = s else {
        w.write_u8(ABSENT)?;
        return Ok(());
    };

    let len = u32::try_from(s.len())
        .ok()
        .filter(|len| *len <= MAX_LEN)
        .ok_or(WireError::InvalidLength(s.len() as i64))?;
    w.write_u8(PRESENT)?;
    w.write_u32::<BigEndian>(len)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_count<W: Write>(w: &mut W, count: usize) -> Result<(), WireError> {
    let count = i32::try_from(count)
        .ok()
        .filter(|n| *n <= MAX_ENTRIES)
        .ok_or(WireError::InvalidLength(count as i64))?;
    w.write_i32::<BigEndian>(count)?;
    Ok(())
}

fn read_marker<R: Read>(r: &mut R) -> Result<bool, WireError> {
    match r.read_u8()? {
        ABSENT => Ok(false),
        PRESENT => Ok(true),
        other => Err(WireError::InvalidMarker(other)),
    }
}

fn read_opt_str<R: Read>(r: &mut R) -> Result<Option<String>, WireError> {
    if !read_marker(r)? {
        return Ok(None);
    }

    let len = r.read_u32::<BigEndian>()?;
    if len > MAX_LEN {
        return Err(WireError::InvalidLength(len as i64));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(Some(String::from_utf8(buf)?))
}

fn read_str<R: Read>(r: &mut R) -> Result<String, WireError> {
    read_opt_str(r)?.ok_or(WireError::InvalidMarker(ABSENT))
}

fn read_count<R: Read>(r: &mut R) -> Result<Option<usize>, WireError> {
    match r.read_i32::<BigEndian>()? {
        -1 => Ok(None),
        n if (0..=MAX_ENTRIES).contains(&n) => Ok(Some(n as usize)),
        n => Err(WireError::InvalidLength(n as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LevelResolveError;
    use crate::logger::{Logger, NamedLogger};
    use crate::message::RawMessage;

    fn simple_event() -> LogEvent {
        let root: Arc<dyn Logger> = Arc::new(NamedLogger::root());
        LogEvent::with_timestamp(Some("app::Log"), Some(root), 1_000, Level::INFO, Some(RawMessage::from("Hello, world.")), None)
    }

    fn custom_codec(registry: LevelRegistry) -> EventCodec {
        EventCodec::with_resolver(Producer::Current, Arc::new(CachingResolver::new(registry)))
    }

    #[test]
    fn producer_names_have_equal_length() {
        assert_eq!(Producer::LEGACY_NAME.len(), Producer::CURRENT_NAME.len());
        assert_eq!(Producer::from_name(Producer::Legacy.name()), Some(Producer::Legacy));
        assert_eq!(Producer::Current.counterpart(), Producer::Legacy);
    }

    #[test]
    fn header_starts_with_magic_and_producer() {
        let bytes = EventCodec::new(Producer::Legacy).encode(&simple_event()).unwrap();
        assert_eq!(&bytes[..2], &MAGIC.to_be_bytes());
        assert_eq!(peek_producer(&bytes).unwrap(), Producer::LEGACY_NAME);
    }

    #[test]
    fn level_sub_record_is_last() {
        let bytes = EventCodec::default().encode(&simple_event()).unwrap();
        let tail = &bytes[bytes.len() - 5..];
        assert_eq!(&tail[..4], &Level::INFO_INT.to_be_bytes());
        assert_eq!(tail[4], ABSENT);
    }

    #[test]
    fn custom_level_round_trips_through_registry() {
        let registry = LevelRegistry::new();
        registry.register("acme::Notice", |p| Ok(Level::custom("acme::Notice", p, "NOTICE", 5)));
        let codec = custom_codec(registry);

        let mut event = simple_event();
        event.set_level(Level::custom("acme::Notice", 25_000, "NOTICE", 5));
        let decoded = codec.decode(&codec.encode(&event).unwrap()).unwrap();
        assert_eq!(decoded.level(), &Level::custom("acme::Notice", 25_000, "NOTICE", 5));
    }

    #[test]
    fn unresolvable_level_falls_back_to_builtin() {
        let registry = LevelRegistry::new();
        registry.register("acme::Broken", |_| {
            Err(LevelResolveError::FactoryFailed {
                type_name: "acme::Broken".into(),
                reason: "unavailable".into(),
            })
        });
        let codec = custom_codec(registry);

        for type_name in ["acme::Missing", "acme::Broken"] {
            let mut event = simple_event();
            event.set_level(Level::custom(type_name, Level::WARN_INT, "ALERT", 4));
            let decoded = codec.decode(&codec.encode(&event).unwrap()).unwrap();
            assert_eq!(decoded.level(), &Level::WARN);
            assert_eq!(decoded.rendered_message(), Some("Hello, world."));
        }
    }

    #[test]
    fn other_producer_is_rejected_without_substitution() {
        let bytes = EventCodec::new(Producer::Current).encode(&simple_event()).unwrap();
        let err = EventCodec::new(Producer::Legacy).decode(&bytes).unwrap_err();
        assert!(matches!(err, WireError::ProducerMismatch { .. }));
    }

    #[test]
    fn substitution_only_touches_the_name() {
        let original = EventCodec::new(Producer::Current).encode(&simple_event()).unwrap();
        let mut aliased = original.clone();
        substitute_producer(&mut aliased, Producer::Current, Producer::Legacy).unwrap();

        assert_eq!(aliased.len(), original.len());
        let changed: Vec<usize> = (0..original.len()).filter(|&i| original[i] != aliased[i]).collect();
        let name_range = NAME_OFFSET..NAME_OFFSET + Producer::LEGACY_NAME.len();
        assert!(changed.iter().all(|i| name_range.contains(i)));
        assert!(!changed.is_empty());
    }

    #[test]
    fn substitution_checks_the_source_name() {
        let mut bytes = EventCodec::new(Producer::Legacy).encode(&simple_event()).unwrap();
        let err = substitute_producer(&mut bytes, Producer::Current, Producer::Legacy).unwrap_err();
        assert!(matches!(err, WireError::ProducerMismatch { .. }));
    }

    #[test]
    fn corrupt_streams_are_errors() {
        let codec = EventCodec::default();
        assert!(matches!(codec.decode(&[0, 0, 0, 0]), Err(WireError::BadMagic(0))));

        let bytes = codec.encode(&simple_event()).unwrap();
        assert!(matches!(codec.decode(&bytes[..bytes.len() - 3]), Err(WireError::Io(_))));

        let mut bad_version = bytes.clone();
        let version_at = NAME_OFFSET + Producer::CURRENT_NAME.len();
        bad_version[version_at..version_at + 2].copy_from_slice(&9u16.to_be_bytes());
        assert!(matches!(codec.decode(&bad_version), Err(WireError::UnsupportedVersion(9))));
    }

    #[test]
    fn location_is_carried_only_when_captured() {
        let codec = EventCodec::default();
        let event = simple_event();
        let decoded = codec.decode(&codec.encode(&event).unwrap()).unwrap();
        assert!(decoded.location_information().is_unknown());

        let located = LogEvent::from_parts(EventParts {
            fqn_of_category_class: None,
            logger: None,
            logger_name: Some("root".into()),
            timestamp: 5,
            level: Level::DEBUG,
            message: Some("located".into()),
            thread_name: Some("main".into()),
            throwable: None,
            ndc: None,
            location: Some(LocationInfo::new("app::db", "query", "db.rs", "17")),
            properties: None,
        });
        let decoded = codec.decode(&codec.encode(&located).unwrap()).unwrap();
        assert_eq!(decoded.location_information().full_info(), "app::db.query(db.rs:17)");
    }
}
