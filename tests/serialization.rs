use std::fmt;
use std::sync::Arc;

use log_event_snapshot::{
    substitute_producer, CachingResolver, EventCodec, Level, LevelRegistry, LogEvent, Logger, Mdc,
    NamedLogger, Ndc, Producer, RawMessage, WireError,
};

fn root() -> Option<Arc<dyn Logger>> {
    Some(Arc::new(NamedLogger::root()))
}

fn hello(failure: Option<&(dyn std::error::Error + 'static)>) -> LogEvent {
    LogEvent::new(
        Some("log_event_snapshot::Logger"),
        root(),
        Level::INFO,
        Some(RawMessage::from("Hello, world.")),
        failure,
    )
}

fn round_trip(event: &LogEvent) -> LogEvent {
    let codec = EventCodec::new(Producer::Current);
    let bytes = codec.encode(event).expect("encode");
    codec.decode(&bytes).expect("decode")
}

#[test]
fn simple_event_round_trips() {
    let event = hello(None);
    let t0 = event.timestamp();

    let decoded = round_trip(&event);
    assert_eq!(decoded.rendered_message(), Some("Hello, world."));
    assert_eq!(decoded.level(), &Level::INFO);
    assert_eq!(decoded.timestamp(), t0);
    assert_eq!(decoded.logger_name(), Some("root"));
    assert_eq!(decoded.fqn_of_category_class(), Some("log_event_snapshot::Logger"));
    assert_eq!(decoded.thread_name(), event.thread_name());
    assert!(decoded.raw_message().is_none());
    assert!(decoded.logger().is_none());
}

#[test]
fn exception_text_survives_round_trip() {
    let err = std::io::Error::other("Don't panic");
    let decoded = round_trip(&hello(Some(&err)));

    let rep = decoded.throwable_str_rep().expect("throwable");
    assert!(!rep.is_empty());
    assert_eq!(rep[0], "Don't panic");
}

#[test]
fn ndc_survives_round_trip() {
    Ndc::clear();
    Ndc::push("ndc test");
    let event = hello(None);
    let bytes = EventCodec::default().encode(&event).unwrap();
    Ndc::clear();

    let decoded = EventCodec::default().decode(&bytes).unwrap();
    assert_eq!(decoded.ndc(), Some("ndc test"));
}

#[test]
fn mdc_survives_round_trip() {
    Mdc::clear();
    Mdc::put("mdckey", "mdcvalue");
    Mdc::put("attempt", 3);
    let event = hello(None);
    let bytes = EventCodec::default().encode(&event).unwrap();
    Mdc::clear();

    let decoded = EventCodec::default().decode(&bytes).unwrap();
    assert_eq!(decoded.property("mdckey").as_deref(), Some("mdcvalue"));
    assert_eq!(decoded.mdc("attempt"), Some(serde_json::Value::from(3)));
    assert_eq!(decoded.property_keys().len(), 2);
}

#[test]
fn decoded_event_does_not_read_receiver_context() {
    Ndc::clear();
    Mdc::clear();
    let bytes = EventCodec::default().encode(&hello(None)).unwrap();

    Ndc::push("receiver");
    Mdc::put("receiver", true);
    let decoded = EventCodec::default().decode(&bytes).unwrap();
    assert_eq!(decoded.ndc(), None);
    assert!(decoded.capture_mdc().is_none());
    assert!(decoded.location_information().is_unknown());
    Ndc::clear();
    Mdc::clear();
}

#[test]
fn captures_are_idempotent_after_state_changes() {
    Ndc::clear();
    Mdc::clear();
    Ndc::push("first");
    Mdc::put("k", "first");

    let event = hello(None);
    let ndc = event.ndc().map(str::to_string);
    let mdc = event.capture_mdc().cloned();
    let thread = event.thread_name().to_string();
    let location = event.location_information().clone();
    let message = event.rendered_message().map(str::to_string);

    Ndc::push("second");
    Mdc::put("k", "second");

    assert_eq!(event.ndc().map(str::to_string), ndc);
    assert_eq!(event.capture_mdc().cloned(), mdc);
    assert_eq!(event.thread_name(), thread);
    assert_eq!(event.location_information(), &location);
    assert_eq!(event.rendered_message().map(str::to_string), message);
    Ndc::clear();
    Mdc::clear();
}

#[test]
fn bad_message_is_still_serializable() {
    struct BadMessage;
    impl fmt::Display for BadMessage {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("toString blew up")
        }
    }

    let event = LogEvent::with_timestamp(None, root(), 0, Level::INFO, Some(RawMessage::object(BadMessage)), None);
    let decoded = round_trip(&event);
    assert!(decoded.rendered_message().is_some());
}

#[test]
fn unknown_level_type_decodes_to_builtin() {
    let codec = EventCodec::with_resolver(
        Producer::Current,
        Arc::new(CachingResolver::new(LevelRegistry::new())),
    );
    let mut event = hello(None);
    event.set_level(Level::custom("plugin::Audit", Level::ERROR_INT, "AUDIT", 3));

    let decoded = codec.decode(&codec.encode(&event).unwrap()).unwrap();
    assert_eq!(decoded.level(), &Level::ERROR);
}

#[test]
fn panicking_level_factory_does_not_fail_decode() {
    let registry = LevelRegistry::new();
    registry.register("plugin::Panics", |_| panic!("factory blew up"));
    let codec = EventCodec::with_resolver(Producer::Current, Arc::new(CachingResolver::new(registry)));
    let mut event = hello(None);
    event.set_level(Level::custom("plugin::Panics", Level::WARN_INT, "SHAKY", 4));

    let decoded = codec.decode(&codec.encode(&event).unwrap()).unwrap();
    assert_eq!(decoded.level(), &Level::WARN);
    assert_eq!(decoded.rendered_message(), Some("Hello, world."));
}

#[test]
fn failure_trace_starts_at_the_caller() {
    let err = std::io::Error::other("Don't panic");
    let event = hello(Some(&err));

    let rep = event.throwable_str_rep().expect("throwable");
    let frames = &rep[1..];
    assert!(frames.iter().all(|line| !line.contains("log_event_snapshot::")));
    assert!(frames[0].contains("serialization::hello"));
}

#[test]
fn global_registry_rebuilds_custom_levels() {
    LevelRegistry::global().register("integration::Notice", |p| {
        Ok(Level::custom("integration::Notice", p, "NOTICE", 5))
    });
    let mut event = hello(None);
    event.set_level(Level::custom("integration::Notice", 25_000, "NOTICE", 5));

    let decoded = round_trip(&event);
    assert_eq!(decoded.level().name(), "NOTICE");
    assert_eq!(decoded.level().type_name(), Some("integration::Notice"));
}

#[test]
fn current_stream_decodes_as_legacy_after_name_substitution() {
    Mdc::clear();
    Mdc::put("mdckey", "mdcvalue");
    let err = std::io::Error::other("Don't panic");
    let event = hello(Some(&err));

    let mut bytes = EventCodec::new(Producer::Current).encode(&event).unwrap();
    let original_len = bytes.len();
    let legacy = EventCodec::new(Producer::Legacy);
    assert!(matches!(legacy.decode(&bytes), Err(WireError::ProducerMismatch { .. })));

    substitute_producer(&mut bytes, Producer::Current, Producer::Legacy).unwrap();
    assert_eq!(bytes.len(), original_len);

    let decoded = legacy.decode(&bytes).unwrap();
    assert_eq!(decoded.rendered_message(), event.rendered_message());
    assert_eq!(decoded.level(), event.level());
    assert_eq!(decoded.timestamp(), event.timestamp());
    assert_eq!(decoded.thread_name(), event.thread_name());
    assert_eq!(decoded.logger_name(), event.logger_name());
    assert_eq!(decoded.throwable_str_rep(), event.throwable_str_rep());
    assert_eq!(decoded.properties(), event.properties());
    Mdc::clear();
}

#[test]
fn compatible_decode_accepts_either_producer() {
    let event = hello(None);
    let from_legacy = EventCodec::new(Producer::Legacy).encode(&event).unwrap();
    let from_current = EventCodec::new(Producer::Current).encode(&event).unwrap();

    let reader = EventCodec::new(Producer::Current);
    for bytes in [from_legacy, from_current] {
        let decoded = reader.decode_compatible(&bytes).unwrap();
        assert_eq!(decoded.rendered_message(), Some("Hello, world."));
    }
}

#[test]
fn events_cross_threads_with_origin_context() {
    Ndc::clear();
    Ndc::push("origin");
    let event = hello(None);
    event.prepare_for_deferred_processing();
    let origin = event.thread_name().to_string();
    Ndc::clear();

    let bytes = std::thread::spawn(move || {
        Ndc::push("consumer");
        EventCodec::default().encode(&event).unwrap()
    })
    .join()
    .unwrap();

    let decoded = EventCodec::default().decode(&bytes).unwrap();
    assert_eq!(decoded.ndc(), Some("origin"));
    assert_eq!(decoded.thread_name(), origin);
}
