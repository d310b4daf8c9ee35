use std::sync::Arc;

use log_event_snapshot::{
    substitute_producer, EventCodec, Level, LogEvent, Logger, Mdc, NamedLogger, Ndc, Producer,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Ndc::push("ndc test");
    Mdc::put("mdckey", "mdcvalue");

    let root: Arc<dyn Logger> = Arc::new(NamedLogger::root());
    let failure = std::io::Error::other("Don't panic");
    let event = LogEvent::new(None, Some(root), Level::INFO, Some("Hello, world.".into()), Some(&failure));

    let mut bytes = EventCodec::new(Producer::Current).encode(&event)?;
    println!("encoded {} bytes as {}", bytes.len(), Producer::CURRENT_NAME);

    substitute_producer(&mut bytes, Producer::Current, Producer::Legacy)?;
    let decoded = EventCodec::new(Producer::Legacy).decode(&bytes)?;

    println!("decoded as {}: {:#?}", Producer::LEGACY_NAME, decoded);
    Ok(())
}
