use crate::location::{capture_frames, StackFrame};
use serde::Serialize;
use std::error::Error;

/// Textual form of a failure attached to an event.
///
/// Built once when the event is created; the failure value itself is not
/// kept, so the representation survives any later handoff unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ThrowableInfo {
    rep: Vec<String>,
}

impl ThrowableInfo {
    /// Render `error`, its chain of sources and the stack at this point.
    ///
    /// The first line is the error's display form, each source adds a
    /// `Caused by: ...` line, and the remaining lines are the frames of the
    /// capturing stack in `\tat function(file:line)` form, starting at the
    /// first frame outside this crate.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let mut rep = vec![error.to_string()];

        let mut source = error.source();
        while let Some(cause) = source {
            rep.push(format!("Caused by: {cause}"));
            source = cause.source();
        }

        rep.extend(
            capture_frames()
                .iter()
                .skip_while(|f| is_capture_frame(&f.function))
                .map(StackFrame::render),
        );

        Self { rep }
    }

    /// Rebuild from an already rendered representation.
    pub fn from_lines(rep: Vec<String>) -> Self {
        Self { rep }
    }

    pub fn throwable_str_rep(&self) -> &[String] {
        &self.rep
    }

    /// The first line, i.e. the failure's own message.
    pub fn summary(&self) -> Option<&str> {
        self.rep.first().map(String::as_str)
    }
}

/// Frames of this crate, plus the `core` glue (`Option::map`, `FnOnce`
/// shims) it calls through, that sit between the caller and the capture.
fn is_capture_frame(function: &str) -> bool {
    let function = function.trim_start_matches('<');
    function.starts_with("core::")
        || function
            .strip_prefix(env!("CARGO_CRATE_NAME"))
            .is_some_and(|rest| rest.starts_with("::"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("request failed")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn first_line_is_the_message() {
        let err = std::io::Error::other("Don't panic");
        let info = ThrowableInfo::from_error(&err);
        assert_eq!(info.summary(), Some("Don't panic"));
    }

    #[test]
    fn sources_are_chained() {
        let err = Outer(std::io::Error::other("connection reset"));
        let info = ThrowableInfo::from_error(&err);
        let rep = info.throwable_str_rep();
        assert_eq!(rep[0], "request failed");
        assert_eq!(rep[1], "Caused by: connection reset");
        assert!(rep[2..].iter().all(|line| line.starts_with("\tat ")));
    }

    #[test]
    fn capture_frames_are_recognised_by_crate_root() {
        assert!(is_capture_frame("log_event_snapshot::event::LogEvent::new"));
        assert!(is_capture_frame("<log_event_snapshot::message::RawMessage as core::fmt::Debug>::fmt"));
        assert!(is_capture_frame("core::option::Option<T>::map"));
        assert!(!is_capture_frame("log_event_snapshot_ext::Wrapper::info"));
        assert!(!is_capture_frame("app::main"));
    }

    #[test]
    fn from_lines_keeps_text_verbatim() {
        let lines = vec!["boom".to_string(), "\tat main(main.rs:1)".to_string()];
        assert_eq!(ThrowableInfo::from_lines(lines.clone()).throwable_str_rep(), &lines[..]);
    }
}
