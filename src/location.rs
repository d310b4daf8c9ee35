use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Marker used for every field of a location that could not be determined.
pub const NA: &str = "?";

/// Upper bound on the number of frames a stack walk visits.
const MAX_FRAMES: usize = 256;

/// Call site of a logging request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationInfo {
    pub class_name: String,
    pub method_name: String,
    pub file_name: String,
    pub line_number: String,
}

impl LocationInfo {
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        file_name: impl Into<String>,
        line_number: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            file_name: file_name.into(),
            line_number: line_number.into(),
        }
    }

    /// Location with every field set to [`NA`].
    pub fn unknown() -> Self {
        Self::new(NA, NA, NA, NA)
    }

    pub fn is_unknown(&self) -> bool {
        [
            &self.class_name,
            &self.method_name,
            &self.file_name,
            &self.line_number,
        ]
        .iter()
        .all(|f| f.as_str() == NA)
    }

    /// Find the caller of the wrapper named `bounding`.
    ///
    /// Walks the current stack, locates the outermost-to-caller boundary
    /// (the last frame whose symbol lies inside `bounding`) and reports the
    /// first frame after it. Returns [`LocationInfo::unknown`] when
    /// `bounding` is `None` or never appears on the stack.
    pub fn capture(bounding: Option<&str>) -> Self {
        let Some(bounding) = bounding.filter(|b| !b.is_empty()) else {
            return Self::unknown();
        };

        let frames = capture_frames();
        let Some(last_inside) = frames
            .iter()
            .rposition(|f| symbol_in_scope(&f.function, bounding))
        else {
            return Self::unknown();
        };

        frames[last_inside + 1..]
            .iter()
            .find(|f| !symbol_in_scope(&f.function, bounding))
            .map(StackFrame::to_location)
            .unwrap_or_else(Self::unknown)
    }

    /// `class.method(file:line)`, the classic one-line rendering.
    pub fn full_info(&self) -> String {
        format!(
            "{}.{}({}:{})",
            self.class_name, self.method_name, self.file_name, self.line_number
        )
    }
}

impl Default for LocationInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for LocationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_info())
    }
}

/// One resolved symbol of a captured stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StackFrame {
    /// Demangled symbol without its hash suffix.
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    fn to_location(&self) -> LocationInfo {
        let function = strip_closures(&self.function);
        let (class, method) = match function.rsplit_once("::") {
            Some((class, method)) => (class.trim_start_matches('<'), method),
            None => (NA, function),
        };
        let file = self
            .file
            .as_deref()
            .and_then(|f| Path::new(f).file_name())
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| NA.to_string());
        let line = self
            .line
            .map(|l| l.to_string())
            .unwrap_or_else(|| NA.to_string());

        LocationInfo::new(class, method, file, line)
    }

    /// `\tat function(file:line)`, one line of a failure representation.
    pub fn render(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("\tat {}({}:{})", self.function, file, line),
            _ => format!("\tat {}(Unknown Source)", self.function),
        }
    }
}

/// Resolve the innermost [`MAX_FRAMES`] frames of the current stack into
/// symbols, innermost first.
///
/// Frames beyond the limit are neither walked nor resolved. Frames
/// belonging to the unwinder itself are dropped.
pub(crate) fn capture_frames() -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut walked = 0;

    backtrace::trace(|frame| {
        walked += 1;
        backtrace::resolve_frame(frame, |symbol| {
            let Some(name) = symbol.name() else {
                return;
            };
            let function = format!("{name:#}");
            if function.starts_with("backtrace::") {
                return;
            }
            frames.push(StackFrame {
                function,
                file: symbol
                    .filename()
                    .map(|p| p.to_string_lossy().into_owned()),
                line: symbol.lineno(),
            });
        });
        walked < MAX_FRAMES
    });

    frames
}

/// Whether `function` is `bounding` itself or lives inside it.
fn symbol_in_scope(function: &str, bounding: &str) -> bool {
    let function = function.trim_start_matches('<');
    match function.strip_prefix(bounding) {
        Some(rest) => rest.is_empty() || rest.starts_with("::") || rest.starts_with(' ') || rest.starts_with('>'),
        None => false,
    }
}

fn strip_closures(mut function: &str) -> &str {
    while let Some(rest) = function.strip_suffix("::{{closure}}") {
        function = rest;
    }
    function
}
