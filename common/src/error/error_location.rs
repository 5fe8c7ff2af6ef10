use std::fmt;
use std::panic::Location;

/// Source position at which an error value was constructed.
///
/// Built from `Location::caller()` inside `#[track_caller]` constructors, so
/// the position is the line that raised the error rather than the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl ErrorLocation {
    pub const fn from(caller: &'static Location<'static>) -> Self {
        Self {
            file: caller.file(),
            line: caller.line(),
            column: caller.column(),
        }
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}:{}]", self.file, self.line, self.column)
    }
}
