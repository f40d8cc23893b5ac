//! Source locations and their caret-and-underline rendering.
//!
//! ```text
//! demo.kt:1:6: lexer error: invalid number
//!   (+ 1 0x)
//!        ^--
//! ```

use std::fmt;

use crate::token::Position;

/// Where a diagnostic points: the reported position plus the physical
/// line it sits on, so rendering does not need the original source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub position: Position,
    /// The source line, without its terminator
    pub line: String,
    /// Characters between the start of `line` and the offending token
    pub column: usize,
    /// Length of the offending token in characters
    pub width: usize,
}

impl SourceLocation {
    pub fn render(&self, filepath: &str, prefix: &str, message: &str) -> String {
        format!(
            "{filepath}:{}: {prefix}: {message}\n  {}\n  {}^{}\n\n",
            self.position,
            self.line,
            " ".repeat(self.column),
            "-".repeat(self.width),
        )
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.position)
    }
}
