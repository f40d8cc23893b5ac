//! Katie - a small Lisp-family language
//!
//! This crate turns source text into evaluated values through a classic
//! four stage pipeline:
//!
//! ```text
//! text -> lexer -> tokens -> reader -> Value tree -> evaluator -> Value -> printer
//! ```
//!
//! ```lisp
//! ; numbers, symbols and lists
//! (+ 1 2 3)                  ; 6
//! (def x 0x1F)               ; 31
//! (if true x 0)              ; 31
//! ((fn (a b) (* a b)) 6 7)   ; 42
//! ```
//!
//! ## Language Summary
//!
//! - Integers only (`i64`), with `0b`, `0o` and `0x` literal prefixes
//! - Special forms: `def`, `if`, `fn` (`let*`, `do` and `defn` are recognised
//!   but report [`Error::Unimplemented`] when evaluated)
//! - Native arithmetic `+ - * /` that coerces booleans to 0/1 and skips
//!   arguments that are not numeric
//! - Lexically scoped closures; every call gets a fresh argument frame
//!
//! ## Known Limits
//!
//! There is no tail-call elimination and no evaluation depth guard: a
//! non-terminating or very deeply recursive program exhausts the native
//! stack and aborts the process. Values are reference counted; cycles
//! between a closure and a frame that stores it are only broken for the
//! global frame, when the owning [`evaluator::Context`] is dropped.
//!
//! ## Modules
//!
//! - `token`: token kinds, positions and their display names
//! - `lexer`: source text to tokens, with lexical diagnostics
//! - `reader`: tokens to s-expression values
//! - `ast`: the runtime value model and its printer
//! - `evaluator`: environments, evaluation context and special forms
//! - `builtinops`: native procedures bound in the global environment
//! - `diagnostics`: caret-and-underline rendering of source locations
//! - `runner`: the whole-file pipeline used by the command line
//! - `repl`: interactive read-eval-print loop (feature `repl`)

use crate::ast::SpecialForm;
use crate::diagnostics::SourceLocation;
use crate::evaluator::Arity;

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyntaxErrorKind {
    /// A prefixed literal without digits, or a literal that does not fit in an `i64`
    InvalidNumber,
    /// A reserved character that does not start any token
    UnexpectedCharacter,
    /// A fractional literal such as `.5`; only integers exist
    UnsupportedFraction,
    /// A token the reader has no rule for (stray `)`, brackets, quote marks)
    UnexpectedToken,
    /// The input ended before a list was closed
    MismatchedParen,
}

impl SyntaxErrorKind {
    /// Diagnostic prefix naming the stage that detected the error.
    pub fn prefix(self) -> &'static str {
        match self {
            SyntaxErrorKind::InvalidNumber
            | SyntaxErrorKind::UnexpectedCharacter
            | SyntaxErrorKind::UnsupportedFraction => "lexer error",
            SyntaxErrorKind::UnexpectedToken | SyntaxErrorKind::MismatchedParen => "reader error",
        }
    }
}

/// A structured error describing a lexical or syntactic failure.
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("{location}: {}: {message}", .kind.prefix())]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    /// Where the offending token sits in the source
    pub location: SourceLocation,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        SyntaxError {
            kind,
            message: message.into(),
            location,
        }
    }

    /// Render the error in the `<path>:<row>:<col>: <prefix>: <message>`
    /// format, followed by the source line and an underline.
    pub fn render(&self, filepath: &str) -> String {
        self.location
            .render(filepath, self.kind.prefix(), &self.message)
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),
    #[error("arity mismatch in {expression}: expected {expected} arguments, got {got}")]
    ArityError {
        expected: Arity,
        got: usize,
        expression: String,
    },
    #[error("cannot apply non-procedure: {0}")]
    NotAProcedure(String),
    #[error("special form '{0}' is not implemented")]
    Unimplemented(SpecialForm),
    #[error("invalid form: {0}")]
    InvalidForm(String),
    #[error("evaluation error: {0}")]
    EvalError(String),
}

impl Error {
    /// Create an ArityError naming the offending expression
    pub fn arity_error(expected: Arity, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression,
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod diagnostics;
pub mod evaluator;
pub mod lexer;
pub mod reader;
pub mod runner;
pub mod token;

#[cfg(feature = "repl")]
pub mod repl;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Position;

    fn location() -> SourceLocation {
        SourceLocation {
            position: Position::new(2, 6),
            line: "(+ 1 0x)".to_owned(),
            column: 5,
            width: 2,
        }
    }

    #[test]
    fn test_syntax_error_display_and_render() {
        let err = SyntaxError::new(SyntaxErrorKind::InvalidNumber, "invalid number", location());
        assert_eq!(format!("{err}"), "2:6: lexer error: invalid number");
        assert_eq!(
            err.render("demo.kt"),
            "demo.kt:2:6: lexer error: invalid number\n  (+ 1 0x)\n       ^--\n\n"
        );
    }

    #[test]
    fn test_error_messages() {
        let cases = vec![
            (Error::UnresolvedSymbol("x".into()), "unresolved symbol: x"),
            (
                Error::arity_error(Arity::Range(2, 3), 4, "(if a b c d )".into()),
                "arity mismatch in (if a b c d ): expected 2 to 3 arguments, got 4",
            ),
            (Error::NotAProcedure("5".into()), "cannot apply non-procedure: 5"),
            (
                Error::Unimplemented(SpecialForm::LetStar),
                "special form 'let*' is not implemented",
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(format!("{err}"), expected);
        }

        let syntax: Error =
            SyntaxError::new(SyntaxErrorKind::MismatchedParen, "unclosed", location()).into();
        assert!(format!("{syntax}").contains("reader error: unclosed"));
        assert!(matches!(syntax, Error::Syntax(e) if e.kind == SyntaxErrorKind::MismatchedParen));
    }
}
