//! Tokens produced by the lexer and consumed once by the reader.

use std::fmt;

use crate::ast::{NumberType, SpecialForm};
use crate::diagnostics::SourceLocation;

/// A 1-based row/column position in the source text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    pub(crate) fn next_line(&mut self, count: usize) {
        self.row += count;
        self.col = 1;
    }

    pub(crate) fn advance(&mut self, chars: usize) {
        self.col += chars;
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { row: 1, col: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A malformed token; reported by the lexer and never handed to the reader
    Invalid,
    Number(NumberType),
    Symbol,
    /// A symbol whose text is one of the special-form keywords
    Special(SpecialForm),
    LeftParen,
    RightParen,
    LeftCurly,
    RightCurly,
    LeftBracket,
    RightBracket,
    At,
    Quote,
    Backtick,
    Tilde,
    /// End of stream; emitted exactly once
    Eos,
}

impl TokenKind {
    /// Human readable name, used by diagnostics and token dumps.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Invalid => "Invalid token",
            TokenKind::Number(_) => "Number",
            TokenKind::Symbol => "Symbol",
            TokenKind::Special(SpecialForm::Def) => "Special(def)",
            TokenKind::Special(SpecialForm::LetStar) => "Special(let*)",
            TokenKind::Special(SpecialForm::If) => "Special(if)",
            TokenKind::Special(SpecialForm::Do) => "Special(do)",
            TokenKind::Special(SpecialForm::Fn) => "Special(fn)",
            TokenKind::Special(SpecialForm::Defn) => "Special(defn)",
            TokenKind::LeftParen => "Left Paren",
            TokenKind::RightParen => "Right Paren",
            TokenKind::LeftCurly => "Left Curly",
            TokenKind::RightCurly => "Right Curly",
            TokenKind::LeftBracket => "Left Bracket",
            TokenKind::RightBracket => "Right Bracket",
            TokenKind::At => "At @",
            TokenKind::Quote => "Quote '",
            TokenKind::Backtick => "Backtick `",
            TokenKind::Tilde => "Tilde ~",
            TokenKind::Eos => "EOS",
        }
    }

    /// The kind of a single-character token, if `ch` forms one.
    pub(crate) fn from_punct(ch: char) -> Option<TokenKind> {
        let kind = match ch {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftCurly,
            '}' => TokenKind::RightCurly,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '\'' => TokenKind::Quote,
            '`' => TokenKind::Backtick,
            '~' => TokenKind::Tilde,
            '@' => TokenKind::At,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A token borrowing its text from the source.
///
/// `line` is the physical source line the token was scanned on (without
/// the line terminator) and `line_offset` is the byte offset of that line,
/// so a diagnostic can print the line standalone and underline the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub offset: usize,
    pub position: Position,
    pub line: &'src str,
    pub line_offset: usize,
}

impl<'src> Token<'src> {
    /// The parsed integer payload, present only for number tokens.
    pub fn number(&self) -> Option<NumberType> {
        match self.kind {
            TokenKind::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_eos(&self) -> bool {
        self.kind == TokenKind::Eos
    }

    /// Snapshot of where this token sits, detached from the source borrow.
    pub fn location(&self) -> SourceLocation {
        let within_line = self.offset.saturating_sub(self.line_offset);
        let column = match self.line.get(..within_line) {
            Some(prefix) => prefix.chars().count(),
            // The end-of-stream token may sit past the stored line.
            None => self.line.chars().count(),
        };

        SourceLocation {
            position: self.position,
            line: self.line.to_owned(),
            column,
            width: self.text.chars().count().max(1),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, text: {}, position: {}",
            self.kind, self.text, self.position
        )
    }
}
