//! Lexer turning source text into [`Token`]s.
//!
//! Tokens borrow from the source. Malformed input is recorded as a
//! [`SyntaxError`] and surfaces as a [`TokenKind::Invalid`] token, which
//! [`tokenize`] drops so the reader never sees it.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{recognize, value},
    sequence::{pair, preceded},
};
use tracing::trace;

use crate::ast::{NumberType, SpecialForm};
use crate::token::{Position, Token, TokenKind};
use crate::{SyntaxError, SyntaxErrorKind};

/// Characters that end a symbol. `^` is reserved without being a token.
const RESERVED_CHARS: &str = "(){}[]'~^@";

fn is_symbol_char(c: char) -> bool {
    c != ' ' && c != '\n' && !RESERVED_CHARS.contains(c)
}

fn spaces(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c == ' ').parse(input)
}

fn newlines(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c == '\n').parse(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_till(|c: char| c == '\n'))).parse(input)
}

/// `0b`, `0o` or `0x`, yielding the base
fn radix_prefix(input: &str) -> IResult<&str, u32> {
    preceded(
        char('0'),
        alt((
            value(2, char('b')),
            value(8, char('o')),
            value(16, char('x')),
        )),
    )
    .parse(input)
}

fn radix_digits(input: &str, base: u32) -> IResult<&str, &str> {
    take_while(move |c: char| c.is_digit(base)).parse(input)
}

/// `.` followed by decimal digits
fn fraction(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('.'), digit1)).parse(input)
}

fn symbol(input: &str) -> IResult<&str, &str> {
    take_while1(is_symbol_char).parse(input)
}

fn starts_number(input: &str) -> bool {
    let mut chars = input.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Accumulate `digits` in `base`, failing on `i64` overflow.
fn digits_value(digits: &str, base: u32) -> Option<NumberType> {
    digits.chars().try_fold(0 as NumberType, |acc, c| {
        let digit = NumberType::from(c.to_digit(base)?);
        acc.checked_mul(NumberType::from(base))?.checked_add(digit)
    })
}

/// The physical line starting at byte `start`, without its terminator.
fn line_at(source: &str, start: usize) -> &str {
    let rest = source.get(start..).unwrap_or_default();
    rest.find('\n').map_or(rest, |end| &rest[..end])
}

/// A pull-based scanner over one source unit.
#[derive(Debug)]
pub struct Lexer<'src> {
    source: &'src str,
    offset: usize,
    position: Position,
    line_offset: usize,
    line: &'src str,
    exhausted: bool,
    errors: Vec<SyntaxError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            offset: 0,
            position: Position::default(),
            line_offset: 0,
            line: line_at(source, 0),
            exhausted: false,
            errors: Vec::new(),
        }
    }

    /// Diagnostics recorded so far, in source order.
    pub fn into_errors(self) -> Vec<SyntaxError> {
        self.errors
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn rest(&self) -> &'src str {
        self.source.get(self.offset..).unwrap_or_default()
    }

    /// Advance over `remaining`'s prefix that has been consumed from `rest()`.
    fn advance_to(&mut self, remaining: &'src str) {
        let consumed = self.rest().len() - remaining.len();
        let text = &self.rest()[..consumed];
        self.position.advance(text.chars().count());
        self.offset += consumed;
    }

    fn skip_blank(&mut self) {
        loop {
            let rest = self.rest();
            if let Ok((remaining, _)) = spaces(rest) {
                self.advance_to(remaining);
            } else if let Ok((remaining, _)) = comment(rest) {
                self.advance_to(remaining);
            } else if let Ok((remaining, breaks)) = newlines(rest) {
                self.offset += breaks.len();
                self.position.next_line(breaks.len());
                // At end of input the last non-empty line stays current.
                if !remaining.is_empty() {
                    self.line_offset = self.offset;
                    self.line = line_at(self.source, self.offset);
                }
            } else {
                return;
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, position: Position) -> Token<'src> {
        let source = self.source;
        Token {
            kind,
            text: &source[start..self.offset],
            offset: start,
            position,
            line: self.line,
            line_offset: self.line_offset,
        }
    }

    fn report(&mut self, kind: SyntaxErrorKind, message: &str, token: &Token<'src>) {
        self.errors
            .push(SyntaxError::new(kind, message, token.location()));
    }

    fn scan_number(&mut self, start: usize, position: Position) -> Token<'src> {
        let rest = self.rest();

        if let Ok((remaining, _)) = fraction(rest) {
            self.advance_to(remaining);
            let token = self.token(TokenKind::Invalid, start, position);
            self.report(
                SyntaxErrorKind::UnsupportedFraction,
                "fractional numbers are not supported",
                &token,
            );
            return token;
        }

        let (rest, base) = match radix_prefix(rest) {
            Ok((remaining, base)) => (remaining, base),
            Err(_) => (rest, 10),
        };
        let (remaining, digits) = match radix_digits(rest, base) {
            Ok(scanned) => scanned,
            Err(_) => (rest, ""),
        };
        self.advance_to(remaining);

        let invalid = self.token(TokenKind::Invalid, start, position);
        if digits.is_empty() {
            self.report(SyntaxErrorKind::InvalidNumber, "invalid number", &invalid);
            return invalid;
        }
        match digits_value(digits, base) {
            Some(n) => self.token(TokenKind::Number(n), start, position),
            None => {
                self.report(
                    SyntaxErrorKind::InvalidNumber,
                    "number literal does not fit in 64 bits",
                    &invalid,
                );
                invalid
            }
        }
    }

    /// Scan the next token. Lexical errors are recorded and yield a
    /// [`TokenKind::Invalid`] token; the stream ends with exactly one
    /// [`TokenKind::Eos`].
    ///
    /// # Panics
    ///
    /// Panics when called again after the end-of-stream token.
    pub fn next_token(&mut self) -> Token<'src> {
        assert!(
            !self.exhausted,
            "next_token called after the end-of-stream token"
        );

        self.skip_blank();
        let start = self.offset;
        let position = self.position;
        let rest = self.rest();

        let token = match rest.chars().next() {
            None => {
                self.exhausted = true;
                self.token(TokenKind::Eos, start, position)
            }
            Some(ch) => {
                if let Some(kind) = TokenKind::from_punct(ch) {
                    self.advance_to(&rest[ch.len_utf8()..]);
                    self.token(kind, start, position)
                } else if ch == '^' {
                    self.advance_to(&rest[ch.len_utf8()..]);
                    let token = self.token(TokenKind::Invalid, start, position);
                    self.report(
                        SyntaxErrorKind::UnexpectedCharacter,
                        "unexpected character '^'",
                        &token,
                    );
                    token
                } else if starts_number(rest) {
                    self.scan_number(start, position)
                } else {
                    // Anything else left at a token boundary is a symbol character.
                    let remaining = symbol(rest).map_or("", |(remaining, _)| remaining);
                    self.advance_to(remaining);
                    let mut token = self.token(TokenKind::Symbol, start, position);
                    if let Some(form) = SpecialForm::from_keyword(token.text) {
                        token.kind = TokenKind::Special(form);
                    }
                    token
                }
            }
        };

        trace!(kind = %token.kind, text = token.text, position = %token.position, "token");
        token
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            None
        } else {
            Some(self.next_token())
        }
    }
}

/// Lex a whole source unit. Invalid tokens are dropped; the returned
/// sequence always ends with [`TokenKind::Eos`].
pub fn tokenize(source: &str) -> (Vec<Token<'_>>, Vec<SyntaxError>) {
    let mut lexer = Lexer::new(source);
    let tokens = lexer
        .by_ref()
        .filter(|token| token.kind != TokenKind::Invalid)
        .collect();
    (tokens, lexer.into_errors())
}
