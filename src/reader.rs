//! Recursive-descent reader from tokens to [`Value`] trees.

use crate::ast::Value;
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};
use crate::{SyntaxError, SyntaxErrorKind};

/// Reads top-level forms one at a time from a token sequence.
#[derive(Debug)]
pub struct Reader<'src> {
    tokens: Vec<Token<'src>>,
    index: usize,
}

impl<'src> Reader<'src> {
    /// The sequence is expected to end with [`TokenKind::Eos`], as
    /// [`tokenize`] guarantees; a missing terminator reads as end of input.
    pub fn new(tokens: Vec<Token<'src>>) -> Self {
        Reader { tokens, index: 0 }
    }

    /// The token the next form starts at; `None` once everything is read.
    pub fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.index).filter(|token| !token.is_eos())
    }

    fn end_token(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.index).or_else(|| self.tokens.last())
    }

    /// Read one form. `Ok(None)` signals end of input.
    pub fn read_form(&mut self) -> Result<Option<Value>, SyntaxError> {
        let Some(token) = self.peek() else {
            return Ok(None);
        };
        let kind = token.kind;
        let text = token.text;

        let value = match kind {
            TokenKind::Number(n) => Value::Number(n),
            TokenKind::Symbol => Value::Symbol(text.to_owned()),
            TokenKind::Special(form) => Value::Special(form),
            TokenKind::LeftParen => {
                self.index += 1;
                return self.read_list().map(Some);
            }
            _ => {
                let err = SyntaxError::new(
                    SyntaxErrorKind::UnexpectedToken,
                    format!("unexpected token '{}'", kind.name()),
                    token.location(),
                );
                self.index += 1;
                return Err(err);
            }
        };

        self.index += 1;
        Ok(Some(value))
    }

    /// Elements up to the closing paren; the opening paren is consumed.
    fn read_list(&mut self) -> Result<Value, SyntaxError> {
        let mut elements = Vec::new();

        loop {
            match self.peek() {
                Some(token) if token.kind == TokenKind::RightParen => {
                    self.index += 1;
                    return Ok(Value::List(elements));
                }
                Some(_) => {
                    if let Some(value) = self.read_form()? {
                        elements.push(value);
                    }
                }
                None => return Err(self.unclosed_list()),
            }
        }
    }

    fn unclosed_list(&self) -> SyntaxError {
        let (got, location) = match self.end_token() {
            Some(token) => (token.kind.name(), token.location()),
            None => (TokenKind::Eos.name(), Default::default()),
        };
        SyntaxError::new(
            SyntaxErrorKind::MismatchedParen,
            format!(
                "expected kind '{}' instead got '{got}'",
                TokenKind::RightParen.name()
            ),
            location,
        )
    }

    /// Read every remaining form, stopping at the first error.
    pub fn read_all(&mut self) -> Result<Vec<Value>, SyntaxError> {
        let mut forms = Vec::new();
        while let Some(form) = self.read_form()? {
            forms.push(form);
        }
        Ok(forms)
    }
}

/// Lex and read a whole source unit. The first lexical error wins over
/// any reader error.
pub fn read_str(source: &str) -> Result<Vec<Value>, SyntaxError> {
    let (tokens, errors) = tokenize(source);
    if let Some(err) = errors.into_iter().next() {
        return Err(err);
    }
    Reader::new(tokens).read_all()
}
