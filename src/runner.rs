//! Whole-source pipeline: lex, read, evaluate and print every top-level
//! form, rendering diagnostics as they happen.
//!
//! Output and diagnostics go to caller-supplied writers so the command
//! line, the REPL and tests share one code path.

use std::io::{self, Write};

use tracing::debug;

use crate::evaluator::{Context, eval};
use crate::lexer::{Lexer, tokenize};
use crate::reader::Reader;
use crate::token::Token;
use crate::{Error, SyntaxError};

/// Prefix of diagnostics for failed top-level evaluations
pub const EVAL_ERROR_PREFIX: &str = "eval error";

/// Why a run stopped early. Diagnostics have already been written when
/// one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{} syntax error(s)", .0.len())]
    Syntax(Vec<SyntaxError>),
    #[error(transparent)]
    Eval(Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn report_syntax_errors(
    path: &str,
    errors: Vec<SyntaxError>,
    diagnostics: &mut impl Write,
) -> Result<(), RunError> {
    if errors.is_empty() {
        return Ok(());
    }
    for err in &errors {
        write!(diagnostics, "{}", err.render(path))?;
    }
    Err(RunError::Syntax(errors))
}

/// Lex the whole source, aborting after reporting every lexical error.
fn read_tokens<'src>(
    path: &str,
    source: &'src str,
    diagnostics: &mut impl Write,
) -> Result<Reader<'src>, RunError> {
    let (tokens, errors) = tokenize(source);
    report_syntax_errors(path, errors, diagnostics)?;
    Ok(Reader::new(tokens))
}

/// Evaluate every top-level form of `source` in `ctx`, writing each
/// result to `out` on its own line.
///
/// Stops at the first reader or evaluation error. Bindings made by the
/// forms before the failure stay in `ctx`.
pub fn run_source(
    ctx: &mut Context,
    path: &str,
    source: &str,
    out: &mut impl Write,
    diagnostics: &mut impl Write,
) -> Result<(), RunError> {
    let mut reader = read_tokens(path, source, diagnostics)?;

    while let Some(start) = reader.peek().map(Token::location) {
        let form = match reader.read_form() {
            Ok(Some(form)) => form,
            Ok(None) => break,
            Err(err) => return report_syntax_errors(path, vec![err], diagnostics),
        };

        debug!(form = %form, position = %start, "top-level form");
        match eval(&form, ctx) {
            Ok(value) => writeln!(out, "{value}")?,
            Err(err) => {
                let message = err.to_string();
                write!(
                    diagnostics,
                    "{}",
                    start.render(path, EVAL_ERROR_PREFIX, &message)
                )?;
                return Err(RunError::Eval(err));
            }
        }
    }

    Ok(())
}

/// Write every token, invalid ones included, then the lexical diagnostics.
pub fn dump_tokens(
    path: &str,
    source: &str,
    out: &mut impl Write,
    diagnostics: &mut impl Write,
) -> Result<(), RunError> {
    let mut lexer = Lexer::new(source);
    for token in lexer.by_ref() {
        writeln!(out, "{token}")?;
    }
    report_syntax_errors(path, lexer.into_errors(), diagnostics)
}

/// Write every top-level form through the printer without evaluating.
pub fn stringify(
    path: &str,
    source: &str,
    out: &mut impl Write,
    diagnostics: &mut impl Write,
) -> Result<(), RunError> {
    let mut reader = read_tokens(path, source, diagnostics)?;
    loop {
        match reader.read_form() {
            Ok(Some(form)) => writeln!(out, "{form}")?,
            Ok(None) => return Ok(()),
            Err(err) => return report_syntax_errors(path, vec![err], diagnostics),
        }
    }
}
