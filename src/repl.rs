//! Interactive read-eval-print loop on top of `rustyline`.
//!
//! Every line is run through [`run_source`] against one long-lived
//! [`Context`], so definitions persist between lines and a failing line
//! only prints its diagnostic.

use std::io::{self, Write};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::ast::Value;
use crate::evaluator::{Context, Environment};
use crate::runner::run_source;

pub const PROMPT: &str = "katie> ";

/// Name used for the source unit in REPL diagnostics
const REPL_PATH: &str = "<repl>";

/// What a non-empty input line asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Env,
    Quit,
    Eval(&'a str),
}

impl<'a> Command<'a> {
    /// `None` for blank lines.
    pub fn parse(line: &'a str) -> Option<Command<'a>> {
        let line = line.trim();
        let command = match line {
            "" => return None,
            ":help" => Command::Help,
            ":env" => Command::Env,
            ":quit" | ":exit" => Command::Quit,
            source => Command::Eval(source),
        };
        Some(command)
    }
}

pub fn write_help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "katie interactive interpreter:")?;
    writeln!(out, "  :help     - Show this help message")?;
    writeln!(out, "  :env      - Show current environment bindings")?;
    writeln!(out, "  :quit     - Exit the interpreter")?;
    writeln!(out, "  :exit     - Exit the interpreter")?;
    writeln!(out, "  Ctrl+D    - Exit the interpreter")?;
    writeln!(out)?;
    writeln!(out, "Special forms: def, if, fn")?;
    writeln!(out, "Arithmetic: +, -, *, /")?;
    writeln!(out)?;
    writeln!(out, "Examples:")?;
    writeln!(out, "  (+ 1 2 3)")?;
    writeln!(out, "  (def square (fn (x) (* x x)))")?;
    writeln!(out, "  (if true (square 0x10) 0)")?;
    writeln!(out)
}

/// Print the bindings visible from `env`, natives first.
pub fn write_environment(env: &Environment, out: &mut impl Write) -> io::Result<()> {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        return writeln!(out, "Environment is empty.");
    }

    writeln!(out, "Environment bindings ({} total):", bindings.len())?;

    let (natives, user_defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::NativeProcedure { .. }));

    if !natives.is_empty() {
        let names: Vec<&str> = natives.iter().map(|(name, _)| name.as_str()).collect();
        writeln!(out, "Native procedures ({}):", names.len())?;
        writeln!(out, "  {}", names.join(" "))?;
    }

    if !user_defined.is_empty() {
        writeln!(out, "Values ({}):", user_defined.len())?;
        for (name, value) in user_defined {
            writeln!(out, "  {name} = {value}")?;
        }
    }

    Ok(())
}

/// Run the loop until `:quit`, end of input or interrupt.
pub fn run_repl(ctx: &mut Context) -> Result<(), ReadlineError> {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    println!("katie - type :help for commands, Ctrl+D to exit.");

    let mut rl = DefaultEditor::new()?;

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let Some(command) = Command::parse(&line) else {
                    continue;
                };
                rl.add_history_entry(line.trim())?;

                match command {
                    Command::Help => write_help(&mut stdout)?,
                    Command::Env => write_environment(ctx.global(), &mut stdout)?,
                    Command::Quit => break,
                    Command::Eval(source) => {
                        // Diagnostics are already written; keep the session going.
                        if let Err(err) =
                            run_source(ctx, REPL_PATH, source, &mut stdout, &mut stderr)
                        {
                            debug!(error = %err, "line failed");
                        }
                    }
                }
            }
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => break,
            Err(err) => return Err(err),
        }
    }

    println!("Goodbye!");
    Ok(())
}
