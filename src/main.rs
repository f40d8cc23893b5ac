use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context as _;
use katie::evaluator::Context;
use katie::runner::{dump_tokens, run_source, stringify};
use tracing_subscriber::EnvFilter;

const HELP_MSG: &str = "\
usage: katie [-l|--lex-tokens] [-s|--stringify] [-h|--help] [SOURCE_FILEPATH]

Evaluates every top-level form of SOURCE_FILEPATH and prints each result.
Without a path an interactive session starts.

options:
  -l, --lex-tokens   print the token stream and exit
  -s, --stringify    print each parsed form without evaluating it
  -h, --help         show this message

Logging is configured through RUST_LOG (default: warn).
";

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    lex_tokens: bool,
    stringify: bool,
    help: bool,
    path: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();

    for arg in args {
        match arg.as_str() {
            "-l" | "--lex-tokens" => options.lex_tokens = true,
            "-s" | "--stringify" => options.stringify = true,
            "-h" | "--help" => options.help = true,
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("unknown option '{flag}'"));
            }
            path if options.path.is_some() => {
                return Err(format!("unexpected extra argument '{path}'"));
            }
            path => options.path = Some(path.to_owned()),
        }
    }

    Ok(options)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "repl")]
fn interactive() -> anyhow::Result<bool> {
    let mut ctx = Context::new();
    katie::repl::run_repl(&mut ctx).context("interactive session failed")?;
    Ok(true)
}

#[cfg(not(feature = "repl"))]
fn interactive() -> anyhow::Result<bool> {
    eprint!("{HELP_MSG}");
    Ok(false)
}

/// Returns whether the run succeeded; diagnostics are already printed
/// when it did not.
fn run(options: &Options) -> anyhow::Result<bool> {
    let Some(path) = options.path.as_deref() else {
        return interactive();
    };

    let source =
        std::fs::read_to_string(path).with_context(|| format!("cannot read '{path}'"))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut diagnostics = io::stderr();

    let result = if options.lex_tokens {
        dump_tokens(path, &source, &mut out, &mut diagnostics)
    } else if options.stringify {
        stringify(path, &source, &mut out, &mut diagnostics)
    } else {
        let mut ctx = Context::new();
        run_source(&mut ctx, path, &source, &mut out, &mut diagnostics)
    };
    out.flush()?;

    match result {
        Ok(()) => Ok(true),
        Err(katie::runner::RunError::Io(err)) => Err(err).context("cannot write output"),
        Err(err) => {
            tracing::debug!(error = %err, "run aborted");
            Ok(false)
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("katie: {message}");
            eprint!("{HELP_MSG}");
            return Ok(ExitCode::from(2));
        }
    };

    if options.help {
        print!("{HELP_MSG}");
        return Ok(ExitCode::SUCCESS);
    }

    init_logging();

    if run(&options)? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
