//! Deferral CLI - runs a command through deferred values and reports the outcome.
//!
//! ```text
//! main() -> load config -> init_tracing() -> install_policy()
//!        -> sum::sum(handle, operands) -> Deferred<i64, SumError>
//!        -> wait() -> report() -> exit code
//! ```
//!
//! Exit codes: 0 on success, 1 when the command's value rejects, 2 on usage errors.

mod sum;

use std::env;
use std::fmt::Display;
use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Result;
use tokio::runtime::Handle;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use deferral_config::DeferralConfig;
use deferral_core::install_policy;

const USAGE: &str = "usage: deferral sum <INTEGER>...";

const EXIT_OK: u8 = 0;
const EXIT_REJECTED: u8 = 1;
const EXIT_USAGE: u8 = 2;

fn init_tracing(config: Option<&DeferralConfig>) {
    let configured = config.and_then(DeferralConfig::log_filter).unwrap_or("warn");
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries command output only.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Sum(Vec<String>),
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        match args.split_first() {
            Some((name, rest)) if name == "sum" => Some(Command::Sum(rest.to_vec())),
            Some((name, _)) if name == "-h" || name == "--help" => Some(Command::Help),
            _ => None,
        }
    }
}

/// Write the outcome and pick the exit code.
fn report<T, E>(outcome: Result<T, E>, out: &mut impl Write, err: &mut impl Write) -> u8
where
    T: Display,
    E: Display,
{
    match outcome {
        Ok(value) => match writeln!(out, "{value}") {
            Ok(()) => EXIT_OK,
            Err(write_err) => {
                tracing::error!(%write_err, "failed to write result to stdout");
                EXIT_REJECTED
            }
        },
        Err(error) => {
            // The exit code carries the rejection even when stderr is gone.
            if let Err(write_err) = writeln!(err, "error: {error}") {
                tracing::error!(%write_err, %error, "failed to write rejection to stderr");
            }
            EXIT_REJECTED
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let loaded = DeferralConfig::load();
    let config = loaded.as_ref().ok().and_then(Option::as_ref);
    init_tracing(config);
    if let Err(err) = &loaded {
        tracing::warn!(path = %err.path().display(), "ignoring config: {err}");
    }

    let policy = config.map(DeferralConfig::policy).unwrap_or_default();
    if install_policy(policy).is_err() {
        tracing::debug!("deferral policy already installed");
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let code = match Command::parse(&args) {
        Some(Command::Sum(operands)) => {
            // Only the waiter is kept, so a parse job that dies surfaces as `Abandoned`.
            let waiting = sum::sum(&Handle::current(), operands).wait();
            let outcome = waiting.await?;
            report(outcome, &mut io::stdout(), &mut io::stderr())
        }
        Some(Command::Help) => {
            println!("{USAGE}");
            EXIT_OK
        }
        None => {
            eprintln!("{USAGE}");
            EXIT_USAGE
        }
    };

    Ok(ExitCode::from(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parse_sum_keeps_operands() {
        assert_eq!(
            Command::parse(&args(&["sum", "1", "2"])),
            Some(Command::Sum(args(&["1", "2"])))
        );
    }

    #[test]
    fn parse_rejects_unknown_or_missing_command() {
        assert_eq!(Command::parse(&args(&[])), None);
        assert_eq!(Command::parse(&args(&["product", "2"])), None);
        assert_eq!(Command::parse(&args(&["--help"])), Some(Command::Help));
    }

    #[test]
    fn report_success_writes_value_to_stdout() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = report(Ok::<_, String>(42), &mut out, &mut err);
        assert_eq!(code, EXIT_OK);
        assert_eq!(out, b"42\n");
        assert!(err.is_empty());
    }

    #[test]
    fn report_rejection_writes_error_to_stderr() {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = report(Err::<i64, _>(sum::SumError::Overflow), &mut out, &mut err);
        assert_eq!(code, EXIT_REJECTED);
        assert!(out.is_empty());
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "error: sum overflows a 64-bit integer\n"
        );
    }

    #[test]
    fn report_keeps_exit_code_when_output_is_closed() {
        let rejected = Err::<i64, _>(sum::SumError::Overflow);
        let code = report(rejected, &mut Vec::<u8>::new(), &mut Closed);
        assert_eq!(code, EXIT_REJECTED);

        let code = report(Ok::<_, String>(42), &mut Closed, &mut Vec::<u8>::new());
        assert_eq!(code, EXIT_REJECTED);
    }
}
