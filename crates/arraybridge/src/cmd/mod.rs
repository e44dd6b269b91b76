use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a worker, perform one call, print the reply, and stop.
    Call(CallArgs),
    /// Run the echo worker that `call` talks to.
    Worker(WorkerArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Worker(args) => worker::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Listen and let the worker connect back.
    Server,
    /// Connect to a worker that listens.
    Client,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Worker command line; the session host and port are appended.
    #[arg(long, short = 'w')]
    pub worker: String,
    /// Request value as JSON.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub json: Option<String>,
    /// Read the JSON request from a file.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
    /// Session config file (JSON). Flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Timeout for the handshake and the call (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Interface to bind (server mode) or connect to (client mode).
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind or connect to. 0 binds an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Which side of the connection this process takes.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Session host.
    pub host: String,
    /// Session port.
    pub port: u16,
    /// Line printed to stdout before connecting.
    #[arg(long)]
    pub banner: Option<String>,
    /// Listen on HOST:PORT instead of connecting.
    #[arg(long)]
    pub listen: bool,
    /// Handshake and per-message timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a `--timeout` value. A bare number is milliseconds, like the config's `*_ms` fields.
pub(crate) fn parse_timeout(input: &str) -> CliResult<Duration> {
    let text = input.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);

    let invalid = || {
        CliError::new(
            USAGE,
            format!("invalid timeout '{input}': expected e.g. 500ms, 5s or 2m"),
        )
    };
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let timeout = match unit {
        "" | "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };

    if timeout.is_zero() {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }
    Ok(timeout)
}
