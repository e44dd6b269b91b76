mod cmd;
mod exit;
mod json;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "arraybridge", version, about = "Call array workers over loopback TCP")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "arraybridge",
            "call",
            "--worker",
            "arraybridge worker",
            "--json",
            "{\"id\":42}",
            "--timeout",
            "2s",
        ])
        .expect("call args should parse");

        assert!(matches!(cli.command, Command::Call(_)));
    }

    #[test]
    fn rejects_conflicting_request_args() {
        let err = Cli::try_parse_from([
            "arraybridge",
            "call",
            "--worker",
            "w",
            "--json",
            "1",
            "--file",
            "req.json",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn call_requires_a_request() {
        let err = Cli::try_parse_from(["arraybridge", "call", "--worker", "w"])
            .expect_err("missing request should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_worker_subcommand() {
        let cli = Cli::try_parse_from([
            "arraybridge",
            "worker",
            "127.0.0.1",
            "4100",
            "--banner",
            "ready",
        ])
        .expect("worker args should parse");

        match cli.command {
            Command::Worker(args) => {
                assert_eq!(args.port, 4100);
                assert_eq!(args.banner.as_deref(), Some("ready"));
                assert!(!args.listen);
            }
            other => panic!("expected worker, got {other:?}"),
        }
    }
}
