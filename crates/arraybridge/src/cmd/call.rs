use std::fs;
use std::time::Instant;

use arraybridge_codec::ArrayValue;
use arraybridge_session::{
    InterruptFlag, SessionConfig, SessionId, SessionMode, SessionRegistry, TracingHost,
    WorkerCommand,
};
use tracing::debug;

use crate::cmd::{parse_timeout, CallArgs, ModeArg};
use crate::exit::{io_error, session_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::json::to_array;
use crate::output::{print_reply, OutputFormat};

const SESSION: SessionId = SessionId(1);

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let config = resolve_config(&args)?;
    let command =
        WorkerCommand::parse(&args.worker).map_err(|err| session_error("invalid --worker", err))?;
    let request = resolve_request(&args)?;

    let interrupt = InterruptFlag::new();
    install_ctrlc_handler(interrupt.clone())?;
    let mut host = interrupt.guard(TracingHost);

    let mut registry = SessionRegistry::with_defaults(config.clone());
    registry
        .start_with(SESSION, &command, &config, &mut host)
        .map_err(|err| session_error("start failed", err))?;

    let started = Instant::now();
    let reply = registry.call(SESSION, &request, &mut host);
    let elapsed_ms = started.elapsed().as_millis();
    registry.stop(SESSION);

    let reply = reply.map_err(|err| session_error("call failed", err))?;
    debug!(elapsed_ms, "call completed");
    print_reply(&reply, elapsed_ms, format)?;
    Ok(SUCCESS)
}

fn resolve_config(args: &CallArgs) -> CliResult<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)
            .map_err(|err| session_error(&format!("failed loading {}", path.display()), err))?,
        None => SessionConfig::default(),
    };
    if let Some(mode) = args.mode {
        config = config.with_mode(match mode {
            ModeArg::Server => SessionMode::Server,
            ModeArg::Client => SessionMode::Client,
        });
    }
    if let Some(host) = &args.host {
        config = config.with_host(host.as_str());
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(timeout) = &args.timeout {
        config = config.with_timeout(parse_timeout(timeout)?);
    }
    Ok(config)
}

fn resolve_request(args: &CallArgs) -> CliResult<ArrayValue> {
    let raw = match (&args.json, &args.file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        (None, None) => return Err(CliError::new(USAGE, "one of --json or --file is required")),
    };
    let json: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| CliError::new(USAGE, format!("request is not valid JSON: {err}")))?;
    Ok(to_array(&json))
}

fn install_ctrlc_handler(interrupt: InterruptFlag) -> CliResult<()> {
    ctrlc::set_handler(move || interrupt.raise())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
