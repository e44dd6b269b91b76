use std::io::Write;

use arraybridge_codec::{ArrayValue, STREAM_STDOUT};
use arraybridge_session::Endpoint;
use tracing::{debug, info};

use crate::cmd::{parse_timeout, WorkerArgs};
use crate::exit::{session_error, CliResult, SUCCESS};

/// Echo every request back until the session hangs up.
///
/// A struct request with a string field `diag` first sends that text as a
/// diagnostic frame.
pub fn run(args: WorkerArgs) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;

    if let Some(banner) = &args.banner {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{banner}");
        let _ = out.flush();
    }

    let mut endpoint = if args.listen {
        Endpoint::listen(&args.host, args.port, timeout)
            .map_err(|err| session_error("listen failed", err))?
    } else {
        Endpoint::connect(&args.host, args.port, timeout)
            .map_err(|err| session_error("connect failed", err))?
    };
    info!(host = %args.host, port = args.port, "worker connected");

    let mut served = 0usize;
    while let Some(request) = endpoint
        .recv()
        .map_err(|err| session_error("receive failed", err))?
    {
        if let Some(text) = diagnostic_text(&request) {
            endpoint
                .send_diagnostic(STREAM_STDOUT, text)
                .map_err(|err| session_error("send failed", err))?;
        }
        endpoint
            .send(&request)
            .map_err(|err| session_error("send failed", err))?;
        served = served.saturating_add(1);
    }

    debug!(served, "session closed");
    Ok(SUCCESS)
}

fn diagnostic_text(request: &ArrayValue) -> Option<&str> {
    request.field("diag").and_then(ArrayValue::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diag_field_is_picked_up() {
        let request = ArrayValue::record([
            ("id", ArrayValue::scalar(1i64)),
            ("diag", ArrayValue::string("hello")),
        ]);
        assert_eq!(diagnostic_text(&request), Some("hello"));
    }

    #[test]
    fn other_values_send_no_diagnostic() {
        assert_eq!(diagnostic_text(&ArrayValue::string("diag")), None);
        let numeric = ArrayValue::record([("diag", ArrayValue::scalar(3.0f64))]);
        assert_eq!(diagnostic_text(&numeric), None);
    }
}
