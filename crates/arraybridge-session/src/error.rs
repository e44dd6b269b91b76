use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session with this id is already registered.
    #[error("session {0} is already started")]
    AlreadyStarted(u64),

    /// No established session is available for the call.
    #[error("session is not connected")]
    NotConnected,

    /// The worker process exited before or during connection setup.
    #[error("worker process is not running{}", exit_suffix(.0))]
    WorkerNotRunning(Option<i32>),

    /// The worker never connected back to the listener.
    #[error("worker did not connect within {0:?}")]
    AcceptTimeout(Duration),

    /// The worker's listener never accepted our connection.
    #[error("could not connect to worker within {0:?}")]
    ConnectTimeout(Duration),

    /// No reply arrived within the session timeout.
    #[error("no reply within {0:?}")]
    CallTimeout(Duration),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] arraybridge_transport::TransportError),

    /// Encode or decode failure.
    #[error("codec error: {0}")]
    Codec(arraybridge_codec::CodecError),

    /// The worker endpoint address could not be resolved.
    #[error("cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// The worker process could not be started.
    #[error("failed to spawn worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The host requested cancellation between poll slices.
    #[error("interrupted by host")]
    Interrupted,

    /// The worker command line is empty or malformed.
    #[error("invalid worker command: {0}")]
    InvalidCommand(String),

    /// Session configuration could not be loaded.
    #[error("invalid session config: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit status {code})"),
        None => String::new(),
    }
}

impl SessionError {
    /// Whether this failure leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::CallTimeout(_)
                | SessionError::Transport(_)
                | SessionError::Codec(_)
                | SessionError::Interrupted
        )
    }
}

impl From<arraybridge_codec::CodecError> for SessionError {
    /// Stream failures surfacing through the codec are reported as transport errors.
    fn from(err: arraybridge_codec::CodecError) -> Self {
        match err {
            arraybridge_codec::CodecError::Io(io) => {
                SessionError::Transport(arraybridge_transport::TransportError::from_io(io))
            }
            other => SessionError::Codec(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use std::io;

    use arraybridge_codec::CodecError;
    use arraybridge_transport::TransportError;

    use super::*;

    #[test]
    fn tunnelled_transport_error_is_recovered() {
        let io_err = io::Error::from(TransportError::ConnectionClosed);
        let err = SessionError::from(CodecError::Io(io_err));
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn data_errors_stay_codec_errors() {
        let err = SessionError::from(CodecError::UnsupportedType(1));
        assert!(matches!(err, SessionError::Codec(CodecError::UnsupportedType(1))));
        assert!(err.is_fatal());
        assert!(!SessionError::NotConnected.is_fatal());
    }

    #[test]
    fn worker_exit_status_in_message() {
        assert_eq!(
            SessionError::WorkerNotRunning(Some(3)).to_string(),
            "worker process is not running (exit status 3)"
        );
        assert_eq!(
            SessionError::WorkerNotRunning(None).to_string(),
            "worker process is not running"
        );
    }
}
