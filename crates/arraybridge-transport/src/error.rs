use std::io;
use std::time::Duration;

/// Errors that can occur in transport operations.
///
/// Every variant is fatal to the session that owns the transport; the
/// expected "nothing ready yet" outcome of a poll is reported through
/// [`crate::Readiness`] instead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host name could not be resolved to a socket address.
    #[error("failed to resolve '{host}': {reason}")]
    Resolve { host: String, reason: String },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(io::Error),

    /// A bounded wait before a send or receive expired.
    #[error("transport timeout after {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The socket reported an error condition while polling.
    #[error("socket error: {0}")]
    Socket(String),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Recover a transport error that was tunnelled through `std::io::Error`.
    ///
    /// [`crate::BufferedStream`] implements `Read`/`Write` by wrapping its own
    /// errors; this undoes that wrapping so callers can match on variants.
    pub fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_none() {
            return TransportError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<TransportError>() {
                Ok(transport) => *transport,
                Err(other) => TransportError::Io(io::Error::new(kind, other)),
            },
            None => TransportError::Io(io::Error::from(kind)),
        }
    }

    /// The `io::ErrorKind` used when tunnelling this error through `std::io`.
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            TransportError::Timeout(_) => io::ErrorKind::TimedOut,
            TransportError::ConnectionClosed => io::ErrorKind::UnexpectedEof,
            TransportError::Shutdown => io::ErrorKind::NotConnected,
            TransportError::Io(err) => err.kind(),
            _ => io::ErrorKind::Other,
        }
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(io) => io,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
