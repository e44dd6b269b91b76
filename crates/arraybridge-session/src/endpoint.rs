//! The worker's half of a session.
//!
//! A worker is started with the session's host and port as its last two
//! arguments. It connects back (or, in client mode, listens), then answers
//! each request value with exactly one reply value, optionally preceded by
//! diagnostic frames.

use std::net::TcpStream;
use std::time::Duration;

use arraybridge_codec::{
    decode_value, encode_diagnostic, encode_value, ArrayValue, CodecConfig, DiagnosticFrame,
};
use arraybridge_transport::{
    connect_timeout, resolve, BufferedStream, ListenSocket, Readiness, TransportError,
};
use tracing::debug;

use crate::error::{Result, SessionError};

const IDLE_POLL: Duration = Duration::from_millis(100);

/// A connected worker endpoint.
#[derive(Debug)]
pub struct Endpoint {
    transport: BufferedStream,
    codec: CodecConfig,
}

impl Endpoint {
    /// Connect to a session listening on `host:port`.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = resolve(host, port).map_err(|err| match err {
            TransportError::Resolve { host, reason } => SessionError::Resolve { host, reason },
            other => SessionError::Transport(other),
        })?;
        let stream = connect_timeout(&addr, timeout)?;
        debug!(%addr, "worker endpoint connected");
        Self::from_stream(stream, timeout)
    }

    /// Listen on `host:port` and accept one session connection.
    pub fn listen(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let listener = ListenSocket::bind(host, port)?;
        let stream = listener
            .accept_timeout(timeout)?
            .ok_or(SessionError::AcceptTimeout(timeout))?;
        Self::from_stream(stream, timeout)
    }

    /// Wrap an already-connected stream. `timeout` bounds each send and receive.
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<Self> {
        Ok(Self::from_transport(BufferedStream::new(stream, timeout)?))
    }

    pub fn from_transport(transport: BufferedStream) -> Self {
        Self {
            transport,
            codec: CodecConfig::default(),
        }
    }

    /// Wait for the next request. Returns `None` once the session hangs up.
    pub fn recv(&mut self) -> Result<Option<ArrayValue>> {
        loop {
            match self.transport.wait_readable(IDLE_POLL) {
                Ok(Readiness::Ready) => break,
                Ok(Readiness::TimedOut) => continue,
                Err(TransportError::ConnectionClosed) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
        let value = decode_value(&mut self.transport, &self.codec)?;
        Ok(Some(value))
    }

    /// Send one reply value.
    pub fn send(&mut self, value: &ArrayValue) -> Result<()> {
        encode_value(value, &mut self.transport)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Send console text on `stream` ahead of the next reply.
    pub fn send_diagnostic(&mut self, stream: u8, text: &str) -> Result<()> {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let frame = DiagnosticFrame {
            stream,
            dims: vec![lines.len() as u64, 1],
            lines,
        };
        encode_diagnostic(&frame, &mut self.transport)?;
        self.transport.flush()?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use arraybridge_codec::{decode_reply, Reply, STREAM_STDOUT};

    use super::*;

    fn pair() -> (Endpoint, BufferedStream) {
        let listener = ListenSocket::bind("127.0.0.1", 0).expect("listener should bind");
        let port = listener.port();
        let client = thread::spawn(move || {
            Endpoint::connect("127.0.0.1", port, Duration::from_secs(5))
                .expect("endpoint should connect")
        });
        let accepted = listener
            .accept_timeout(Duration::from_secs(5))
            .expect("accept should succeed")
            .expect("endpoint should connect");
        let session_side =
            BufferedStream::new(accepted, Duration::from_secs(5)).expect("stream should wrap");
        (client.join().expect("client thread should finish"), session_side)
    }

    #[test]
    fn recv_and_send() {
        let (mut endpoint, mut session) = pair();
        let request = ArrayValue::record([("id", ArrayValue::scalar(42u64))]);
        encode_value(&request, &mut session).unwrap();
        session.flush().unwrap();

        let received = endpoint.recv().unwrap().expect("request should arrive");
        assert_eq!(received, request);
        endpoint.send(&received).unwrap();

        let reply = decode_reply(&mut session, &CodecConfig::default()).unwrap();
        assert_eq!(reply, Reply::Value(request));
    }

    #[test]
    fn diagnostic_lines_become_elements() {
        let (mut endpoint, mut session) = pair();
        endpoint.send_diagnostic(STREAM_STDOUT, "one\ntwo").unwrap();

        match decode_reply(&mut session, &CodecConfig::default()).unwrap() {
            Reply::Diagnostic(frame) => {
                assert_eq!(frame.stream, STREAM_STDOUT);
                assert_eq!(frame.dims, vec![2, 1]);
                assert_eq!(frame.text(), "one\ntwo");
            }
            other => panic!("expected diagnostic, got {other:?}"),
        }
    }

    #[test]
    fn recv_returns_none_on_hangup() {
        let (mut endpoint, mut session) = pair();
        session.close();
        assert!(endpoint.recv().unwrap().is_none());
    }

    #[test]
    fn listen_times_out_without_session() {
        let err = Endpoint::listen("127.0.0.1", 0, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, SessionError::AcceptTimeout(_)));
    }
}
