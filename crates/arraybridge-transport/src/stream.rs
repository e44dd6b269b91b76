use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

use tracing::debug;

use crate::buffer::{Buffer, BUFFER_CAPACITY};
use crate::error::{Result, TransportError};
use crate::poll::{poll_fd, Interest, PollEvent, Readiness};

/// A connected, double-buffered TCP stream.
///
/// Small writes are staged in a fixed output buffer and small reads are
/// served from a fixed input buffer; runs of at least one buffer capacity
/// bypass the buffers and go straight to the socket. Every socket-level send
/// and receive is preceded by a readiness wait bounded by the stream timeout.
pub struct BufferedStream {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    input: Buffer,
    output: Buffer,
    timeout: Duration,
}

impl BufferedStream {
    /// Wrap a connected socket with the default buffer capacity.
    pub fn new(stream: TcpStream, timeout: Duration) -> Result<Self> {
        Self::with_capacity(stream, timeout, BUFFER_CAPACITY)
    }

    /// Wrap a connected socket with an explicit buffer capacity.
    pub fn with_capacity(stream: TcpStream, timeout: Duration, capacity: usize) -> Result<Self> {
        stream.set_nonblocking(false)?;
        // Small header writes are coalesced by the output buffer already.
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        debug!(?peer, ?timeout, capacity, "buffered stream ready");
        Ok(Self {
            stream: Some(stream),
            peer,
            input: Buffer::new(capacity.max(1)),
            output: Buffer::new(capacity.max(1)),
            timeout,
        })
    }

    /// Per-operation timeout applied before every send and receive.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Re-arm the per-operation timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Remote address of the connected peer, if known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Capacity of each of the two buffers.
    pub fn capacity(&self) -> usize {
        self.input.capacity()
    }

    /// Fill `dst` completely.
    pub fn read_exact(&mut self, dst: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < dst.len() {
            if self.input.pending() > 0 {
                filled += self.input.take_into(&mut dst[filled..]);
            } else if dst.len() - filled >= self.input.capacity() {
                let stream = self.stream.as_ref().ok_or(TransportError::Shutdown)?;
                filled += recv_into(stream, self.timeout, &mut dst[filled..])?;
            } else {
                let stream = self.stream.as_ref().ok_or(TransportError::Shutdown)?;
                let n = recv_into(stream, self.timeout, self.input.fill_slice())?;
                self.input.filled(n);
            }
        }
        Ok(())
    }

    /// Stage all of `src` for sending. Nothing is guaranteed to reach the
    /// socket until [`BufferedStream::flush`] returns.
    pub fn write_all(&mut self, src: &[u8]) -> Result<()> {
        let mut written = self.output.stage(src);
        if written == src.len() {
            return Ok(());
        }

        self.flush()?;

        while src.len() - written >= self.output.capacity() {
            let stream = self.stream.as_ref().ok_or(TransportError::Shutdown)?;
            written += send_from(stream, self.timeout, &src[written..])?;
        }

        if written < src.len() {
            self.output.stage(&src[written..]);
        }
        Ok(())
    }

    /// Send every staged byte.
    pub fn flush(&mut self) -> Result<()> {
        while !self.output.is_drained() {
            let stream = self.stream.as_ref().ok_or(TransportError::Shutdown)?;
            let n = send_from(stream, self.timeout, self.output.pending_slice())?;
            self.output.consume(n);
        }
        self.output.reset();
        Ok(())
    }

    /// Wait up to `timeout` for readable data.
    ///
    /// Already-buffered input counts as readable. A readable socket whose
    /// next byte is end-of-stream is reported as [`TransportError::ConnectionClosed`].
    pub fn wait_readable(&self, timeout: Duration) -> Result<Readiness> {
        if self.input.pending() > 0 {
            return Ok(Readiness::Ready);
        }
        let stream = self.stream.as_ref().ok_or(TransportError::Shutdown)?;
        wait_readable(stream, timeout)
    }

    /// Wait up to `timeout` for the socket to accept more data.
    pub fn wait_writable(&self, timeout: Duration) -> Result<Readiness> {
        let stream = self.stream.as_ref().ok_or(TransportError::Shutdown)?;
        wait_writable(stream, timeout)
    }

    /// Non-blocking liveness check: writable with no pending socket error.
    pub fn is_connected(&self) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };
        match poll_fd(stream.as_raw_fd(), Interest::Write, Duration::ZERO) {
            Ok(PollEvent::Ready) => matches!(stream.take_error(), Ok(None)),
            _ => false,
        }
    }

    /// Shut the socket down and release it. Pending output is discarded.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(peer = ?self.peer, "closing buffered stream");
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.input.reset();
        self.output.reset();
    }

    /// Whether [`BufferedStream::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for BufferedStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.input.pending() == 0 {
            let stream = self.stream.as_ref().ok_or(TransportError::Shutdown)?;
            if buf.len() >= self.input.capacity() {
                return Ok(recv_into(stream, self.timeout, buf)?);
            }
            let n = recv_into(stream, self.timeout, self.input.fill_slice())?;
            self.input.filled(n);
        }
        Ok(self.input.take_into(buf))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        BufferedStream::read_exact(self, buf).map_err(io::Error::from)
    }
}

impl Write for BufferedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BufferedStream::write_all(self, buf)?;
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        BufferedStream::write_all(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        BufferedStream::flush(self).map_err(io::Error::from)
    }
}

impl std::fmt::Debug for BufferedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedStream")
            .field("peer", &self.peer)
            .field("open", &self.stream.is_some())
            .field("timeout", &self.timeout)
            .field("buffered_input", &self.input.pending())
            .field("buffered_output", &self.output.pending())
            .finish()
    }
}

pub(crate) fn wait_readable(stream: &TcpStream, timeout: Duration) -> Result<Readiness> {
    match poll_fd(stream.as_raw_fd(), Interest::Read, timeout)? {
        PollEvent::TimedOut => Ok(Readiness::TimedOut),
        PollEvent::HungUp => Err(TransportError::ConnectionClosed),
        PollEvent::Ready => {
            let mut peek_buf = [0u8; 1];
            match stream.peek(&mut peek_buf) {
                Ok(0) => Err(TransportError::ConnectionClosed),
                Ok(_) => Ok(Readiness::Ready),
                Err(err) if err.kind() == ErrorKind::Interrupted => Ok(Readiness::TimedOut),
                Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(Readiness::TimedOut),
                Err(err) => Err(TransportError::Io(err)),
            }
        }
    }
}

pub(crate) fn wait_writable(stream: &TcpStream, timeout: Duration) -> Result<Readiness> {
    match poll_fd(stream.as_raw_fd(), Interest::Write, timeout)? {
        PollEvent::TimedOut => Ok(Readiness::TimedOut),
        PollEvent::HungUp => Err(TransportError::ConnectionClosed),
        PollEvent::Ready => match stream.take_error()? {
            None => Ok(Readiness::Ready),
            Some(err) => Err(TransportError::Socket(err.to_string())),
        },
    }
}

fn recv_into(stream: &TcpStream, timeout: Duration, dst: &mut [u8]) -> Result<usize> {
    loop {
        if !wait_readable(stream, timeout)?.is_ready() {
            return Err(TransportError::Timeout(timeout));
        }
        let mut reader = stream;
        match reader.read(dst) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

fn send_from(stream: &TcpStream, timeout: Duration, src: &[u8]) -> Result<usize> {
    loop {
        if !wait_writable(stream, timeout)?.is_ready() {
            return Err(TransportError::Timeout(timeout));
        }
        let mut writer = stream;
        match writer.write(src) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn write_chunked(stream: &mut BufferedStream, data: &[u8], chunks: &[usize]) {
        let mut offset = 0;
        let mut i = 0;
        while offset < data.len() {
            let n = chunks[i % chunks.len()].min(data.len() - offset);
            stream.write_all(&data[offset..offset + n]).unwrap();
            offset += n;
            i += 1;
        }
        stream.flush().unwrap();
    }

    fn read_chunked(stream: &mut BufferedStream, len: usize, chunks: &[usize]) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let mut offset = 0;
        let mut i = 0;
        while offset < len {
            let n = chunks[i % chunks.len()].min(len - offset);
            stream.read_exact(&mut out[offset..offset + n]).unwrap();
            offset += n;
            i += 1;
        }
        out
    }

    #[test]
    fn small_capacity_chunked_roundtrip() {
        let (a, b) = socket_pair();
        let timeout = Duration::from_secs(5);
        let data = pattern(1000);

        let expected = data.clone();
        let reader = thread::spawn(move || {
            let mut stream = BufferedStream::with_capacity(b, timeout, 16).unwrap();
            read_chunked(&mut stream, expected.len(), &[1, 7, 16, 33, 3])
        });

        let mut writer = BufferedStream::with_capacity(a, timeout, 16).unwrap();
        write_chunked(&mut writer, &data, &[5, 16, 40, 2, 17]);

        assert_eq!(reader.join().unwrap(), data);
    }

    #[test]
    fn large_payload_bypasses_buffers() {
        let (a, b) = socket_pair();
        let timeout = Duration::from_secs(5);
        let data = pattern(5 * BUFFER_CAPACITY + 123);

        let len = data.len();
        let reader = thread::spawn(move || {
            let mut stream = BufferedStream::new(b, timeout).unwrap();
            let mut head = [0u8; 3];
            stream.read_exact(&mut head).unwrap();
            let mut rest = vec![0u8; len - 3];
            stream.read_exact(&mut rest).unwrap();
            let mut all = head.to_vec();
            all.extend_from_slice(&rest);
            all
        });

        let mut writer = BufferedStream::new(a, timeout).unwrap();
        writer.write_all(&data[..10]).unwrap();
        writer.write_all(&data[10..]).unwrap();
        writer.flush().unwrap();

        assert_eq!(reader.join().unwrap(), data);
    }

    #[test]
    fn io_traits_delegate_to_buffers() {
        let (a, b) = socket_pair();
        let timeout = Duration::from_secs(5);
        let mut writer = BufferedStream::with_capacity(a, timeout, 8).unwrap();
        let mut reader = BufferedStream::with_capacity(b, timeout, 8).unwrap();

        Write::write_all(&mut writer, b"hello, buffered world").unwrap();
        Write::flush(&mut writer).unwrap();

        let mut out = [0u8; 21];
        Read::read_exact(&mut reader, &mut out).unwrap();
        assert_eq!(&out, b"hello, buffered world");
    }

    #[test]
    fn unflushed_output_is_not_sent() {
        let (a, b) = socket_pair();
        let mut writer = BufferedStream::new(a, Duration::from_secs(1)).unwrap();
        let reader = BufferedStream::new(b, Duration::from_secs(1)).unwrap();

        writer.write_all(b"staged").unwrap();
        assert_eq!(
            reader.wait_readable(Duration::from_millis(50)).unwrap(),
            Readiness::TimedOut
        );

        writer.flush().unwrap();
        assert_eq!(
            reader.wait_readable(Duration::from_secs(1)).unwrap(),
            Readiness::Ready
        );
    }

    #[test]
    fn read_times_out_without_data() {
        let (a, _b) = socket_pair();
        let mut stream = BufferedStream::new(a, Duration::from_millis(50)).unwrap();
        let mut buf = [0u8; 4];
        let err = stream.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[test]
    fn peer_close_is_reported() {
        let (a, b) = socket_pair();
        let mut stream = BufferedStream::new(a, Duration::from_secs(1)).unwrap();
        drop(b);

        let err = stream.wait_readable(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));

        let mut buf = [0u8; 1];
        let err = stream.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[test]
    fn is_connected_tracks_local_close() {
        let (a, _b) = socket_pair();
        let mut stream = BufferedStream::new(a, Duration::from_secs(1)).unwrap();
        assert!(stream.is_connected());

        stream.close();
        assert!(!stream.is_connected());
        assert!(stream.is_closed());
        assert!(matches!(
            stream.wait_readable(Duration::ZERO),
            Err(TransportError::Shutdown)
        ));
    }

    #[test]
    fn buffered_input_counts_as_readable() {
        let (a, b) = socket_pair();
        let timeout = Duration::from_secs(1);
        let mut writer = BufferedStream::new(a, timeout).unwrap();
        let mut reader = BufferedStream::new(b, timeout).unwrap();

        writer.write_all(b"abcd").unwrap();
        writer.flush().unwrap();

        let mut first = [0u8; 1];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(reader.wait_readable(Duration::ZERO).unwrap(), Readiness::Ready);
    }
}
