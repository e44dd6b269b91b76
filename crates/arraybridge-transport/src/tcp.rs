use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::poll::{poll_fd, Interest, PollEvent};

/// Host used when a listener is asked to bind to "any" interface.
pub const ANY_HOST: &str = "0.0.0.0";

/// Resolve `host:port` to a single socket address, preferring IPv4.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let host = if host.is_empty() { ANY_HOST } else { host };
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|err| TransportError::Resolve {
            host: host.to_string(),
            reason: err.to_string(),
        })?
        .collect();

    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
        .ok_or_else(|| TransportError::Resolve {
            host: host.to_string(),
            reason: "no addresses returned".to_string(),
        })
}

/// A bound TCP listener that accepts exactly the connections it is polled for.
pub struct ListenSocket {
    listener: TcpListener,
    host: String,
    port: u16,
}

impl ListenSocket {
    /// Bind to `host:port`. Port 0 selects an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = resolve(host, port)?;
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local = listener.local_addr()?;
        let host = if host.is_empty() {
            ANY_HOST.to_string()
        } else {
            host.to_string()
        };

        info!(%local, "listening for worker connection");

        Ok(Self {
            listener,
            host,
            port: local.port(),
        })
    }

    /// The host string this listener was bound with, as passed to workers.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The actual bound port (resolved when binding to port 0).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }

    /// Address a local client should connect to. "Any" addresses map to loopback.
    pub fn connect_addr(&self) -> Result<SocketAddr> {
        let local = self.local_addr()?;
        if local.ip().is_unspecified() {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port()));
        }
        Ok(local)
    }

    /// Wait up to `timeout` for a pending connection and accept it.
    ///
    /// Returns `Ok(None)` when no connection arrived in time.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<TcpStream>> {
        match poll_fd(self.listener.as_raw_fd(), Interest::Read, timeout)? {
            PollEvent::TimedOut => Ok(None),
            PollEvent::HungUp => Err(TransportError::Accept(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "listening socket hung up",
            ))),
            PollEvent::Ready => {
                let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
                debug!(%peer, "accepted connection");
                Ok(Some(stream))
            }
        }
    }
}

impl std::fmt::Debug for ListenSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenSocket")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Attempt one connection to `addr`, bounded by `timeout`.
pub fn connect_timeout(addr: &SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let timeout = if timeout.is_zero() {
        Duration::from_millis(1)
    } else {
        timeout
    };
    let stream = TcpStream::connect_timeout(addr, timeout).map_err(|source| {
        TransportError::Connect {
            addr: addr.to_string(),
            source,
        }
    })?;
    debug!(%addr, "connected");
    Ok(stream)
}
