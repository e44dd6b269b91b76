//! Timeout-aware buffered TCP transport.
//!
//! This is the lowest layer of arraybridge. It provides:
//! - [`BufferedStream`]: a connected socket with fixed-size input and output
//!   buffers, exact-count reads and writes, and bounded readiness waits
//! - [`ListenSocket`] and [`connect_timeout`]: the accept/connect primitives
//!   used by the session handshake
//!
//! The transport knows nothing about message framing.

pub mod error;

#[cfg(unix)]
mod buffer;
#[cfg(unix)]
pub mod poll;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod tcp;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use buffer::BUFFER_CAPACITY;
#[cfg(unix)]
pub use poll::Readiness;
#[cfg(unix)]
pub use stream::BufferedStream;
#[cfg(unix)]
pub use tcp::{connect_timeout, resolve, ListenSocket, ANY_HOST};
