//! Call out-of-process array workers over a typed binary protocol.
//!
//! arraybridge spawns a worker process, connects to it over loopback TCP, and
//! exchanges self-describing typed arrays with it one request at a time.
//!
//! # Crate Structure
//!
//! - [`transport`]: buffered socket I/O with readiness polling
//! - [`codec`]: the array value model and its wire encoding
//! - [`session`]: worker lifecycle, handshakes, and calls (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use arraybridge_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use arraybridge_codec::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use arraybridge_session::*;
}
