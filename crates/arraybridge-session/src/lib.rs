//! Worker sessions over the array codec.
//!
//! A session spawns a worker process, establishes one loopback TCP
//! connection with it, and then performs blocking request/reply calls.
//! Every wait is split into short slices; between slices the embedding host
//! gets a [`HostHooks::yield_step`] and the worker's console output is
//! forwarded to it. Any failure during a call closes the session.

pub mod config;
#[cfg(unix)]
mod dispatcher;
#[cfg(unix)]
pub mod endpoint;
pub mod error;
pub mod host;
#[cfg(unix)]
pub mod registry;
#[cfg(unix)]
pub mod session;
#[cfg(all(test, unix))]
mod testing;
#[cfg(unix)]
pub mod worker;

pub use config::{SessionConfig, SessionMode};
#[cfg(unix)]
pub use endpoint::Endpoint;
pub use error::{Result, SessionError};
pub use host::{
    Cancelled, CollectingHost, HostHooks, InterruptFlag, Interruptible, NoopHost, TracingHost,
};
#[cfg(unix)]
pub use registry::{SessionId, SessionRegistry};
#[cfg(unix)]
pub use session::{Session, SessionState};
#[cfg(unix)]
pub use worker::{WorkerCommand, WorkerProcess};
