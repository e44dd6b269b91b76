//! Shared fixtures for session tests.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use arraybridge_transport::{BufferedStream, ListenSocket};

use crate::config::{SessionConfig, SessionMode};
use crate::endpoint::Endpoint;
use crate::worker::WorkerCommand;

const PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// `sh -c SCRIPT`; appended endpoint arguments land in `$0` and `$1`.
pub(crate) fn sh(script: &str) -> WorkerCommand {
    WorkerCommand::new("sh").arg("-c").arg(script)
}

/// A worker that stays alive but never touches the socket.
pub(crate) fn idle_worker() -> WorkerCommand {
    sh("sleep 30")
}

pub(crate) fn client_config(port: u16) -> SessionConfig {
    SessionConfig::default()
        .with_mode(SessionMode::Client)
        .with_port(port)
        .with_timeout(Duration::from_secs(5))
}

/// Listen on an ephemeral loopback port and run `behavior` on the first connection.
pub(crate) fn spawn_peer<F>(behavior: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(Endpoint) + Send + 'static,
{
    spawn_raw_peer(move |stream| {
        behavior(Endpoint::from_transport(stream));
    })
}

/// Like [`spawn_peer`], but hands over the raw transport.
pub(crate) fn spawn_raw_peer<F>(behavior: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(BufferedStream) + Send + 'static,
{
    let listener = ListenSocket::bind("127.0.0.1", 0).expect("peer listener should bind");
    let port = listener.port();
    let handle = thread::spawn(move || {
        let stream = listener
            .accept_timeout(PEER_TIMEOUT)
            .expect("peer accept should succeed")
            .expect("session should connect to peer");
        let stream = BufferedStream::new(stream, PEER_TIMEOUT).expect("peer stream should wrap");
        behavior(stream);
    });
    (port, handle)
}

/// Answer every request with itself until the session hangs up.
pub(crate) fn echo(mut endpoint: Endpoint) {
    while let Some(request) = endpoint.recv().expect("peer recv should succeed") {
        endpoint.send(&request).expect("peer send should succeed");
    }
}

pub(crate) fn pid_exists(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence and permission.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
