use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use arraybridge_codec::CodecConfig;
use arraybridge_transport::{connect_timeout, resolve, BufferedStream, ListenSocket, TransportError};
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, SessionMode};
use crate::error::{Result, SessionError};
use crate::host::HostHooks;
use crate::worker::{WorkerCommand, WorkerProcess};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    /// Server mode: waiting for the worker to connect back.
    Listening,
    /// Client mode: retrying a connection to the worker's listener.
    Connecting,
    Established,
    /// Terminal. Transport and worker have been released.
    Closed,
}

/// One worker process and the connection to it.
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) state: SessionState,
    pub(crate) worker: Option<WorkerProcess>,
    pub(crate) transport: Option<BufferedStream>,
    pub(crate) codec: CodecConfig,
}

impl Session {
    /// Spawn `command` and establish the connection according to `config.mode`.
    ///
    /// On failure everything acquired so far is released before returning.
    pub fn start(
        config: &SessionConfig,
        command: &WorkerCommand,
        host: &mut dyn HostHooks,
    ) -> Result<Self> {
        match config.mode {
            SessionMode::Server => Self::start_server(config, command, host),
            SessionMode::Client => Self::connect_client(config, command, host),
        }
    }

    /// Bind a listener, hand its address to the worker, and accept one connection.
    pub fn start_server(
        config: &SessionConfig,
        command: &WorkerCommand,
        host: &mut dyn HostHooks,
    ) -> Result<Self> {
        config.validate()?;
        let mut session = Self::created(config);

        let listener = ListenSocket::bind(&config.host, config.port)?;
        let advertised = listener.connect_addr()?;
        let command = command
            .clone()
            .with_endpoint(&advertised.ip().to_string(), advertised.port());

        session.worker = Some(WorkerProcess::spawn(&command, config.kill_wait)?);
        session.state = SessionState::Listening;

        match session.accept(&listener, host) {
            Ok(stream) => {
                drop(listener);
                session.establish(stream)?;
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, "worker handshake failed");
                session.close();
                Err(err)
            }
        }
    }

    /// Spawn the worker, then connect to it at `config.host:config.port`.
    pub fn connect_client(
        config: &SessionConfig,
        command: &WorkerCommand,
        host: &mut dyn HostHooks,
    ) -> Result<Self> {
        config.validate()?;
        let mut session = Self::created(config);

        let addr = resolve(&config.host, config.port).map_err(|err| match err {
            TransportError::Resolve { host, reason } => SessionError::Resolve { host, reason },
            other => SessionError::Transport(other),
        })?;
        let command = command.clone().with_endpoint(&config.host, config.port);

        session.worker = Some(WorkerProcess::spawn(&command, config.kill_wait)?);
        session.state = SessionState::Connecting;

        match session.connect(&addr, host) {
            Ok(stream) => {
                session.establish(stream)?;
                Ok(session)
            }
            Err(err) => {
                warn!(error = %err, %addr, "worker connection failed");
                session.close();
                Err(err)
            }
        }
    }

    fn created(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
            state: SessionState::Created,
            worker: None,
            transport: None,
            codec: CodecConfig::default(),
        }
    }

    fn accept(&mut self, listener: &ListenSocket, host: &mut dyn HostHooks) -> Result<TcpStream> {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            let slice = self.config.poll_slice.min(remaining(deadline));
            if let Some(stream) = listener.accept_timeout(slice)? {
                return Ok(stream);
            }
            self.service_worker(host)?;
            if Instant::now() >= deadline {
                return Err(SessionError::AcceptTimeout(self.config.timeout));
            }
            host.yield_step().map_err(|_| SessionError::Interrupted)?;
        }
    }

    fn connect(&mut self, addr: &SocketAddr, host: &mut dyn HostHooks) -> Result<TcpStream> {
        let deadline = Instant::now() + self.config.connect_ceiling;
        let mut attempts = 0u64;
        loop {
            let slice_end = Instant::now() + self.config.poll_slice;
            attempts += 1;
            match connect_timeout(addr, self.config.poll_slice) {
                Ok(stream) => {
                    debug!(%addr, attempts, "connected to worker");
                    return Ok(stream);
                }
                Err(err) => debug!(%addr, attempts, error = %err, "connect attempt failed"),
            }
            std::thread::sleep(remaining(slice_end));

            self.service_worker(host)?;
            if Instant::now() >= deadline {
                return Err(SessionError::ConnectTimeout(self.config.connect_ceiling));
            }
            host.yield_step().map_err(|_| SessionError::Interrupted)?;
        }
    }

    /// Forward pending worker output, then fail if the worker has exited.
    fn service_worker(&mut self, host: &mut dyn HostHooks) -> Result<()> {
        let Some(worker) = self.worker.as_mut() else {
            return Err(SessionError::WorkerNotRunning(None));
        };
        forward(worker, host);
        if !worker.is_alive() {
            forward(worker, host);
            return Err(SessionError::WorkerNotRunning(worker.exit_code()));
        }
        Ok(())
    }

    fn establish(&mut self, stream: TcpStream) -> Result<()> {
        let transport = match BufferedStream::new(stream, self.config.timeout) {
            Ok(transport) => transport,
            Err(err) => {
                self.close();
                return Err(err.into());
            }
        };
        info!(
            peer = ?transport.peer_addr(),
            pid = self.worker_pid(),
            "session established"
        );
        self.transport = Some(transport);
        self.state = SessionState::Established;
        Ok(())
    }

    /// Forward pending worker console output to `host`.
    pub(crate) fn forward_diagnostics(&mut self, host: &mut dyn HostHooks) {
        if let Some(worker) = self.worker.as_mut() {
            forward(worker, host);
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.worker.as_ref().map(WorkerProcess::pid)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().and_then(BufferedStream::peer_addr)
    }

    /// Close the transport, terminate the worker, and enter `Closed`.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.terminate();
        }
        debug!(from = ?self.state, "session closed");
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("worker", &self.worker)
            .field("transport", &self.transport)
            .finish()
    }
}

fn forward(worker: &mut WorkerProcess, host: &mut dyn HostHooks) {
    let text = worker.drain_diagnostics();
    if !text.is_empty() {
        host.diagnostics(&text);
    }
}

pub(crate) fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::host::{CollectingHost, NoopHost};
    use crate::testing::{client_config, echo, idle_worker, pid_exists, sh, spawn_peer};

    #[test]
    fn accept_times_out_when_worker_never_connects() {
        let config = SessionConfig::default().with_timeout(Duration::from_millis(2000));
        let mut host = CollectingHost::default();

        let started = Instant::now();
        let err = Session::start_server(&config, &idle_worker(), &mut host).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, SessionError::AcceptTimeout(_)), "got {err}");
        assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
        assert!(host.yields >= 10);
    }

    #[test]
    fn exited_worker_fails_with_its_output() {
        let config = SessionConfig::default().with_timeout(Duration::from_secs(5));
        let mut host = CollectingHost::default();

        let err = Session::start_server(&config, &sh("echo bad-args; exit 2"), &mut host)
            .unwrap_err();

        assert!(matches!(err, SessionError::WorkerNotRunning(Some(2))), "got {err}");
        assert!(host.text.contains("bad-args"), "got {:?}", host.text);
    }

    #[test]
    fn worker_receives_endpoint_arguments() {
        let config = SessionConfig::default().with_timeout(Duration::from_secs(5));
        let mut host = CollectingHost::default();

        // `sh -c SCRIPT HOST PORT` binds HOST to $0 and PORT to $1.
        let err = Session::start_server(&config, &sh("echo \"endpoint $0:$1\"; exit 0"), &mut host)
            .unwrap_err();

        assert!(matches!(err, SessionError::WorkerNotRunning(_)));
        assert!(host.text.contains("endpoint 127.0.0.1:"), "got {:?}", host.text);
    }

    #[test]
    fn cancelled_yield_interrupts_accept() {
        struct CancelAfter(usize);
        impl HostHooks for CancelAfter {
            fn yield_step(&mut self) -> std::result::Result<(), crate::host::Cancelled> {
                if self.0 == 0 {
                    return Err(crate::host::Cancelled);
                }
                self.0 -= 1;
                Ok(())
            }
            fn diagnostics(&mut self, _text: &str) {}
        }

        let config = SessionConfig::default().with_timeout(Duration::from_secs(30));
        let started = Instant::now();
        let err = Session::start_server(&config, &idle_worker(), &mut CancelAfter(2)).unwrap_err();
        assert!(matches!(err, SessionError::Interrupted));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn client_mode_establishes_and_closes() {
        let (port, peer) = spawn_peer(echo);
        let config = client_config(port);

        let mut session =
            Session::connect_client(&config, &idle_worker(), &mut NoopHost).expect("session should connect");
        assert_eq!(session.state(), SessionState::Established);
        let pid = session.worker_pid().expect("worker should be running");
        assert!(pid_exists(pid));

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.worker_pid().is_none());
        assert!(!pid_exists(pid));
        session.close();

        peer.join().expect("peer thread should finish");
    }

    #[test]
    fn client_mode_reports_unresolvable_host() {
        let config = client_config(1).with_host("no-such-host.invalid");
        let err = Session::connect_client(&config, &idle_worker(), &mut NoopHost).unwrap_err();
        assert!(matches!(err, SessionError::Resolve { .. }), "got {err}");
    }

    #[test]
    fn client_mode_gives_up_at_ceiling() {
        let unused = ListenSocket::bind("127.0.0.1", 0).expect("placeholder listener should bind");
        let port = unused.port();
        drop(unused);

        let config = client_config(port).with_connect_ceiling(Duration::from_millis(300));
        let err = Session::connect_client(&config, &idle_worker(), &mut NoopHost).unwrap_err();
        assert!(matches!(err, SessionError::ConnectTimeout(_)), "got {err}");
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let config = SessionConfig::default().with_poll_slice(Duration::ZERO);
        let err = Session::start_server(&config, &idle_worker(), &mut NoopHost).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }
}
