use std::collections::HashMap;
use std::time::Duration;

use arraybridge_codec::ArrayValue;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::host::HostHooks;
use crate::session::{Session, SessionState};
use crate::worker::WorkerCommand;

/// Opaque session identifier chosen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Live sessions keyed by id.
///
/// Owned by whoever drives calls; there is no global instance.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    defaults: SessionConfig,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `defaults` for every field `start` does not set explicitly.
    pub fn with_defaults(defaults: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &SessionConfig {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn lookup(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn lookup_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    /// Register `session` unless `id` already holds a live one.
    ///
    /// A closed session under `id` is replaced.
    pub fn insert(&mut self, id: SessionId, session: Session) -> Result<()> {
        if self.is_live(id) {
            return Err(SessionError::AlreadyStarted(id.0));
        }
        self.sessions.insert(id, session);
        Ok(())
    }

    /// Unregister `id`, handing the session back.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    fn is_live(&self, id: SessionId) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|session| session.state() != SessionState::Closed)
    }

    /// Start a worker from `cmdline` and register its session under `id`.
    ///
    /// An empty `host` keeps the registry default. A failed start registers nothing.
    pub fn start(
        &mut self,
        id: SessionId,
        cmdline: &str,
        host: &str,
        port: u16,
        timeout: Duration,
        hooks: &mut dyn HostHooks,
    ) -> Result<()> {
        let mut config = self.defaults.clone().with_port(port).with_timeout(timeout);
        if !host.is_empty() {
            config = config.with_host(host);
        }
        let command = WorkerCommand::parse(cmdline)?;
        self.start_with(id, &command, &config, hooks)
    }

    /// Start with an explicit command and config.
    pub fn start_with(
        &mut self,
        id: SessionId,
        command: &WorkerCommand,
        config: &SessionConfig,
        hooks: &mut dyn HostHooks,
    ) -> Result<()> {
        if self.is_live(id) {
            return Err(SessionError::AlreadyStarted(id.0));
        }
        let session = Session::start(config, command, hooks)?;
        info!(%id, pid = session.worker_pid(), "session started");
        self.insert(id, session)
    }

    /// Close and unregister `id`. Returns whether a session was registered.
    pub fn stop(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(mut session) => {
                session.close();
                info!(%id, "session stopped");
                true
            }
            None => false,
        }
    }

    /// Close every session.
    pub fn stop_all(&mut self) {
        for (id, mut session) in self.sessions.drain() {
            debug!(%id, "stopping session");
            session.close();
        }
    }

    /// Perform one call on `id`. A call that closes the session also unregisters it.
    pub fn call(
        &mut self,
        id: SessionId,
        request: &ArrayValue,
        hooks: &mut dyn HostHooks,
    ) -> Result<ArrayValue> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotConnected)?;
        let result = session.call(request, hooks);
        if session.state() == SessionState::Closed {
            self.sessions.remove(&id);
            debug!(%id, "closed session unregistered");
        }
        result
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::endpoint::Endpoint;
    use crate::host::NoopHost;
    use crate::testing::{client_config, echo, idle_worker, spawn_peer};

    const ID: SessionId = SessionId(7);

    #[test]
    fn accept_timeout_registers_nothing() {
        let mut registry = SessionRegistry::new();
        let started = Instant::now();
        let err = registry
            .start(ID, "sh -c 'sleep 30'", "", 0, Duration::from_millis(2000), &mut NoopHost)
            .unwrap_err();

        assert!(matches!(err, SessionError::AcceptTimeout(_)), "got {err}");
        assert!(started.elapsed() >= Duration::from_millis(1900));
        assert!(!registry.contains(ID));
        assert!(registry.is_empty());
    }

    #[test]
    fn call_without_start_is_not_connected() {
        let mut registry = SessionRegistry::new();
        let err = registry
            .call(ID, &ArrayValue::empty(), &mut NoopHost)
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }

    #[test]
    fn empty_command_is_rejected() {
        let mut registry = SessionRegistry::new();
        let err = registry
            .start(ID, "  ", "", 0, Duration::from_secs(1), &mut NoopHost)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidCommand(_)));
    }

    #[test]
    fn double_start_leaves_existing_session() {
        let (port, peer) = spawn_peer(echo);
        let config = client_config(port);
        let mut registry = SessionRegistry::new();
        registry
            .start_with(ID, &idle_worker(), &config, &mut NoopHost)
            .expect("first start should succeed");
        let pid = registry.lookup(ID).and_then(Session::worker_pid);

        let err = registry
            .start_with(ID, &idle_worker(), &config, &mut NoopHost)
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyStarted(7)));
        assert_eq!(registry.lookup(ID).and_then(Session::worker_pid), pid);

        let reply = registry
            .call(ID, &ArrayValue::string("still here"), &mut NoopHost)
            .expect("existing session should still work");
        assert_eq!(reply.as_str(), Some("still here"));

        assert!(registry.stop(ID));
        assert!(!registry.stop(ID));
        peer.join().expect("peer thread should finish");
    }

    #[test]
    fn fatal_call_unregisters_session() {
        let (port, peer) = spawn_peer(|mut endpoint: Endpoint| {
            let _request = endpoint.recv().expect("recv should succeed");
            endpoint.close();
        });
        let mut registry = SessionRegistry::new();
        registry
            .start_with(ID, &idle_worker(), &client_config(port), &mut NoopHost)
            .expect("start should succeed");

        let err = registry
            .call(ID, &ArrayValue::scalar(1.0f64), &mut NoopHost)
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)), "got {err}");
        assert!(!registry.contains(ID));

        let err = registry
            .call(ID, &ArrayValue::scalar(1.0f64), &mut NoopHost)
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        peer.join().expect("peer thread should finish");
    }

    #[test]
    fn stop_closes_session() {
        let (port, peer) = spawn_peer(echo);
        let mut registry = SessionRegistry::new();
        registry
            .start_with(ID, &idle_worker(), &client_config(port), &mut NoopHost)
            .expect("start should succeed");
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![ID]);

        assert!(registry.stop(ID));
        assert!(registry.is_empty());
        peer.join().expect("peer thread should finish");
    }
}
