use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

const REAP_INTERVAL: Duration = Duration::from_millis(10);

/// A worker program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a command line on whitespace. Single and double quotes group
    /// words; there are no escapes.
    pub fn parse(cmdline: &str) -> Result<Self> {
        let mut words = Vec::new();
        let mut current = String::new();
        let mut in_word = false;
        let mut quote: Option<char> = None;

        for ch in cmdline.chars() {
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) => current.push(ch),
                None if ch == '"' || ch == '\'' => {
                    quote = Some(ch);
                    in_word = true;
                }
                None if ch.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                None => {
                    current.push(ch);
                    in_word = true;
                }
            }
        }
        if quote.is_some() {
            return Err(SessionError::InvalidCommand(format!(
                "unterminated quote in `{cmdline}`"
            )));
        }
        if in_word {
            words.push(current);
        }

        let mut words = words.into_iter();
        let program = words
            .next()
            .ok_or_else(|| SessionError::InvalidCommand("empty command line".into()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// The command with the connection endpoint appended as two trailing arguments.
    pub fn with_endpoint(mut self, host: &str, port: u16) -> Self {
        self.args.push(host.to_string());
        self.args.push(port.to_string());
        self
    }
}

impl std::fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A spawned worker whose stdout and stderr share one diagnostic pipe.
pub struct WorkerProcess {
    child: Child,
    pipe: Option<File>,
    exit_code: Option<i32>,
    exited: bool,
    kill_wait: Duration,
}

impl WorkerProcess {
    /// Spawn `command`. The parent keeps the non-blocking read end of the pipe.
    pub fn spawn(command: &WorkerCommand, kill_wait: Duration) -> Result<Self> {
        let spawn_err = |source: io::Error| SessionError::Spawn {
            program: command.program.clone(),
            source,
        };

        let (read_end, write_end) = diagnostic_pipe().map_err(spawn_err)?;
        let stderr_end = write_end.try_clone().map_err(spawn_err)?;

        let child = {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .stdin(Stdio::null())
                .stdout(Stdio::from(write_end))
                .stderr(Stdio::from(stderr_end));
            cmd.spawn().map_err(spawn_err)?
            // `cmd` drops here, closing the parent's copies of the write end.
        };

        info!(pid = child.id(), command = %command, "worker spawned");
        Ok(Self {
            child,
            pipe: Some(File::from(read_end)),
            exit_code: None,
            exited: false,
            kill_wait,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Non-blocking exit check.
    pub fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exited = true;
                self.exit_code = status.code();
                debug!(pid = self.child.id(), code = ?self.exit_code, "worker exited");
                false
            }
            Err(err) => {
                warn!(pid = self.child.id(), error = %err, "worker status check failed");
                self.exited = true;
                false
            }
        }
    }

    /// Exit code, once the worker has been observed to exit normally.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Read whatever console output is pending, without blocking.
    pub fn drain_diagnostics(&mut self) -> String {
        let Some(pipe) = self.pipe.as_mut() else {
            return String::new();
        };
        let pending = match pending_bytes(pipe.as_raw_fd()) {
            Ok(0) => return String::new(),
            Ok(n) => n,
            Err(err) => {
                debug!(error = %err, "diagnostic pipe poll failed");
                return String::new();
            }
        };

        let mut buf = vec![0u8; pending];
        let mut filled = 0usize;
        while filled < pending {
            match pipe.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(error = %err, "diagnostic pipe read failed");
                    break;
                }
            }
        }
        buf.truncate(filled);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Kill the worker, wait a bounded interval for it to exit, release the pipe.
    ///
    /// Safe to call repeatedly.
    pub fn terminate(&mut self) {
        self.pipe = None;
        if !self.is_alive() {
            return;
        }

        if let Err(err) = self.child.kill() {
            if err.kind() != ErrorKind::InvalidInput {
                warn!(pid = self.child.id(), error = %err, "failed to kill worker");
            }
        }

        let deadline = Instant::now() + self.kill_wait;
        while self.is_alive() {
            if Instant::now() >= deadline {
                warn!(pid = self.child.id(), wait = ?self.kill_wait, "worker still running after kill");
                return;
            }
            std::thread::sleep(REAP_INTERVAL);
        }
        info!(pid = self.child.id(), "worker terminated");
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for WorkerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcess")
            .field("pid", &self.child.id())
            .field("exited", &self.exited)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

fn diagnostic_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let (read_end, write_end) = cloexec_pipe()?;
    set_fd_flag(read_end.as_raw_fd(), libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK)?;
    Ok((read_end, write_end))
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "illumos"
))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid array of two c_ints for pipe2(2) to fill.
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2(2) succeeded, so both descriptors are open and owned by no one else.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

// No pipe2 here; a fork between the two calls can still inherit the descriptors.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    target_os = "illumos"
)))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid array of two c_ints for pipe(2) to fill.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by no one else.
    let (read_end, write_end) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_fd_flag(read_end.as_raw_fd(), libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
    set_fd_flag(write_end.as_raw_fd(), libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
    Ok((read_end, write_end))
}

fn set_fd_flag(fd: RawFd, get: libc::c_int, set: libc::c_int, flag: libc::c_int) -> io::Result<()> {
    // SAFETY: `fd` is an open descriptor owned by the caller.
    let current = unsafe { libc::fcntl(fd, get) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above; only adds a flag to the current set.
    if unsafe { libc::fcntl(fd, set, current | flag) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn pending_bytes(fd: RawFd) -> io::Result<usize> {
    let mut available: libc::c_int = 0;
    // SAFETY: FIONREAD writes one c_int to the provided pointer.
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut available as *mut libc::c_int) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(usize::try_from(available).unwrap_or(0))
}
