//! Bounded readiness waits on raw socket descriptors.

use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Outcome of a bounded readiness wait.
///
/// `TimedOut` is the expected "try again" outcome used by polling loops;
/// fatal conditions are returned as [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Which direction to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interest {
    Read,
    Write,
}

/// Result of a single `poll(2)` call on one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollEvent {
    Ready,
    TimedOut,
    /// Hang-up without readable data.
    HungUp,
}

fn timeout_ms(timeout: Duration) -> libc::c_int {
    let ms = timeout.as_millis();
    // Round sub-millisecond waits up so a non-zero timeout never becomes a busy poll.
    let ms = if ms == 0 && !timeout.is_zero() { 1 } else { ms };
    libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
}

/// Wait for `fd` to become ready in the requested direction.
pub(crate) fn poll_fd(fd: RawFd, interest: Interest, timeout: Duration) -> Result<PollEvent> {
    let events = match interest {
        Interest::Read => libc::POLLIN,
        Interest::Write => libc::POLLOUT,
    };
    let mut pollfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    loop {
        // SAFETY: `pollfd` is a valid, writable array of exactly one element for the
        // duration of the call, and `fd` is a descriptor owned by the caller.
        let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms(timeout)) };

        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Socket(format!("poll failed: {err}")));
        }
        if rc == 0 {
            return Ok(PollEvent::TimedOut);
        }

        if pollfd.revents & libc::POLLNVAL != 0 {
            return Err(TransportError::Socket("invalid socket descriptor".to_string()));
        }
        if pollfd.revents & events != 0 {
            return Ok(PollEvent::Ready);
        }
        if pollfd.revents & libc::POLLERR != 0 {
            return Err(TransportError::Socket("socket reported an error".to_string()));
        }
        if pollfd.revents & libc::POLLHUP != 0 {
            return Ok(PollEvent::HungUp);
        }
        // Spurious wakeup, treat as timeout
        return Ok(PollEvent::TimedOut);
    }
}
