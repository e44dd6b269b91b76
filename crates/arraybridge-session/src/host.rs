//! Hooks into the embedding host, invoked between poll slices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arraybridge_codec::DiagnosticFrame;
use tracing::info;

/// Returned by [`HostHooks::yield_step`] to abort the current wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Callbacks the session invokes while it waits.
///
/// Every bounded wait (accept, connect, reply) calls `yield_step` once per
/// slice in which nothing happened; an `Err` aborts the wait with
/// [`crate::SessionError::Interrupted`].
pub trait HostHooks {
    /// Give the host one cooperative step.
    fn yield_step(&mut self) -> Result<(), Cancelled> {
        Ok(())
    }

    /// Console text drained from the worker's stdout/stderr pipe.
    fn diagnostics(&mut self, text: &str);

    /// A diagnostic frame the worker sent over the socket.
    fn diagnostic_frame(&mut self, frame: &DiagnosticFrame) {
        self.diagnostics(&frame.text());
    }
}

/// Discards everything and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHost;

impl HostHooks for NoopHost {
    fn diagnostics(&mut self, _text: &str) {}
}

/// Forwards worker output to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHost;

impl HostHooks for TracingHost {
    fn diagnostics(&mut self, text: &str) {
        for line in text.lines() {
            info!(target: "arraybridge::worker", "{line}");
        }
    }

    fn diagnostic_frame(&mut self, frame: &DiagnosticFrame) {
        for line in &frame.lines {
            info!(target: "arraybridge::worker", stream = frame.stream_name(), "{line}");
        }
    }
}

/// Cancels once a shared flag is raised, e.g. from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Wrap `inner` so its yields also observe this flag.
    pub fn guard<H: HostHooks>(&self, inner: H) -> Interruptible<H> {
        Interruptible {
            flag: self.clone(),
            inner,
        }
    }
}

/// A host that reports cancellation when its [`InterruptFlag`] is raised.
#[derive(Debug)]
pub struct Interruptible<H> {
    flag: InterruptFlag,
    inner: H,
}

impl<H> Interruptible<H> {
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: HostHooks> HostHooks for Interruptible<H> {
    fn yield_step(&mut self) -> Result<(), Cancelled> {
        if self.flag.is_raised() {
            return Err(Cancelled);
        }
        self.inner.yield_step()
    }

    fn diagnostics(&mut self, text: &str) {
        self.inner.diagnostics(text);
    }

    fn diagnostic_frame(&mut self, frame: &DiagnosticFrame) {
        self.inner.diagnostic_frame(frame);
    }
}

/// Collects everything it sees. Used by tests and the CLI.
#[derive(Debug, Default, Clone)]
pub struct CollectingHost {
    pub text: String,
    pub frames: Vec<DiagnosticFrame>,
    pub yields: usize,
}

impl HostHooks for CollectingHost {
    fn yield_step(&mut self) -> Result<(), Cancelled> {
        self.yields += 1;
        Ok(())
    }

    fn diagnostics(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn diagnostic_frame(&mut self, frame: &DiagnosticFrame) {
        self.frames.push(frame.clone());
    }
}

impl<H: HostHooks + ?Sized> HostHooks for &mut H {
    fn yield_step(&mut self) -> Result<(), Cancelled> {
        (**self).yield_step()
    }

    fn diagnostics(&mut self, text: &str) {
        (**self).diagnostics(text);
    }

    fn diagnostic_frame(&mut self, frame: &DiagnosticFrame) {
        (**self).diagnostic_frame(frame);
    }
}
