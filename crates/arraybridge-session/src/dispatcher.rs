use std::time::Instant;

use arraybridge_codec::{decode_reply, encode_value, ArrayValue, Reply};
use arraybridge_transport::Readiness;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::host::HostHooks;
use crate::session::{remaining, Session, SessionState};

impl Session {
    /// Send `request` and wait for the worker's reply.
    ///
    /// Exactly one call may be in flight. Any failure after the request has
    /// been handed to the transport closes the session before it is returned.
    pub fn call(&mut self, request: &ArrayValue, host: &mut dyn HostHooks) -> Result<ArrayValue> {
        if self.state != SessionState::Established {
            return Err(SessionError::NotConnected);
        }
        request.validate()?;

        let connected = self
            .transport
            .as_ref()
            .is_some_and(|transport| transport.is_connected());
        if !connected {
            warn!("worker connection lost before call");
            self.close();
            return Err(SessionError::NotConnected);
        }

        match self.exchange(request, host) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                warn!(error = %err, "call failed, closing session");
                self.close();
                Err(err)
            }
        }
    }

    fn exchange(&mut self, request: &ArrayValue, host: &mut dyn HostHooks) -> Result<ArrayValue> {
        self.forward_diagnostics(host);
        {
            let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
            encode_value(request, transport)?;
            transport.flush()?;
        }
        debug!(tag = %request.type_tag(), dims = ?request.dims(), "request sent");

        let timeout = self.config.timeout;
        let slice = self.config.poll_slice;
        let deadline = Instant::now() + timeout;
        loop {
            self.forward_diagnostics(host);

            let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
            match transport.wait_readable(slice.min(remaining(deadline)))? {
                Readiness::Ready => match decode_reply(transport, &self.codec)? {
                    Reply::Value(reply) => {
                        debug!(tag = %reply.type_tag(), dims = ?reply.dims(), "reply received");
                        return Ok(reply);
                    }
                    Reply::Diagnostic(frame) => {
                        debug!(stream = frame.stream, lines = frame.lines.len(), "diagnostic frame");
                        host.diagnostic_frame(&frame);
                        host.yield_step().map_err(|_| SessionError::Interrupted)?;
                        if Instant::now() >= deadline {
                            return Err(SessionError::CallTimeout(timeout));
                        }
                    }
                },
                Readiness::TimedOut => {
                    if Instant::now() >= deadline {
                        return Err(SessionError::CallTimeout(timeout));
                    }
                    host.yield_step().map_err(|_| SessionError::Interrupted)?;
                }
            }
        }
    }
}
