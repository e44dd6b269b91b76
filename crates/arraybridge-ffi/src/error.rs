use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use arraybridge_session::SessionError;

use crate::types::AbResult;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::default();
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let message = message.into();
    let sanitized = message.replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized).unwrap_or_default();
    });
}

pub(crate) fn set_invalid_argument(message: impl Into<String>) -> AbResult {
    set_error_message(message);
    AbResult::InvalidArgument
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

pub(crate) fn map_session_error(err: &SessionError) -> AbResult {
    set_error_message(err.to_string());
    match err {
        SessionError::AlreadyStarted(_) => AbResult::AlreadyStarted,
        SessionError::NotConnected => AbResult::NotConnected,
        SessionError::WorkerNotRunning(_) => AbResult::WorkerNotRunning,
        SessionError::AcceptTimeout(_) => AbResult::AcceptTimeout,
        SessionError::ConnectTimeout(_) => AbResult::ConnectTimeout,
        SessionError::CallTimeout(_) => AbResult::CallTimeout,
        SessionError::Transport(_) => AbResult::TransportError,
        SessionError::Codec(_) => AbResult::CodecError,
        SessionError::Resolve { .. } => AbResult::ResolveError,
        SessionError::Spawn { .. } => AbResult::SpawnFailed,
        SessionError::Interrupted => AbResult::Interrupted,
        SessionError::InvalidCommand(_) => AbResult::InvalidCommand,
        SessionError::Config(_) | SessionError::Json(_) => AbResult::InvalidArgument,
    }
}

pub(crate) fn map_codec_error(err: &arraybridge_codec::CodecError) -> AbResult {
    set_error_message(err.to_string());
    AbResult::CodecError
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}
