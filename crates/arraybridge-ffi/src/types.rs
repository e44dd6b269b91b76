use std::ffi::c_void;
use std::os::raw::c_char;

#[cfg(unix)]
use arraybridge_session::SessionRegistry;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbResult {
    Ok = 0,
    InvalidArgument = 1,
    AlreadyStarted = 2,
    NotConnected = 3,
    WorkerNotRunning = 4,
    AcceptTimeout = 5,
    ConnectTimeout = 6,
    CallTimeout = 7,
    TransportError = 8,
    CodecError = 9,
    ResolveError = 10,
    SpawnFailed = 11,
    Interrupted = 12,
    InvalidCommand = 13,
    Internal = 99,
}

pub const AB_OK: AbResult = AbResult::Ok;
pub const AB_ERR_INVALID_ARGUMENT: AbResult = AbResult::InvalidArgument;
pub const AB_ERR_ALREADY_STARTED: AbResult = AbResult::AlreadyStarted;
pub const AB_ERR_NOT_CONNECTED: AbResult = AbResult::NotConnected;
pub const AB_ERR_WORKER_NOT_RUNNING: AbResult = AbResult::WorkerNotRunning;
pub const AB_ERR_ACCEPT_TIMEOUT: AbResult = AbResult::AcceptTimeout;
pub const AB_ERR_CONNECT_TIMEOUT: AbResult = AbResult::ConnectTimeout;
pub const AB_ERR_CALL_TIMEOUT: AbResult = AbResult::CallTimeout;
pub const AB_ERR_TRANSPORT: AbResult = AbResult::TransportError;
pub const AB_ERR_CODEC: AbResult = AbResult::CodecError;
pub const AB_ERR_RESOLVE: AbResult = AbResult::ResolveError;
pub const AB_ERR_SPAWN: AbResult = AbResult::SpawnFailed;
pub const AB_ERR_INTERRUPTED: AbResult = AbResult::Interrupted;
pub const AB_ERR_INVALID_COMMAND: AbResult = AbResult::InvalidCommand;
pub const AB_ERR_INTERNAL: AbResult = AbResult::Internal;

/// Wire-encoded bytes owned by this library. Release with `ab_buffer_free`.
#[repr(C)]
#[derive(Debug)]
pub struct AbBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl Default for AbBuffer {
    fn default() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }
}

/// Returns non-zero to cancel the current wait.
pub type AbYieldFn = extern "C" fn(context: *mut c_void) -> i32;

/// Receives UTF-8 console text (not NUL-terminated).
pub type AbDiagnosticsFn = extern "C" fn(context: *mut c_void, text: *const c_char, len: usize);

/// Host callbacks. Every field may be null.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AbHostHooks {
    pub context: *mut c_void,
    pub yield_step: Option<AbYieldFn>,
    pub diagnostics: Option<AbDiagnosticsFn>,
}

impl Default for AbHostHooks {
    fn default() -> Self {
        Self {
            context: std::ptr::null_mut(),
            yield_step: None,
            diagnostics: None,
        }
    }
}

pub type AbRegistryHandle = *mut c_void;

#[cfg(unix)]
pub(crate) struct RegistryHandle {
    pub(crate) registry: SessionRegistry,
}
