//! arraybridge-ffi: C-ABI exports for the session registry.
//!
//! Requests and replies cross the boundary as wire-encoded bytes; the host
//! owns encoding on its side and frees replies with `ab_buffer_free`.

mod args;
mod buffer;
mod error;
mod hooks;
#[cfg(unix)]
mod session;
mod types;

use std::panic::AssertUnwindSafe;

pub use buffer::ab_buffer_free;
#[cfg(unix)]
pub use session::{
    ab_registry_free, ab_registry_new, ab_session_call, ab_session_start, ab_session_stop,
};
pub use types::{
    AbBuffer, AbDiagnosticsFn, AbHostHooks, AbRegistryHandle, AbResult, AbYieldFn,
    AB_ERR_ACCEPT_TIMEOUT, AB_ERR_ALREADY_STARTED, AB_ERR_CALL_TIMEOUT, AB_ERR_CODEC,
    AB_ERR_CONNECT_TIMEOUT, AB_ERR_INTERNAL, AB_ERR_INTERRUPTED, AB_ERR_INVALID_ARGUMENT,
    AB_ERR_INVALID_COMMAND, AB_ERR_NOT_CONNECTED, AB_ERR_RESOLVE, AB_ERR_SPAWN,
    AB_ERR_TRANSPORT, AB_ERR_WORKER_NOT_RUNNING, AB_OK,
};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

#[no_mangle]
pub extern "C" fn ab_clear_error() {
    ffi_boundary((), error::clear_error_state);
}

/// Message for the last failed call on this thread. Empty after a success.
#[no_mangle]
pub extern "C" fn ab_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}
