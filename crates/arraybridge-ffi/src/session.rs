use std::os::raw::c_char;
use std::time::Duration;

use arraybridge_codec::{from_slice, to_bytes};
use arraybridge_session::{SessionId, SessionRegistry};

use crate::args;
use crate::buffer::write_buffer_out;
use crate::error;
use crate::hooks::CHost;
use crate::types::{AbBuffer, AbHostHooks, AbRegistryHandle, AbResult, RegistryHandle};

fn with_registry_mut<T>(
    handle: AbRegistryHandle,
    on_error: T,
    f: impl FnOnce(&mut RegistryHandle) -> T,
) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("registry handle cannot be null");
        return on_error;
    }

    let registry_handle = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &mut *(handle as *mut RegistryHandle) }
    };

    f(registry_handle)
}

/// Create an empty session registry.
#[no_mangle]
pub extern "C" fn ab_registry_new() -> AbRegistryHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();
        let handle = RegistryHandle {
            registry: SessionRegistry::new(),
        };
        Box::into_raw(Box::new(handle)) as AbRegistryHandle
    })
}

/// Stop every session and free the registry.
///
/// # Safety
/// `registry` must be null or a handle returned by `ab_registry_new`.
#[no_mangle]
pub unsafe extern "C" fn ab_registry_free(registry: AbRegistryHandle) {
    crate::ffi_boundary((), || {
        if registry.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by ab_registry_new.
        unsafe {
            drop(Box::from_raw(registry as *mut RegistryHandle));
        }
    });
}

/// Spawn `cmdline` with the bound host and port appended, and wait for it to connect.
///
/// A null or empty `host` binds the loopback interface; port 0 picks a free port.
///
/// # Safety
/// `registry` must be a valid registry handle. `cmdline` must be a non-null UTF-8 C string;
/// `host` must be null or a UTF-8 C string. `hooks` must be null or readable.
#[no_mangle]
pub unsafe extern "C" fn ab_session_start(
    registry: AbRegistryHandle,
    id: u64,
    cmdline: *const c_char,
    host: *const c_char,
    port: u16,
    timeout_ms: u64,
    hooks: *const AbHostHooks,
) -> AbResult {
    crate::ffi_boundary(AbResult::Internal, || {
        error::clear_error_state();

        let cmdline = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(cmdline, "cmdline") } {
                Some(v) => v,
                None => return AbResult::InvalidArgument,
            }
        };
        let host = {
            // SAFETY: We validate UTF-8 in helper.
            match unsafe { args::optional_str_arg(host, "host") } {
                Some(v) => v,
                None => return AbResult::InvalidArgument,
            }
        };
        if timeout_ms == 0 {
            return error::set_invalid_argument("timeout_ms must be non-zero");
        }
        let mut host_hooks = {
            // SAFETY: Caller guarantees `hooks` is null or readable.
            unsafe { CHost::from_ptr(hooks) }
        };

        with_registry_mut(registry, AbResult::InvalidArgument, |handle| {
            match handle.registry.start(
                SessionId(id),
                cmdline,
                host,
                port,
                Duration::from_millis(timeout_ms),
                &mut host_hooks,
            ) {
                Ok(()) => AbResult::Ok,
                Err(err) => error::map_session_error(&err),
            }
        })
    })
}

/// Close session `id`. Stopping an unknown id is not an error.
///
/// # Safety
/// `registry` must be a valid registry handle.
#[no_mangle]
pub unsafe extern "C" fn ab_session_stop(registry: AbRegistryHandle, id: u64) -> AbResult {
    crate::ffi_boundary(AbResult::Internal, || {
        error::clear_error_state();

        with_registry_mut(registry, AbResult::InvalidArgument, |handle| {
            handle.registry.stop(SessionId(id));
            AbResult::Ok
        })
    })
}

/// Send one wire-encoded request and receive the wire-encoded reply in `out_buffer`.
///
/// A failure that closes the session also unregisters `id`.
///
/// # Safety
/// `registry` must be a valid registry handle. If `len > 0`, `request` must be readable for
/// `len` bytes. `hooks` must be null or readable. `out_buffer` must be a valid writable
/// pointer; if it already holds bytes from this library they are freed first.
#[no_mangle]
pub unsafe extern "C" fn ab_session_call(
    registry: AbRegistryHandle,
    id: u64,
    request: *const u8,
    len: usize,
    hooks: *const AbHostHooks,
    out_buffer: *mut AbBuffer,
) -> AbResult {
    crate::ffi_boundary(AbResult::Internal, || {
        error::clear_error_state();

        if out_buffer.is_null() {
            return error::set_invalid_argument("out_buffer cannot be null");
        }
        let request = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::bytes_arg(request, len, "request") } {
                Some(v) => v,
                None => return AbResult::InvalidArgument,
            }
        };
        let request = match from_slice(request) {
            Ok(value) => value,
            Err(err) => return error::map_codec_error(&err),
        };
        let mut host_hooks = {
            // SAFETY: Caller guarantees `hooks` is null or readable.
            unsafe { CHost::from_ptr(hooks) }
        };

        with_registry_mut(registry, AbResult::InvalidArgument, |handle| {
            let reply = match handle
                .registry
                .call(SessionId(id), &request, &mut host_hooks)
            {
                Ok(reply) => reply,
                Err(err) => return error::map_session_error(&err),
            };
            match to_bytes(&reply) {
                Ok(bytes) => write_buffer_out(out_buffer, &bytes),
                Err(err) => error::map_codec_error(&err),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::{c_void, CString};
    use std::thread::JoinHandle;

    use arraybridge_codec::ArrayValue;
    use arraybridge_session::Endpoint;

    use super::*;
    use crate::ab_buffer_free;

    /// Test host: parses the endpoint the worker echoes and connects an echo peer to it.
    #[derive(Default)]
    struct Announce {
        text: String,
        peer: Option<JoinHandle<()>>,
    }

    extern "C" fn on_diagnostics(context: *mut c_void, text: *const c_char, len: usize) {
        // SAFETY: Tests pass a live `Announce`; `text` is valid for `len` bytes.
        let (state, bytes) = unsafe {
            (
                &mut *(context as *mut Announce),
                std::slice::from_raw_parts(text as *const u8, len),
            )
        };
        state.text.push_str(&String::from_utf8_lossy(bytes));

        if state.peer.is_some() {
            return;
        }
        let Some(line) = state.text.lines().find(|l| l.starts_with("endpoint ")) else {
            return;
        };
        let mut parts = line.trim_start_matches("endpoint ").split_whitespace();
        let (Some(host), Some(port)) = (parts.next(), parts.next()) else {
            return;
        };
        let host = host.to_string();
        let port: u16 = port.parse().expect("port should parse");
        state.peer = Some(std::thread::spawn(move || {
            let mut endpoint = Endpoint::connect(&host, port, Duration::from_secs(5))
                .expect("peer should connect");
            while let Some(request) = endpoint.recv().expect("peer recv should succeed") {
                endpoint.send(&request).expect("peer send should succeed");
            }
        }));
    }

    fn hooks_for(state: &mut Announce) -> AbHostHooks {
        AbHostHooks {
            context: state as *mut Announce as *mut c_void,
            yield_step: None,
            diagnostics: Some(on_diagnostics),
        }
    }

    #[test]
    fn start_call_stop_roundtrip() {
        let registry = ab_registry_new();
        let cmdline = CString::new("sh -c 'echo endpoint $0 $1; sleep 30'").unwrap();
        let mut state = Announce::default();
        let hooks = hooks_for(&mut state);

        // SAFETY: All pointers are live locals for the duration of each call.
        unsafe {
            let result = ab_session_start(
                registry,
                1,
                cmdline.as_ptr(),
                std::ptr::null(),
                0,
                5_000,
                &hooks,
            );
            assert_eq!(result, AbResult::Ok, "start failed: {}", state.text);

            let request = to_bytes(&ArrayValue::record([
                ("id", ArrayValue::scalar(42u64)),
                ("name", ArrayValue::string("x")),
            ]))
            .unwrap();
            let mut out = AbBuffer::default();
            let result = ab_session_call(
                registry,
                1,
                request.as_ptr(),
                request.len(),
                std::ptr::null(),
                &mut out,
            );
            assert_eq!(result, AbResult::Ok);
            let reply = std::slice::from_raw_parts(out.data, out.len);
            assert_eq!(reply, request.as_ref());
            ab_buffer_free(&mut out);

            assert_eq!(
                ab_session_start(registry, 1, cmdline.as_ptr(), std::ptr::null(), 0, 5_000, &hooks),
                AbResult::AlreadyStarted
            );

            assert_eq!(ab_session_stop(registry, 1), AbResult::Ok);
            assert_eq!(ab_session_stop(registry, 1), AbResult::Ok);
            ab_registry_free(registry);
        }

        state
            .peer
            .take()
            .expect("peer should have been started")
            .join()
            .expect("peer thread should finish");
    }

    #[test]
    fn exited_worker_reports_code() {
        let registry = ab_registry_new();
        let cmdline = CString::new("sh -c 'exit 4'").unwrap();

        // SAFETY: All pointers are live locals for the duration of each call.
        unsafe {
            let result = ab_session_start(
                registry,
                9,
                cmdline.as_ptr(),
                std::ptr::null(),
                0,
                5_000,
                std::ptr::null(),
            );
            assert_eq!(result, AbResult::WorkerNotRunning);

            let message = std::ffi::CStr::from_ptr(crate::ab_last_error());
            assert!(message.to_string_lossy().contains("exit status 4"));
            ab_registry_free(registry);
        }
    }

    #[test]
    fn call_on_unknown_id_is_not_connected() {
        let registry = ab_registry_new();
        let request = to_bytes(&ArrayValue::empty()).unwrap();
        let mut out = AbBuffer::default();

        // SAFETY: All pointers are live locals for the duration of each call.
        unsafe {
            let result = ab_session_call(
                registry,
                5,
                request.as_ptr(),
                request.len(),
                std::ptr::null(),
                &mut out,
            );
            assert_eq!(result, AbResult::NotConnected);
            assert!(out.data.is_null());
            ab_registry_free(registry);
        }
    }

    #[test]
    fn malformed_request_is_codec_error() {
        let registry = ab_registry_new();
        let garbage = [0xFFu8; 12];
        let mut out = AbBuffer::default();

        // SAFETY: All pointers are live locals for the duration of each call.
        unsafe {
            let result = ab_session_call(
                registry,
                5,
                garbage.as_ptr(),
                garbage.len(),
                std::ptr::null(),
                &mut out,
            );
            assert_eq!(result, AbResult::CodecError);
            ab_registry_free(registry);
        }
    }

    #[test]
    fn oversized_declared_length_is_codec_error() {
        let registry = ab_registry_new();
        let mut request = Vec::new();
        request.extend_from_slice(&2i32.to_ne_bytes());
        request.extend_from_slice(&2u64.to_ne_bytes());
        request.extend_from_slice(&1u64.to_ne_bytes());
        request.extend_from_slice(&1u64.to_ne_bytes());
        request.extend_from_slice(&(1u64 << 40).to_ne_bytes());
        let mut out = AbBuffer::default();

        // SAFETY: All pointers are live locals for the duration of each call.
        unsafe {
            let result = ab_session_call(
                registry,
                5,
                request.as_ptr(),
                request.len(),
                std::ptr::null(),
                &mut out,
            );
            assert_eq!(result, AbResult::CodecError);
            assert!(out.data.is_null());
            ab_registry_free(registry);
        }
    }

    #[test]
    fn null_arguments_are_rejected() {
        // SAFETY: Null handles and strings are checked before use.
        unsafe {
            assert_eq!(
                ab_session_start(
                    std::ptr::null_mut(),
                    1,
                    std::ptr::null(),
                    std::ptr::null(),
                    0,
                    1_000,
                    std::ptr::null(),
                ),
                AbResult::InvalidArgument
            );
            assert_eq!(ab_session_stop(std::ptr::null_mut(), 1), AbResult::InvalidArgument);
            ab_registry_free(std::ptr::null_mut());
        }
    }
}
