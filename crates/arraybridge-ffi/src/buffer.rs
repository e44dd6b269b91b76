use std::ptr;

use crate::error;
use crate::types::{AbBuffer, AbResult};

/// Free bytes held by an [`AbBuffer`] populated by `ab_session_call`.
///
/// # Safety
/// `buffer` must be either null or a valid pointer to an `AbBuffer` created by caller code.
/// If `buffer->data` is non-null, it must have originated from this library.
#[no_mangle]
pub unsafe extern "C" fn ab_buffer_free(buffer: *mut AbBuffer) {
    crate::ffi_boundary((), || {
        if buffer.is_null() {
            return;
        }

        let buffer_ref = {
            // SAFETY: Pointer validity is guaranteed by the caller.
            unsafe { &mut *buffer }
        };
        release(buffer_ref);
    });
}

fn release(buffer: &mut AbBuffer) {
    if !buffer.data.is_null() {
        let slice_ptr = ptr::slice_from_raw_parts_mut(buffer.data, buffer.len);
        // SAFETY: `data` was allocated as `Box<[u8]>` by `write_buffer_out`.
        unsafe {
            drop(Box::from_raw(slice_ptr));
        }
    }
    *buffer = AbBuffer::default();
}

/// Copy `bytes` into a library-owned allocation behind `out`.
///
/// Any payload already held by `out` is freed first.
pub(crate) fn write_buffer_out(out: *mut AbBuffer, bytes: &[u8]) -> AbResult {
    if out.is_null() {
        return error::set_invalid_argument("out_buffer cannot be null");
    }

    let buffer_ref = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &mut *out }
    };
    release(buffer_ref);

    let boxed: Box<[u8]> = bytes.to_vec().into_boxed_slice();
    let len = boxed.len();
    buffer_ref.data = if len == 0 {
        ptr::null_mut()
    } else {
        Box::into_raw(boxed) as *mut u8
    };
    buffer_ref.len = len;

    AbResult::Ok
}
