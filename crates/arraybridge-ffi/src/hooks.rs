use std::os::raw::c_char;

use arraybridge_session::{Cancelled, HostHooks};

use crate::types::AbHostHooks;

/// Adapts C callbacks to [`HostHooks`].
pub(crate) struct CHost {
    hooks: AbHostHooks,
}

impl CHost {
    /// Copy the callbacks behind `hooks`. Null means no callbacks.
    ///
    /// # Safety
    /// `hooks` must be null or point to a readable `AbHostHooks`.
    pub(crate) unsafe fn from_ptr(hooks: *const AbHostHooks) -> Self {
        let hooks = if hooks.is_null() {
            AbHostHooks::default()
        } else {
            // SAFETY: Pointer validity is guaranteed by the caller.
            unsafe { *hooks }
        };
        Self { hooks }
    }
}

impl HostHooks for CHost {
    fn yield_step(&mut self) -> Result<(), Cancelled> {
        match self.hooks.yield_step {
            Some(callback) if callback(self.hooks.context) != 0 => Err(Cancelled),
            _ => Ok(()),
        }
    }

    fn diagnostics(&mut self, text: &str) {
        if let Some(callback) = self.hooks.diagnostics {
            callback(self.hooks.context, text.as_ptr() as *const c_char, text.len());
        }
    }
}
