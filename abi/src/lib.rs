//! `wasmbridge-abi`: the Wasmtime engine behind an opaque-pointer C ABI.
//!
//! Every engine object crosses this boundary as a raw pointer produced by
//! `Box::into_raw` and is released by the matching `wb_*_delete` function.
//! Fallible operations follow one convention: they return a nullable
//! `*mut wb_error_t` and write their product through an out-parameter.
//!
//! The layout mirrors Wasmtime's own C API:
//!
//! - `wb_engine_t` / `wb_config_t`: compilation environment
//! - `wb_store_t`: one execution context, holding a [`StoreData`]
//! - `wb_module_t`: compiled module
//! - `wb_linker_t` / `wb_instance_t`: import resolution and instantiation
//! - `wb_func_t`: host trampolines and guest exports
//! - `wb_memory_t` / `wb_caller_t`: linear memory access
//! - `wb_val_t`: tagged scalar values
//! - `wb_error_t`: out-of-band diagnostics and traps
//!
//! All functions taking raw pointers are `unsafe`: callers guarantee that
//! non-null pointers were produced by this crate and are still alive.

#![allow(non_camel_case_types)]

mod engine;
mod error;
mod func;
mod instance;
mod linker;
mod memory;
mod module;
mod store;
mod val;
mod vec;

pub use crate::engine::*;
pub use crate::error::*;
pub use crate::func::*;
pub use crate::instance::*;
pub use crate::linker::*;
pub use crate::memory::*;
pub use crate::module::*;
pub use crate::store::*;
pub use crate::val::*;
pub use crate::vec::*;

use std::ffi::c_void;

/// Runs a foreign finalizer over `data` when dropped.
///
/// Host environments handed to [`wb_func_new`] live inside the Wasmtime store
/// and are finalized when the store is deleted.
pub struct ForeignData {
    pub(crate) data: *mut c_void,
    pub(crate) finalizer: Option<extern "C" fn(*mut c_void)>,
}

// The bridge confines every store to a single thread; Wasmtime merely
// requires the bound.
unsafe impl Send for ForeignData {}
unsafe impl Sync for ForeignData {}

impl Drop for ForeignData {
    fn drop(&mut self) {
        if let Some(f) = self.finalizer {
            f(self.data);
        }
    }
}

/// Build a slice from C inputs, ignoring `ptr` when `len` is zero.
pub(crate) unsafe fn slice_from_raw_parts<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len)
    }
}

/// Same as above, but for `*mut`.
pub(crate) unsafe fn slice_from_raw_parts_mut<'a, T>(ptr: *mut T, len: usize) -> &'a mut [T] {
    if len == 0 {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(ptr, len)
    }
}

/// Decode a UTF-8 name passed as `(ptr, len)`.
pub(crate) unsafe fn str_from_raw_parts<'a>(ptr: *const u8, len: usize) -> anyhow::Result<&'a str> {
    let bytes = slice_from_raw_parts(ptr, len);
    std::str::from_utf8(bytes).map_err(|e| anyhow::anyhow!("name is not valid UTF-8: {}", e))
}

/// Hand a result's error to the caller as a `wb_error_t`, or null on success.
pub(crate) fn handle_result<T>(
    result: anyhow::Result<T>,
    ok: impl FnOnce(T),
) -> *mut wb_error_t {
    match result {
        Ok(value) => {
            ok(value);
            std::ptr::null_mut()
        }
        Err(error) => wb_error_t::into_raw(error),
    }
}

/// Release a value created by `Box::into_raw`, tolerating null.
pub(crate) unsafe fn delete<T>(ptr: *mut T) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}
