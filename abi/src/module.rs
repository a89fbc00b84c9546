use log::debug;
use wasmtime::Module;

use crate::{delete, handle_result, slice_from_raw_parts, wb_engine_t, wb_error_t};

pub struct wb_module_t {
    pub(crate) module: Module,
}

/// Compile binary or text-format WebAssembly.
#[no_mangle]
pub unsafe extern "C" fn wb_module_new(
    engine: *const wb_engine_t,
    bytes: *const u8,
    len: usize,
    out: *mut *mut wb_module_t,
) -> *mut wb_error_t {
    let engine = &(*engine).engine;
    let bytes = slice_from_raw_parts(bytes, len);
    debug!("wb_module_new: compiling {} bytes", len);
    handle_result(Module::new(engine, bytes), |module| {
        *out = Box::into_raw(Box::new(wb_module_t { module }));
    })
}

/// Validate binary WebAssembly without compiling it.
#[no_mangle]
pub unsafe extern "C" fn wb_module_validate(
    engine: *const wb_engine_t,
    bytes: *const u8,
    len: usize,
) -> *mut wb_error_t {
    let engine = &(*engine).engine;
    let bytes = slice_from_raw_parts(bytes, len);
    handle_result(Module::validate(engine, bytes), |()| {})
}

#[no_mangle]
pub unsafe extern "C" fn wb_module_delete(module: *mut wb_module_t) {
    delete(module);
}
