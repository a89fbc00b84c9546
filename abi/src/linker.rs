use log::debug;
use wasmtime::Linker;

use crate::{
    delete, handle_result, str_from_raw_parts, wb_engine_t, wb_error_t, wb_func_t,
    wb_instance_t, wb_module_t, wb_store_t, StoreData,
};

pub struct wb_linker_t {
    pub(crate) linker: Linker<StoreData>,
}

#[no_mangle]
pub unsafe extern "C" fn wb_linker_new(engine: *const wb_engine_t) -> *mut wb_linker_t {
    let engine = &(*engine).engine;
    Box::into_raw(Box::new(wb_linker_t {
        linker: Linker::new(engine),
    }))
}

#[no_mangle]
pub unsafe extern "C" fn wb_linker_allow_shadowing(linker: *mut wb_linker_t, allow_shadowing: bool) {
    (*linker).linker.allow_shadowing(allow_shadowing);
}

#[no_mangle]
pub unsafe extern "C" fn wb_linker_delete(linker: *mut wb_linker_t) {
    delete(linker);
}

/// Define `module::name` as `func`. Fails on redefinition unless shadowing
/// is allowed.
#[no_mangle]
pub unsafe extern "C" fn wb_linker_define_func(
    linker: *mut wb_linker_t,
    store: *const wb_store_t,
    module: *const u8,
    module_len: usize,
    name: *const u8,
    name_len: usize,
    func: *const wb_func_t,
) -> *mut wb_error_t {
    let linker = &mut (*linker).linker;
    let store = &(*store).store;
    let func = (*func).func;
    let result = str_from_raw_parts(module, module_len).and_then(|module| {
        let name = str_from_raw_parts(name, name_len)?;
        debug!("wb_linker_define_func: {}::{}", module, name);
        linker.define(store, module, name, func)?;
        Ok(())
    });
    handle_result(result, |()| {})
}

/// Returns true if `module::name` is already defined in this linker.
#[no_mangle]
pub unsafe extern "C" fn wb_linker_has(
    linker: *const wb_linker_t,
    store: *mut wb_store_t,
    module: *const u8,
    module_len: usize,
    name: *const u8,
    name_len: usize,
) -> bool {
    let linker = &(*linker).linker;
    let store = &mut (*store).store;
    let (module, name) = match (
        str_from_raw_parts(module, module_len),
        str_from_raw_parts(name, name_len),
    ) {
        (Ok(module), Ok(name)) => (module, name),
        _ => return false,
    };
    linker.get(store, module, name).is_some()
}

#[no_mangle]
pub unsafe extern "C" fn wb_linker_instantiate(
    linker: *const wb_linker_t,
    store: *mut wb_store_t,
    module: *const wb_module_t,
    out: *mut *mut wb_instance_t,
) -> *mut wb_error_t {
    let linker = &(*linker).linker;
    let store = &mut (*store).store;
    let module = &(*module).module;
    handle_result(linker.instantiate(store, module), |instance| {
        *out = Box::into_raw(Box::new(wb_instance_t { instance }));
    })
}
