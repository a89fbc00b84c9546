use log::debug;
use wasmtime::Instance;

use crate::{delete, str_from_raw_parts, wb_func_t, wb_memory_t, wb_store_t};

pub struct wb_instance_t {
    pub(crate) instance: Instance,
}

#[no_mangle]
pub unsafe extern "C" fn wb_instance_delete(instance: *mut wb_instance_t) {
    delete(instance);
}

/// Look up an exported function. Returns null when `name` is not a function
/// export.
#[no_mangle]
pub unsafe extern "C" fn wb_instance_get_func(
    instance: *const wb_instance_t,
    store: *mut wb_store_t,
    name: *const u8,
    name_len: usize,
) -> *mut wb_func_t {
    let instance = (*instance).instance;
    let store = &mut (*store).store;
    let Ok(name) = str_from_raw_parts(name, name_len) else {
        return std::ptr::null_mut();
    };
    match instance.get_func(&mut *store, name) {
        Some(func) => {
            debug!("found function in WASM: {}:{:?}", name, func.ty(&*store));
            Box::into_raw(Box::new(wb_func_t { func }))
        }
        None => std::ptr::null_mut(),
    }
}

/// Look up an exported memory. Returns null when `name` is not a memory
/// export.
#[no_mangle]
pub unsafe extern "C" fn wb_instance_get_memory(
    instance: *const wb_instance_t,
    store: *mut wb_store_t,
    name: *const u8,
    name_len: usize,
) -> *mut wb_memory_t {
    let instance = (*instance).instance;
    let store = &mut (*store).store;
    let Ok(name) = str_from_raw_parts(name, name_len) else {
        return std::ptr::null_mut();
    };
    match instance.get_memory(store, name) {
        Some(memory) => Box::into_raw(Box::new(wb_memory_t { memory })),
        None => std::ptr::null_mut(),
    }
}
