use log::debug;
use wasmtime::{Instance, Store};

use crate::{delete, handle_result, wb_engine_t, wb_error_t};

/// Data held in every Wasmtime store created through the ABI.
#[derive(Default)]
pub struct StoreData {
    /// Instance backing the host call currently in progress, if the caller
    /// supplied one. Host callbacks fall back to it when the call did not
    /// originate from guest code.
    pub(crate) instance: Option<Instance>,
}

pub struct wb_store_t {
    pub(crate) store: Store<StoreData>,
}

#[no_mangle]
pub unsafe extern "C" fn wb_store_new(engine: *const wb_engine_t) -> *mut wb_store_t {
    let engine = &(*engine).engine;
    let store = Store::new(engine, StoreData::default());
    let ptr = Box::into_raw(Box::new(wb_store_t { store }));
    debug!("wb_store_new: {:p}", ptr);
    ptr
}

#[no_mangle]
pub unsafe extern "C" fn wb_store_delete(store: *mut wb_store_t) {
    debug!("wb_store_delete: {:p}", store);
    delete(store);
}

/// Set the remaining fuel. Fails unless the engine consumes fuel.
#[no_mangle]
pub unsafe extern "C" fn wb_store_set_fuel(store: *mut wb_store_t, fuel: u64) -> *mut wb_error_t {
    let store = &mut (*store).store;
    handle_result(store.set_fuel(fuel), |()| {})
}

#[no_mangle]
pub unsafe extern "C" fn wb_store_get_fuel(store: *const wb_store_t, out: *mut u64) -> *mut wb_error_t {
    let store = &(*store).store;
    handle_result(store.get_fuel(), |fuel| *out = fuel)
}
