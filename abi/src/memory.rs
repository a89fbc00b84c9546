use wasmtime::Memory;

use crate::{delete, handle_result, wb_error_t, wb_store_t};

pub struct wb_memory_t {
    pub(crate) memory: Memory,
}

/// Base address of the linear memory. Invalidated by any call that may grow
/// the memory.
#[no_mangle]
pub unsafe extern "C" fn wb_memory_data(memory: *const wb_memory_t, store: *const wb_store_t) -> *mut u8 {
    (*memory).memory.data_ptr(&(*store).store)
}

/// Current size of the linear memory in bytes.
#[no_mangle]
pub unsafe extern "C" fn wb_memory_data_size(memory: *const wb_memory_t, store: *const wb_store_t) -> usize {
    (*memory).memory.data_size(&(*store).store)
}

/// Grow by `delta` pages, writing the previous size in pages to `prev_pages`.
#[no_mangle]
pub unsafe extern "C" fn wb_memory_grow(
    memory: *const wb_memory_t,
    store: *mut wb_store_t,
    delta: u64,
    prev_pages: *mut u64,
) -> *mut wb_error_t {
    let memory = (*memory).memory;
    let store = &mut (*store).store;
    handle_result(memory.grow(store, delta), |prev| *prev_pages = prev)
}

#[no_mangle]
pub unsafe extern "C" fn wb_memory_delete(memory: *mut wb_memory_t) {
    delete(memory);
}
