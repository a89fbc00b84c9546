//! Linked modules and their exports.

use wasmbridge_abi::{
    wb_func_delete, wb_func_params, wb_func_results, wb_instance_delete, wb_instance_get_func,
    wb_instance_get_memory, wb_instance_t, wb_valkind_vec_t,
};

use crate::error::BridgeError;
use crate::func::{Direction, Function};
use crate::handle::Handle;
use crate::memory::Memory;
use crate::store::Store;
use crate::types::{FuncType, ValKind};

/// A module linked within a store.
///
/// Must not outlive the store it was instantiated in; use with any other
/// store fails with `StoreMismatch`.
#[derive(Debug)]
pub struct Instance {
    handle: Handle<wb_instance_t>,
    store_id: usize,
}

impl Instance {
    pub(crate) fn new(raw: *mut wb_instance_t, store: &Store) -> Result<Self, BridgeError> {
        let handle = unsafe { Handle::acquire(raw, wb_instance_delete, "instance")? };
        Ok(Self {
            handle,
            store_id: store.id(),
        })
    }

    pub(crate) fn raw(&self) -> Result<*mut wb_instance_t, BridgeError> {
        self.handle.access()
    }

    pub(crate) fn check_store(&self, store: &Store) -> Result<(), BridgeError> {
        if store.id() != self.store_id {
            return Err(BridgeError::StoreMismatch(format!(
                "instance belongs to store {:#x}, used with store {:#x}",
                self.store_id,
                store.id()
            )));
        }
        Ok(())
    }

    /// The exported function `name`, or `None` if there is no such export.
    ///
    /// Exports whose type uses kinds outside the closed set, or that return
    /// more than one value, fail with `UnsupportedType`.
    pub fn get_function(&self, store: &mut Store, name: &str) -> Result<Option<Function>, BridgeError> {
        self.check_store(store)?;
        let raw_store = store.raw()?;
        let raw = unsafe { wb_instance_get_func(self.raw()?, raw_store, name.as_ptr(), name.len()) };
        if raw.is_null() {
            return Ok(None);
        }
        let handle = unsafe { Handle::acquire(raw, wb_func_delete, "function")? };

        let mut params = wb_valkind_vec_t::empty();
        let mut results = wb_valkind_vec_t::empty();
        unsafe {
            wb_func_params(raw, raw_store, &mut params);
            wb_func_results(raw, raw_store, &mut results);
        }
        let params = params
            .as_slice()
            .iter()
            .map(|k| ValKind::from_raw(*k))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| export_error(name, e))?;
        let result = match results.as_slice() {
            [] => None,
            [kind] => Some(ValKind::from_raw(*kind).map_err(|e| export_error(name, e))?),
            many => {
                return Err(BridgeError::UnsupportedType(format!(
                    "export `{}` returns {} values",
                    name,
                    many.len()
                )))
            }
        };

        let ty = FuncType::new(params, result);
        Ok(Some(Function::from_handle(handle, ty, store, Direction::Import)))
    }

    /// The exported linear memory `name`, or `None`.
    pub fn get_memory(&self, store: &mut Store, name: &str) -> Result<Option<Memory>, BridgeError> {
        self.check_store(store)?;
        let raw = unsafe {
            wb_instance_get_memory(self.raw()?, store.raw()?, name.as_ptr(), name.len())
        };
        if raw.is_null() {
            return Ok(None);
        }
        Ok(Some(Memory::new(raw, store)?))
    }
}

fn export_error(name: &str, error: BridgeError) -> BridgeError {
    match error {
        BridgeError::UnsupportedType(msg) => {
            BridgeError::UnsupportedType(format!("export `{}`: {}", name, msg))
        }
        other => other,
    }
}
