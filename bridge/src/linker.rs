//! Host function registration and instantiation.

use std::ptr;

use log::debug;
use wasmbridge_abi::{wb_linker_define_func, wb_linker_has, wb_linker_instantiate, wb_linker_t};

use crate::error::{check, BridgeError};
use crate::func::Function;
use crate::handle::Handle;
use crate::instance::Instance;
use crate::module::Module;
use crate::store::Store;

/// One host function to register under `module::name`.
#[derive(Debug)]
pub struct FunctionDef {
    pub module: String,
    pub name: String,
    pub function: Function,
}

impl FunctionDef {
    pub fn new(module: impl Into<String>, name: impl Into<String>, function: Function) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            function,
        }
    }
}

/// A host object that contributes a group of functions to a linker.
pub trait Exportable {
    /// Build the functions in `store`, each with its namespace and symbol.
    fn functions(&self, store: &mut Store) -> Result<Vec<FunctionDef>, BridgeError>;
}

/// Accumulates `(namespace, symbol) -> Function` bindings.
///
/// A linker is scoped to the first store it is used with.
#[derive(Debug)]
pub struct Linker {
    handle: Handle<wb_linker_t>,
    allow_shadowing: bool,
    store_id: Option<usize>,
}

impl Linker {
    pub(crate) fn new(handle: Handle<wb_linker_t>, allow_shadowing: bool) -> Self {
        Self {
            handle,
            allow_shadowing,
            store_id: None,
        }
    }

    fn bind_store(&mut self, store: &Store) -> Result<(), BridgeError> {
        self.check_store(store)?;
        self.store_id = Some(store.id());
        Ok(())
    }

    fn check_store(&self, store: &Store) -> Result<(), BridgeError> {
        match self.store_id {
            Some(id) if id != store.id() => Err(BridgeError::StoreMismatch(format!(
                "linker is bound to store {:#x}, used with store {:#x}",
                id,
                store.id()
            ))),
            _ => Ok(()),
        }
    }

    /// Returns true if `module::name` is already defined.
    pub fn has(&self, store: &mut Store, module: &str, name: &str) -> Result<bool, BridgeError> {
        self.check_store(store)?;
        let raw = self.handle.access()?;
        let store = store.raw()?;
        let found = unsafe {
            wb_linker_has(raw, store, module.as_ptr(), module.len(), name.as_ptr(), name.len())
        };
        Ok(found)
    }

    /// Register `function` as `module::name`.
    ///
    /// Fails with `DuplicateBinding` if the pair is already defined, unless
    /// the engine was configured with `allow_shadowing`.
    pub fn define_function(
        &mut self,
        store: &mut Store,
        module: &str,
        name: &str,
        function: &Function,
    ) -> Result<(), BridgeError> {
        self.bind_store(store)?;
        function.check_store(store)?;
        if !self.allow_shadowing && self.has(store, module, name)? {
            return Err(BridgeError::DuplicateBinding {
                module: module.to_string(),
                name: name.to_string(),
            });
        }
        debug!("define {}::{} as {:?}", module, name, function.ty());
        unsafe {
            check(
                wb_linker_define_func(
                    self.handle.access()?,
                    store.raw()?,
                    module.as_ptr(),
                    module.len(),
                    name.as_ptr(),
                    name.len(),
                    function.raw()?,
                ),
                BridgeError::LinkError,
            )
        }
    }

    /// Register every function `exportable` provides.
    pub fn define_all(
        &mut self,
        store: &mut Store,
        exportable: &impl Exportable,
    ) -> Result<(), BridgeError> {
        for def in exportable.functions(store)? {
            self.define_function(store, &def.module, &def.name, &def.function)?;
        }
        Ok(())
    }

    /// Link `module` against the registered bindings.
    ///
    /// Unsatisfied imports fail with `LinkError` carrying the engine's
    /// diagnostic.
    pub fn instantiate(&mut self, store: &mut Store, module: &Module) -> Result<Instance, BridgeError> {
        self.bind_store(store)?;
        let mut raw = ptr::null_mut();
        unsafe {
            check(
                wb_linker_instantiate(self.handle.access()?, store.raw()?, module.raw()?, &mut raw),
                BridgeError::LinkError,
            )?;
        }
        let instance = Instance::new(raw, store)?;
        debug!("instantiated module {}", module.digest());
        Ok(instance)
    }
}
