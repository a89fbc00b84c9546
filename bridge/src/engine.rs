//! Engine creation and the factories hanging off it.

use std::path::Path;
use std::ptr;

use anyhow::anyhow;
use log::{debug, info};
use wasmbridge_abi::{
    wb_engine_delete, wb_engine_new, wb_engine_t, wb_linker_allow_shadowing, wb_linker_delete,
    wb_linker_new, wb_module_delete, wb_module_new, wb_module_validate, wb_store_delete,
    wb_store_new,
};

use crate::config::BridgeConfig;
use crate::error::{check, BridgeError};
use crate::handle::Handle;
use crate::linker::Linker;
use crate::module::Module;
use crate::store::Store;

/// The compilation environment. Shareable across threads.
///
/// Stores, modules and linkers keep the underlying engine alive on their own,
/// so they may outlive the `Engine` value that created them.
#[derive(Debug)]
pub struct Engine {
    handle: Handle<wb_engine_t>,
    config: BridgeConfig,
}

// The engine is internally synchronized and never mutated after creation.
unsafe impl Send for Engine {}
unsafe impl Sync for Engine {}

impl Engine {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let raw_config = config.to_raw();
        let mut raw = ptr::null_mut();
        unsafe {
            check(wb_engine_new(&raw_config, &mut raw), |m| {
                BridgeError::Engine(anyhow!(m))
            })?;
        }
        let handle = unsafe { Handle::acquire(raw, wb_engine_delete, "engine")? };
        info!("engine created: {:?}", config);
        Ok(Self { handle, config })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn raw(&self) -> Result<*mut wb_engine_t, BridgeError> {
        self.handle.access()
    }

    /// Create a store owned by the calling thread.
    ///
    /// Fails with `ConfinementViolation` if this thread already owns a store.
    /// With fuel metering enabled the store starts with
    /// [`BridgeConfig::fuel_limit`].
    pub fn new_store(&self) -> Result<Store, BridgeError> {
        let raw = unsafe { wb_store_new(self.raw()?) };
        let handle = unsafe { Handle::acquire(raw, wb_store_delete, "store")? };
        let mut store = Store::register(handle)?;
        if self.config.consume_fuel {
            store.set_fuel(self.config.fuel_limit)?;
        }
        Ok(store)
    }

    /// Compile binary or text-format WebAssembly.
    pub fn compile(&self, bytes: &[u8]) -> Result<Module, BridgeError> {
        let mut raw = ptr::null_mut();
        unsafe {
            check(
                wb_module_new(self.raw()?, bytes.as_ptr(), bytes.len(), &mut raw),
                BridgeError::CompileError,
            )?;
        }
        let handle = unsafe { Handle::acquire(raw, wb_module_delete, "module")? };
        let module = Module::new(handle, bytes);
        debug!("compiled {} bytes, digest {}", bytes.len(), module.digest());
        Ok(module)
    }

    /// Read and compile the module at `path`.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Module, BridgeError> {
        let path = path.as_ref();
        debug!("compiling {}", path.display());
        let bytes = std::fs::read(path)?;
        self.compile(&bytes)
    }

    /// Check binary WebAssembly without compiling it.
    pub fn validate(&self, bytes: &[u8]) -> Result<(), BridgeError> {
        unsafe {
            check(
                wb_module_validate(self.raw()?, bytes.as_ptr(), bytes.len()),
                BridgeError::CompileError,
            )
        }
    }

    pub fn new_linker(&self) -> Result<Linker, BridgeError> {
        let raw = unsafe { wb_linker_new(self.raw()?) };
        let handle = unsafe { Handle::acquire(raw, wb_linker_delete, "linker")? };
        if self.config.allow_shadowing {
            unsafe { wb_linker_allow_shadowing(handle.access()?, true) };
        }
        Ok(Linker::new(handle, self.config.allow_shadowing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_engine() {
        let engine = Engine::new(BridgeConfig::default()).unwrap();
        assert!(!engine.config().consume_fuel);
    }

    #[test]
    fn test_malformed_bytes_compile_error() {
        let engine = Engine::new(BridgeConfig::default()).unwrap();
        let err = engine.compile(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, BridgeError::CompileError(_)));
        assert!(engine.validate(&[0, 1, 2]).is_err());

        let module = engine.compile(b"(module)").unwrap();
        assert_eq!(module.digest(), &blake3::hash(b"(module)"));
    }

    #[test]
    fn test_compile_missing_file() {
        let engine = Engine::new(BridgeConfig::default()).unwrap();
        let err = engine.compile_file("/nonexistent/guest.wasm").unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[test]
    fn test_engine_shared_across_threads() {
        let engine = std::sync::Arc::new(Engine::new(BridgeConfig::default()).unwrap());
        let worker = std::sync::Arc::clone(&engine);
        let digest = std::thread::spawn(move || *worker.compile(b"(module)").unwrap().digest())
            .join()
            .unwrap();
        assert_eq!(digest, *engine.compile(b"(module)").unwrap().digest());
    }
}
