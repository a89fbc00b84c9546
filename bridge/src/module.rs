//! Compiled guest modules.

use wasmbridge_abi::wb_module_t;

use crate::error::BridgeError;
use crate::handle::Handle;

/// Compiled guest bytecode. Immutable and independent of any store.
#[derive(Debug)]
pub struct Module {
    handle: Handle<wb_module_t>,
    digest: blake3::Hash,
}

// The engine's compiled modules are immutable and shareable.
unsafe impl Send for Module {}
unsafe impl Sync for Module {}

impl Module {
    pub(crate) fn new(handle: Handle<wb_module_t>, source: &[u8]) -> Self {
        Self {
            handle,
            digest: blake3::hash(source),
        }
    }

    /// BLAKE3 hash of the bytes this module was compiled from.
    pub fn digest(&self) -> &blake3::Hash {
        &self.digest
    }

    pub(crate) fn raw(&self) -> Result<*mut wb_module_t, BridgeError> {
        self.handle.access()
    }
}
