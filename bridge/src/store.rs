//! The execution context, confined to the thread that created it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use log::{debug, error, warn};
use wasmbridge_abi::{wb_store_get_fuel, wb_store_set_fuel, wb_store_t};

use crate::confinement::ConfinementRegistry;
use crate::error::{check, BridgeError};
use crate::handle::Handle;

/// One execution context.
///
/// A `Store` may be moved to another thread, but every operation verifies
/// that it runs on the creating thread and fails with `ConfinementViolation`
/// otherwise. Each thread owns at most one store at a time.
pub struct Store {
    handle: Handle<wb_store_t>,
    id: usize,
    owner: ThreadId,
    registry: &'static ConfinementRegistry,
}

/// Store identities are never reused, unlike addresses.
static NEXT_STORE_ID: AtomicUsize = AtomicUsize::new(1);

// Moving the wrapper is harmless; use is gated on `owner`.
unsafe impl Send for Store {}

impl Store {
    /// Wrap a freshly created store and register it with the current thread.
    /// On failure `handle` is dropped, releasing the foreign store.
    pub(crate) fn register(handle: Handle<wb_store_t>) -> Result<Self, BridgeError> {
        let registry = ConfinementRegistry::global();
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        let owner = thread::current().id();
        registry.register(owner, id)?;
        debug!("store {:#x} created on {:?}", id, owner);
        Ok(Self {
            handle,
            id,
            owner,
            registry,
        })
    }

    /// Identity used to associate store-scoped objects with this store.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    /// The foreign store, after verifying the calling thread.
    pub(crate) fn raw(&self) -> Result<*mut wb_store_t, BridgeError> {
        let raw = self.handle.access()?;
        self.registry.verify(thread::current().id(), self.id)?;
        Ok(raw)
    }

    /// Replace the remaining fuel. Fails unless the engine meters fuel.
    pub fn set_fuel(&mut self, fuel: u64) -> Result<(), BridgeError> {
        let raw = self.raw()?;
        unsafe { check(wb_store_set_fuel(raw, fuel), |m| BridgeError::Engine(anyhow::anyhow!(m))) }
    }

    /// Remaining fuel. Fails unless the engine meters fuel.
    pub fn fuel(&self) -> Result<u64, BridgeError> {
        let raw = self.raw()?;
        let mut fuel = 0;
        unsafe {
            check(wb_store_get_fuel(raw, &mut fuel), |m| {
                BridgeError::Engine(anyhow::anyhow!(m))
            })?
        };
        Ok(fuel)
    }

    /// Release the foreign store and clear this thread's registration.
    ///
    /// Must run on the owning thread; elsewhere it fails and leaves the store
    /// untouched. Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<(), BridgeError> {
        if self.handle.is_released() {
            return Ok(());
        }
        self.registry.unregister(thread::current().id(), self.id)?;
        self.handle.release();
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.handle.is_released() {
            return;
        }
        let current = thread::current().id();
        if current != self.owner {
            // Touching the foreign store here is undefined; leak it instead.
            error!(
                "store {:#x} dropped on {:?} but owned by {:?}; leaking it",
                self.id, current, self.owner
            );
            self.handle.abandon();
            self.registry.forget(self.owner, self.id);
            return;
        }
        if let Err(e) = self.release() {
            warn!("store {:#x} release on drop: {}", self.id, e);
            self.handle.release();
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &format_args!("{:#x}", self.id))
            .field("owner", &self.owner)
            .field("released", &self.handle.is_released())
            .finish()
    }
}
