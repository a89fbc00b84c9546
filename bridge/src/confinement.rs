//! Thread confinement for stores.
//!
//! The engine's execution context must only be touched by the thread that
//! created it. [`ConfinementRegistry`] records, per thread, the one store that
//! thread owns; every store operation verifies the calling thread against it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::ThreadId;

use log::trace;

use crate::error::BridgeError;

/// Map from thread to the identifier of the store it owns.
#[derive(Debug, Default)]
pub struct ConfinementRegistry {
    owners: Mutex<HashMap<ThreadId, usize>>,
}

static GLOBAL: OnceLock<ConfinementRegistry> = OnceLock::new();

impl ConfinementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by every [`Store`](crate::Store).
    pub fn global() -> &'static ConfinementRegistry {
        GLOBAL.get_or_init(ConfinementRegistry::new)
    }

    fn owners(&self) -> MutexGuard<'_, HashMap<ThreadId, usize>> {
        // A panic while holding the lock leaves the map consistent.
        self.owners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `store` as owned by `thread`.
    pub fn register(&self, thread: ThreadId, store: usize) -> Result<(), BridgeError> {
        let mut owners = self.owners();
        if let Some(existing) = owners.get(&thread) {
            return Err(BridgeError::ConfinementViolation(format!(
                "thread {:?} already owns store {:#x}; release it before creating another",
                thread, existing
            )));
        }
        trace!("register store {:#x} on {:?}", store, thread);
        owners.insert(thread, store);
        Ok(())
    }

    /// Check that `thread` owns `store`.
    pub fn verify(&self, thread: ThreadId, store: usize) -> Result<(), BridgeError> {
        check_owner(&self.owners(), thread, store)
    }

    /// Drop the registration of `store` on `thread`.
    pub fn unregister(&self, thread: ThreadId, store: usize) -> Result<(), BridgeError> {
        let mut owners = self.owners();
        check_owner(&owners, thread, store)?;
        trace!("unregister store {:#x} on {:?}", store, thread);
        owners.remove(&thread);
        Ok(())
    }

    /// Clear `owner`'s registration of `store` from any thread, leaving a
    /// newer registration alone. Returns whether a slot was cleared.
    pub fn forget(&self, owner: ThreadId, store: usize) -> bool {
        let mut owners = self.owners();
        if owners.get(&owner) != Some(&store) {
            return false;
        }
        trace!("forget store {:#x} owned by {:?}", store, owner);
        owners.remove(&owner);
        true
    }

    /// The store `thread` owns, if any.
    pub fn owner_of(&self, thread: ThreadId) -> Option<usize> {
        self.owners().get(&thread).copied()
    }
}

fn check_owner(
    owners: &HashMap<ThreadId, usize>,
    thread: ThreadId,
    store: usize,
) -> Result<(), BridgeError> {
    match owners.get(&thread) {
        Some(owned) if *owned == store => Ok(()),
        Some(owned) => Err(BridgeError::ConfinementViolation(format!(
            "store {:#x} used on {:?}, which owns store {:#x}",
            store, thread, owned
        ))),
        None => Err(BridgeError::ConfinementViolation(format!(
            "store {:#x} used on {:?}, which owns no store",
            store, thread
        ))),
    }
}
