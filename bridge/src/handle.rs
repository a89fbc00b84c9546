//! Ownership of one engine resource.
//!
//! A [`Handle`] pairs the opaque pointer returned by an engine constructor
//! with the engine function that releases it. The handle is the only owner of
//! the pointer: it is released exactly once, either by [`Handle::release`] or
//! when the handle goes out of scope. Nothing runs for a handle leaked with
//! `mem::forget`; the foreign resource stays allocated until process exit.

use std::fmt;
use std::ptr::NonNull;

use log::{debug, trace};

use crate::error::BridgeError;

/// Engine function that frees a resource of type `T`.
pub type Releaser<T> = unsafe extern "C" fn(*mut T);

pub struct Handle<T> {
    raw: Option<NonNull<T>>,
    release: Releaser<T>,
    kind: &'static str,
}

impl<T> Handle<T> {
    /// Take ownership of `raw`, to be freed with `release`.
    ///
    /// Fails with `InvalidHandle` when the engine returned null.
    ///
    /// # Safety
    ///
    /// A non-null `raw` must be live, owned by nobody else, and valid to pass
    /// to `release` once.
    pub unsafe fn acquire(
        raw: *mut T,
        release: Releaser<T>,
        kind: &'static str,
    ) -> Result<Self, BridgeError> {
        let raw = NonNull::new(raw)
            .ok_or_else(|| BridgeError::InvalidHandle(format!("engine returned a null {}", kind)))?;
        debug!("acquired {} {:p}", kind, raw);
        Ok(Self {
            raw: Some(raw),
            release,
            kind,
        })
    }

    /// The identifier, valid until the handle is released.
    pub fn access(&self) -> Result<*mut T, BridgeError> {
        match self.raw {
            Some(raw) => {
                trace!("access {} {:p}", self.kind, raw);
                Ok(raw.as_ptr())
            }
            None => Err(BridgeError::InvalidHandle(format!(
                "{} used after release",
                self.kind
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_none()
    }

    /// Free the resource. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            debug!("releasing {} {:p}", self.kind, raw);
            unsafe { (self.release)(raw.as_ptr()) };
        }
    }

    /// Give up ownership without freeing, leaving the handle released.
    pub(crate) fn abandon(&mut self) -> Option<*mut T> {
        self.raw.take().map(NonNull::as_ptr)
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some(raw) => write!(f, "Handle({} {:p})", self.kind, raw),
            None => write!(f, "Handle({} released)", self.kind),
        }
    }
}
