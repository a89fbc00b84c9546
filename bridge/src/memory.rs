//! Guest linear memory access.
//!
//! The free helpers validate pointer and length arguments against the
//! memory size before touching it, and fail with `MemoryError` when the range
//! `[ptr, ptr+len)` falls outside. [`Memory`] hands out views borrowed
//! directly from the engine's linear memory; nothing is copied unless the
//! caller asks for it.

use std::ops::Range;

use log::debug;
use wasmbridge_abi::{
    wb_memory_data, wb_memory_data_size, wb_memory_delete, wb_memory_grow, wb_memory_t,
};

use crate::error::{check, BridgeError};
use crate::func::Function;
use crate::handle::Handle;
use crate::instance::Instance;
use crate::store::Store;
use crate::types::ValKind;

/// Linear memory export used by the allocator protocol.
pub const MEMORY_EXPORT: &str = "memory";
/// Guest export `(len: i32) -> i32` returning the offset of `len` fresh bytes.
pub const ALLOC_EXPORT: &str = "__alloc_bytes";
/// Guest export `(ptr: i32, len: i32)` freeing bytes from [`ALLOC_EXPORT`].
pub const DEALLOC_EXPORT: &str = "__dealloc_bytes";

fn bounds(mem_len: usize, ptr: i32, len: i32) -> Result<Range<usize>, BridgeError> {
    if ptr < 0 || len < 0 {
        return Err(BridgeError::MemoryError(format!(
            "negative pointer or length: ptr={} len={}",
            ptr, len
        )));
    }
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|end| *end <= mem_len)
        .ok_or_else(|| {
            BridgeError::MemoryError(format!(
                "range [{}, {}+{}) outside memory of {} bytes",
                ptr, ptr, len, mem_len
            ))
        })?;
    Ok(start..end)
}

/// Borrow `len` bytes of guest memory at `ptr`.
pub fn view_bytes(mem: &[u8], ptr: i32, len: i32) -> Result<&[u8], BridgeError> {
    Ok(&mem[bounds(mem.len(), ptr, len)?])
}

/// Copy `len` bytes out of guest memory at `ptr`.
pub fn read_bytes(mem: &[u8], ptr: i32, len: i32) -> Result<Vec<u8>, BridgeError> {
    view_bytes(mem, ptr, len).map(<[u8]>::to_vec)
}

/// Write `data` to guest memory at `ptr`.
pub fn write_bytes(mem: &mut [u8], ptr: i32, data: &[u8]) -> Result<(), BridgeError> {
    let len = i32::try_from(data.len())
        .map_err(|_| BridgeError::MemoryError(format!("{} bytes exceed guest range", data.len())))?;
    let range = bounds(mem.len(), ptr, len)?;
    mem[range].copy_from_slice(data);
    Ok(())
}

/// Read a little-endian i32 at `ptr`.
pub fn read_i32(mem: &[u8], ptr: i32) -> Result<i32, BridgeError> {
    let bytes = view_bytes(mem, ptr, 4)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Write a little-endian i32 at `ptr`.
pub fn write_i32(mem: &mut [u8], ptr: i32, value: i32) -> Result<(), BridgeError> {
    write_bytes(mem, ptr, &value.to_le_bytes())
}

/// A `(ptr, len)` byte range inside guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestSlice {
    pub ptr: i32,
    pub len: i32,
}

/// A guest linear memory export.
#[derive(Debug)]
pub struct Memory {
    handle: Handle<wb_memory_t>,
    store_id: usize,
}

impl Memory {
    pub(crate) fn new(raw: *mut wb_memory_t, store: &Store) -> Result<Self, BridgeError> {
        let handle = unsafe { Handle::acquire(raw, wb_memory_delete, "memory")? };
        Ok(Self {
            handle,
            store_id: store.id(),
        })
    }

    fn check_store(&self, store: &Store) -> Result<(), BridgeError> {
        if store.id() != self.store_id {
            return Err(BridgeError::StoreMismatch(format!(
                "memory belongs to store {:#x}, used with store {:#x}",
                self.store_id,
                store.id()
            )));
        }
        Ok(())
    }

    pub fn data_size(&self, store: &Store) -> Result<usize, BridgeError> {
        self.check_store(store)?;
        Ok(unsafe { wb_memory_data_size(self.handle.access()?, store.raw()?) })
    }

    /// The whole linear memory, borrowed for as long as the store is.
    pub fn data<'s>(&self, store: &'s Store) -> Result<&'s [u8], BridgeError> {
        self.check_store(store)?;
        let raw_store = store.raw()?;
        let raw = self.handle.access()?;
        unsafe {
            let size = wb_memory_data_size(raw, raw_store);
            if size == 0 {
                return Ok(&[]);
            }
            Ok(std::slice::from_raw_parts(wb_memory_data(raw, raw_store), size))
        }
    }

    pub fn data_mut<'s>(&self, store: &'s mut Store) -> Result<&'s mut [u8], BridgeError> {
        self.check_store(store)?;
        let raw_store = store.raw()?;
        let raw = self.handle.access()?;
        unsafe {
            let size = wb_memory_data_size(raw, raw_store);
            if size == 0 {
                return Ok(&mut []);
            }
            Ok(std::slice::from_raw_parts_mut(wb_memory_data(raw, raw_store), size))
        }
    }

    /// Grow by `delta` 64 KiB pages, returning the previous size in pages.
    pub fn grow(&self, store: &mut Store, delta: u64) -> Result<u64, BridgeError> {
        self.check_store(store)?;
        let mut prev = 0;
        unsafe {
            check(
                wb_memory_grow(self.handle.access()?, store.raw()?, delta, &mut prev),
                BridgeError::MemoryError,
            )?;
        }
        debug!("memory grown by {} pages from {}", delta, prev);
        Ok(prev)
    }
}

/// Moves host byte buffers into guest memory through the guest's own
/// `__alloc_bytes` / `__dealloc_bytes` exports.
#[derive(Debug)]
pub struct GuestAllocator<'i> {
    instance: &'i Instance,
    memory: Memory,
    alloc: Function,
    dealloc: Function,
}

impl<'i> GuestAllocator<'i> {
    /// Resolve the allocator exports of `instance`.
    ///
    /// Fails with `MemoryError` if `memory` or either allocator function is
    /// missing or has the wrong type.
    pub fn new(instance: &'i Instance, store: &mut Store) -> Result<Self, BridgeError> {
        let memory = instance
            .get_memory(store, MEMORY_EXPORT)?
            .ok_or_else(|| missing(MEMORY_EXPORT))?;
        let alloc = instance
            .get_function(store, ALLOC_EXPORT)?
            .ok_or_else(|| missing(ALLOC_EXPORT))?;
        let dealloc = instance
            .get_function(store, DEALLOC_EXPORT)?
            .ok_or_else(|| missing(DEALLOC_EXPORT))?;

        if alloc.ty().params() != [ValKind::I32] || alloc.ty().result() != Some(ValKind::I32) {
            return Err(BridgeError::MemoryError(format!(
                "`{}` must have type (i32) -> i32",
                ALLOC_EXPORT
            )));
        }
        if dealloc.ty().params() != [ValKind::I32, ValKind::I32] || dealloc.ty().result().is_some() {
            return Err(BridgeError::MemoryError(format!(
                "`{}` must have type (i32, i32)",
                DEALLOC_EXPORT
            )));
        }

        Ok(Self {
            instance,
            memory,
            alloc,
            dealloc,
        })
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Reserve `len` uninitialized bytes in guest memory.
    pub fn alloc(&self, store: &mut Store, len: usize) -> Result<GuestSlice, BridgeError> {
        let len = i32::try_from(len)
            .map_err(|_| BridgeError::MemoryError(format!("{} bytes exceed guest range", len)))?;
        let ptr: i32 = self.alloc.call_typed(self.instance, store, (len,))?;
        debug!("allocated offset {} len {}", ptr, len);
        Ok(GuestSlice { ptr, len })
    }

    /// Copy `bytes` into freshly allocated guest memory.
    pub fn copy_in(&self, store: &mut Store, bytes: &[u8]) -> Result<GuestSlice, BridgeError> {
        let slice = self.alloc(store, bytes.len())?;
        let written = self
            .memory
            .data_mut(store)
            .and_then(|mem| write_bytes(mem, slice.ptr, bytes));
        if let Err(e) = written {
            self.free(store, slice)?;
            return Err(e);
        }
        Ok(slice)
    }

    /// Borrow the bytes of `slice` without copying.
    pub fn view<'s>(&self, store: &'s Store, slice: GuestSlice) -> Result<&'s [u8], BridgeError> {
        view_bytes(self.memory.data(store)?, slice.ptr, slice.len)
    }

    pub fn read(&self, store: &Store, slice: GuestSlice) -> Result<Vec<u8>, BridgeError> {
        self.view(store, slice).map(<[u8]>::to_vec)
    }

    /// Return `slice` to the guest allocator.
    pub fn free(&self, store: &mut Store, slice: GuestSlice) -> Result<(), BridgeError> {
        debug!("freeing offset {} len {}", slice.ptr, slice.len);
        self.dealloc
            .call_typed(self.instance, store, (slice.ptr, slice.len))
    }
}

fn missing(export: &str) -> BridgeError {
    BridgeError::MemoryError(format!("guest does not export `{}`", export))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bytes_basic() {
        let mem = vec![10, 20, 30, 40, 50];
        assert_eq!(read_bytes(&mem, 1, 3).unwrap(), vec![20, 30, 40]);
    }

    #[test]
    fn test_read_bytes_out_of_bounds() {
        let mem = vec![10, 20, 30];
        assert!(read_bytes(&mem, 1, 3).is_err());
        assert!(read_bytes(&mem, -1, 1).is_err());
        assert!(read_bytes(&mem, 0, -1).is_err());
        assert!(read_bytes(&mem, i32::MAX, i32::MAX).is_err());
    }

    #[test]
    fn test_view_borrows_in_place() {
        let mem = vec![1, 2, 3, 4];
        let view = view_bytes(&mem, 2, 2).unwrap();
        assert_eq!(view.as_ptr(), mem[2..].as_ptr());
        assert!(view_bytes(&mem, 4, 0).unwrap().is_empty());
    }

    #[test]
    fn test_write_bytes() {
        let mut mem = vec![0; 8];
        write_bytes(&mut mem, 2, &[0xAA, 0xBB]).unwrap();
        assert_eq!(&mem[2..4], &[0xAA, 0xBB]);
        assert!(matches!(
            write_bytes(&mut mem, 7, &[1, 2]),
            Err(BridgeError::MemoryError(_))
        ));
    }

    #[test]
    fn test_read_write_i32() {
        let mut mem = vec![0; 16];
        write_i32(&mut mem, 4, 0x12345678).unwrap();
        assert_eq!(read_i32(&mem, 4).unwrap(), 0x12345678);
        assert_eq!(mem[4], 0x78);
        assert!(read_i32(&mem, 14).is_err());
    }
}
