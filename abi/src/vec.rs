use std::{mem, ptr};

use crate::{slice_from_raw_parts, wb_valkind_t};

macro_rules! declare_vec {
    ($name:ident, $elem:ty, $delete:ident) => {
        /// Owned, C-layout vector handed across the ABI.
        #[repr(C)]
        pub struct $name {
            pub size: usize,
            pub data: *mut $elem,
        }

        impl $name {
            /// An empty vector; safe to pass as an out-parameter.
            pub fn empty() -> Self {
                Self {
                    size: 0,
                    data: ptr::null_mut(),
                }
            }

            pub fn as_slice(&self) -> &[$elem] {
                unsafe { slice_from_raw_parts(self.data, self.size) }
            }

            /// Reclaim the buffer as a `Vec`, leaving this vector empty.
            pub fn take(&mut self) -> Vec<$elem> {
                if self.data.is_null() {
                    return Vec::new();
                }
                let vec = unsafe { Vec::from_raw_parts(self.data, self.size, self.size) };
                self.data = ptr::null_mut();
                self.size = 0;
                vec
            }
        }

        impl From<Vec<$elem>> for $name {
            fn from(vec: Vec<$elem>) -> Self {
                let mut boxed = vec.into_boxed_slice();
                let size = boxed.len();
                let data = boxed.as_mut_ptr();
                mem::forget(boxed);
                Self { size, data }
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                drop(self.take());
            }
        }

        #[no_mangle]
        pub unsafe extern "C" fn $delete(vec: *mut $name) {
            if let Some(vec) = vec.as_mut() {
                drop(vec.take());
            }
        }
    };
}

declare_vec!(wb_byte_vec_t, u8, wb_byte_vec_delete);
declare_vec!(wb_valkind_vec_t, wb_valkind_t, wb_valkind_vec_delete);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_vec_round_trip() {
        let mut vec = wb_byte_vec_t::from(b"trap".to_vec());
        assert_eq!(vec.as_slice(), b"trap");
        assert_eq!(vec.take(), b"trap".to_vec());
        assert!(vec.as_slice().is_empty());
    }

    #[test]
    fn test_empty_vec_take() {
        let mut vec = wb_valkind_vec_t::empty();
        assert!(vec.take().is_empty());
    }
}
