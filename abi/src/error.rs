use anyhow::Error;

use crate::{delete, slice_from_raw_parts, wb_byte_vec_t};

/// Out-of-band failure produced by a fallible ABI call, or a trap raised by a
/// host callback.
///
/// Ownership passes to the receiver, which must release it with
/// [`wb_error_delete`] once the message has been consumed.
pub struct wb_error_t {
    pub(crate) error: Error,
}

impl wb_error_t {
    pub(crate) fn into_raw(error: Error) -> *mut wb_error_t {
        Box::into_raw(Box::new(wb_error_t { error }))
    }
}

/// Create an error object carrying `message`. Used by host callbacks to trap.
#[no_mangle]
pub unsafe extern "C" fn wb_error_new(message: *const u8, len: usize) -> *mut wb_error_t {
    let bytes = slice_from_raw_parts(message, len);
    let message = String::from_utf8_lossy(bytes);
    wb_error_t::into_raw(Error::msg(message.into_owned()))
}

/// Write the full diagnostic chain of `error` into `out` as UTF-8 bytes.
///
/// The caller owns `out` afterwards and releases it with `wb_byte_vec_delete`.
#[no_mangle]
pub unsafe extern "C" fn wb_error_message(error: *const wb_error_t, out: *mut wb_byte_vec_t) {
    let error = &*error;
    let message = format!("{:#}", error.error);
    std::ptr::write(out, wb_byte_vec_t::from(message.into_bytes()));
}

#[no_mangle]
pub unsafe extern "C" fn wb_error_delete(error: *mut wb_error_t) {
    delete(error);
}
