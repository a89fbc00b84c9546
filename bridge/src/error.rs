//! Bridge error types.

use wasmbridge_abi::{wb_byte_vec_t, wb_error_delete, wb_error_message, wb_error_t};

/// Top-level error type for the bridge crate.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Null identifier, or a handle used after release.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// A store-scoped resource was touched from a thread that does not own it,
    /// or a thread tried to register a second store.
    #[error("confinement violation: {0}")]
    ConfinementViolation(String),

    /// A store-scoped object was used with a store other than its own.
    #[error("store mismatch: {0}")]
    StoreMismatch(String),

    /// A host type outside the closed value-kind set.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Arguments or return kind disagree with the function type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// The `(namespace, symbol)` pair is already defined in the linker.
    #[error("duplicate binding: {module}::{name}")]
    DuplicateBinding { module: String, name: String },

    /// Two proxy methods resolve to the same symbol, or share a name.
    #[error("ambiguous binding: {0}")]
    AmbiguousBinding(String),

    /// A proxy method names a symbol the instance does not export.
    #[error("unresolved import: {0}")]
    UnresolvedImport(String),

    /// The engine rejected the module bytes.
    #[error("compile error: {0}")]
    CompileError(String),

    /// Instantiation or definition failed in the engine's linker.
    #[error("link error: {0}")]
    LinkError(String),

    /// The guest (or a host function it called) trapped.
    #[error("engine trap: {0}")]
    EngineTrap(String),

    /// Engine creation or configuration failure.
    #[error("engine error: {0}")]
    Engine(#[from] anyhow::Error),

    /// Guest memory access out of bounds, or a missing memory protocol export.
    #[error("memory error: {0}")]
    MemoryError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Consume a foreign error object and return its diagnostic text.
///
/// # Safety
///
/// `error` must be a live, non-null error returned by the engine ABI. It is
/// deleted before this function returns.
pub(crate) unsafe fn take_message(error: *mut wb_error_t) -> String {
    let mut out = wb_byte_vec_t::empty();
    wb_error_message(error, &mut out);
    wb_error_delete(error);
    String::from_utf8_lossy(out.as_slice()).into_owned()
}

/// Turn a nullable foreign error into a `Result`, mapping the diagnostic with
/// `wrap`.
///
/// # Safety
///
/// Same as [`take_message`] when `error` is non-null.
pub(crate) unsafe fn check(
    error: *mut wb_error_t,
    wrap: impl FnOnce(String) -> BridgeError,
) -> Result<(), BridgeError> {
    if error.is_null() {
        Ok(())
    } else {
        Err(wrap(take_message(error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmbridge_abi::wb_error_new;

    #[test]
    fn test_check_null_is_ok() {
        let result = unsafe { check(std::ptr::null_mut(), BridgeError::EngineTrap) };
        assert!(result.is_ok());
    }

    #[test]
    fn test_check_carries_message_verbatim() {
        let msg = b"unknown import: `env::missing` has not been defined";
        let err = unsafe { wb_error_new(msg.as_ptr(), msg.len()) };
        match unsafe { check(err, BridgeError::LinkError) } {
            Err(BridgeError::LinkError(text)) => {
                assert_eq!(text.as_bytes(), msg);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_binding_display() {
        let err = BridgeError::DuplicateBinding {
            module: "hello".into(),
            name: "world".into(),
        };
        assert_eq!(err.to_string(), "duplicate binding: hello::world");
    }
}
