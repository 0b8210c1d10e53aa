//! Recovering memfs errors from engine errors.

use memfs_core::error::MemfsError;

/// Convert an error returned by a guest call.
///
/// Host functions raise `MemfsError`s as the engine's error payload; those
/// come back out unchanged. Anything else is a trap in `function`.
pub(crate) fn from_guest(function: &str, err: wasmtime::Error) -> MemfsError {
    match err.downcast::<MemfsError>() {
        Ok(memfs) => memfs,
        Err(other) => MemfsError::WasmTrap {
            function: function.to_string(),
            cause: format!("{:#}", other),
        },
    }
}

/// Map a linker definition failure.
pub(crate) fn host_function(function: &str) -> impl FnOnce(wasmtime::Error) -> MemfsError + '_ {
    move |e| MemfsError::WasmHostFunction {
        function: function.to_string(),
        cause: e.to_string(),
    }
}
