//! Wasmtime host for an in-memory filesystem and the guests that use it.
//!
//! Two guest modules share one store:
//!
//! - the **filesystem** ([`MemFs`]), a module that owns file nodes in its
//!   own linear memory and is driven by the host through path-buffer calls
//! - an **application** ([`GuestProcess`]), a command module importing
//!   `wasi_snapshot_preview1`, whose imports are served by the filesystem's
//!   exports with a few process-level syscalls supplied by the host
//!
//! The host copies bytes between the two memories on the filesystem's
//! behalf and collects application output line by line.
//!
//! ```ignore
//! use memfs_runtime::{MemFs, MemFsOptions, ProcessConfig, WasmRuntime};
//!
//! let runtime = WasmRuntime::with_defaults()?;
//! let fs_module = runtime.compile_file("memfs.wasm".as_ref())?;
//! let app = runtime.compile_file("clang.wasm".as_ref())?;
//!
//! let mut fs = MemFs::new(&runtime, &fs_module, MemFsOptions::default())?;
//! fs.add_file("test.cc", b"int main() {}")?;
//! fs.run(&app, ProcessConfig::new("clang").args(["-cc1", "test.cc"]))?;
//! fs.flush_output();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
mod error;
pub mod memory;
pub mod observability;
pub mod process;
pub mod runtime;
pub mod state;

pub use bridge::{ENV_MODULE, ImportSummary, Inode, MemFs, MemFsOptions};
pub use memory::MemoryAccessor;
pub use process::{ENTRY_POINT, GuestProcess, ProcessConfig, ProcessState, StringTable, WASI_MODULE};
pub use runtime::{CompiledModule, WASM_PAGE_SIZE, WasmRuntime, WasmRuntimeConfig};
pub use state::{HostState, ProcessContext};
