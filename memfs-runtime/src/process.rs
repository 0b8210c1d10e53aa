//! Guest processes running on top of the filesystem.
//!
//! An application module imports `wasi_snapshot_preview1`. The host builds
//! that namespace from a handful of local syscalls (arguments, environment,
//! exit, randomness) and then lays the filesystem instance's exports over
//! it, so any name the filesystem exports wins. The application is
//! instantiated into the filesystem's store, which is how the filesystem's
//! `copy_in`/`copy_out`/`host_write` callbacks reach the process memory.

use crate::bridge::MemFs;
use crate::error::{from_guest, host_function};
use crate::memory::MemoryAccessor;
use crate::runtime::CompiledModule;
use crate::state::{HostState, ProcessContext};
use memfs_core::environ::{Environ, TableSizes};
use memfs_core::error::{MemfsError, Result};
use wasmtime::{AsContextMut, Caller, Instance, Linker, StoreContextMut, TypedFunc};

/// Import namespace of the syscall surface.
pub const WASI_MODULE: &str = "wasi_snapshot_preview1";

/// Export run by [`GuestProcess::start`].
pub const ENTRY_POINT: &str = "_start";

const ESUCCESS: i32 = 0;

/// How to launch a guest process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    name: String,
    args: Vec<String>,
    environ: Environ,
}

impl ProcessConfig {
    /// A process called `name` with no arguments and the default environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            environ: Environ::guest_default(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the whole environment.
    pub fn with_environ(mut self, environ: Environ) -> Self {
        self.environ = environ;
        self
    }

    /// Set one environment variable.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environ.set(name, value);
        self
    }

    /// Program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program name followed by the arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// The environment.
    pub fn environ(&self) -> &Environ {
        &self.environ
    }
}

/// Lifecycle of a guest process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Instantiated, entry point not yet run.
    Created,
    /// Entry point executing.
    Running,
    /// Finished with this exit status.
    Exited(i32),
    /// Stopped by a trap or host error.
    Faulted,
}

/// An application instance borrowing the filesystem for its lifetime.
pub struct GuestProcess<'fs> {
    memfs: &'fs mut MemFs,
    name: String,
    instance: Instance,
    memory: MemoryAccessor,
    entry: TypedFunc<(), ()>,
    state: ProcessState,
}

impl<'fs> GuestProcess<'fs> {
    /// Instantiate `module` against the filesystem and bind it as the
    /// active process.
    pub fn spawn(
        memfs: &'fs mut MemFs,
        module: &CompiledModule,
        config: ProcessConfig,
    ) -> Result<Self> {
        let name = module.name().to_string();
        let engine = memfs.store().engine().clone();
        let mut linker = Linker::new(&engine);
        register_syscalls(&mut linker)?;

        linker.allow_shadowing(true);
        let fs_instance = memfs.instance();
        linker
            .instance(memfs.store_mut(), WASI_MODULE, fs_instance)
            .map_err(|e| MemfsError::WasmInstantiate {
                module: name.clone(),
                cause: format!("failed to link filesystem exports: {}", e),
            })?;

        let instance = linker
            .instantiate(memfs.store_mut(), module.module())
            .map_err(|e| MemfsError::WasmInstantiate {
                module: name.clone(),
                cause: e.to_string(),
            })?;

        let memory = instance
            .get_memory(memfs.store_mut(), "memory")
            .map(MemoryAccessor::new)
            .ok_or_else(|| MemfsError::WasmMissingExport {
                module: name.clone(),
                export: "memory".to_string(),
            })?;

        let entry = instance
            .get_typed_func::<(), ()>(memfs.store_mut(), ENTRY_POINT)
            .map_err(|_| MemfsError::WasmMissingExport {
                module: name.clone(),
                export: ENTRY_POINT.to_string(),
            })?;

        let context = ProcessContext {
            argv: config.argv(),
            environ: config.environ,
        };
        tracing::debug!(
            program = %name,
            argc = context.argv.len(),
            environ = context.environ.len(),
            "spawned guest process"
        );
        memfs.store_mut().data_mut().bind_process(memory, context);

        Ok(Self {
            memfs,
            name,
            instance,
            memory,
            entry,
            state: ProcessState::Created,
        })
    }

    /// Run the entry point once.
    ///
    /// Returns `Ok` when the guest returns or exits with status 0. Any other
    /// exit status comes back as [`MemfsError::ProcessExit`].
    pub fn start(&mut self) -> Result<()> {
        if self.state != ProcessState::Created {
            return Err(MemfsError::assertion(format!(
                "guest process '{}' already started",
                self.name
            )));
        }
        self.state = ProcessState::Running;
        tracing::info!(program = %self.name, "starting guest process");

        let outcome = self.entry.call(self.memfs.store_mut(), ());
        match outcome.map_err(|e| from_guest(ENTRY_POINT, e)) {
            Ok(()) => {
                self.state = ProcessState::Exited(0);
                Ok(())
            }
            Err(MemfsError::ProcessExit { code }) => {
                self.state = ProcessState::Exited(code);
                tracing::info!(program = %self.name, code, "guest process exited");
                if code == 0 {
                    Ok(())
                } else {
                    Err(MemfsError::ProcessExit { code })
                }
            }
            Err(e) => {
                self.state = ProcessState::Faulted;
                tracing::warn!(
                    program = %self.name,
                    code = e.code(),
                    error = %e,
                    "guest process faulted"
                );
                Err(e)
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The application instance.
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Copy `len` bytes out of the process memory.
    pub fn read_memory(&self, offset: u32, len: u32) -> Result<Vec<u8>> {
        self.memory.read_bytes(self.memfs.store(), offset, len)
    }
}

impl std::fmt::Debug for GuestProcess<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestProcess")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Pointer array and packed buffer for `args_get`/`environ_get`.
///
/// Strings are packed NUL-terminated from `base`; pointer `i` addresses
/// string `i`. The pointer array carries one extra null entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTable {
    /// Guest address of each string, then 0.
    pub pointers: Vec<u32>,
    /// Packed string bytes.
    pub bytes: Vec<u8>,
}

impl StringTable {
    /// Lay out `entries` for a buffer starting at `base`.
    pub fn layout<S: AsRef<str>>(entries: &[S], base: u32) -> Self {
        let mut pointers = Vec::with_capacity(entries.len() + 1);
        let mut bytes = Vec::new();
        for entry in entries {
            pointers.push(base.wrapping_add(bytes.len() as u32));
            bytes.extend_from_slice(entry.as_ref().as_bytes());
            bytes.push(0);
        }
        pointers.push(0);
        Self { pointers, bytes }
    }

    /// Write the table into `memory`: pointers at `ptrs`, strings at the
    /// base it was laid out for.
    pub fn write<T>(
        &self,
        mut store: StoreContextMut<'_, T>,
        memory: MemoryAccessor,
        ptrs: u32,
        base: u32,
    ) -> Result<()> {
        for (i, pointer) in self.pointers.iter().enumerate() {
            memory.write32(&mut store, ptrs.wrapping_add(i as u32 * 4), *pointer)?;
        }
        memory.write(&mut store, base, &self.bytes)?;
        Ok(())
    }
}

/// Write the `*_sizes_get` results: entry count and packed buffer size.
pub fn write_table_sizes<T>(
    mut store: StoreContextMut<'_, T>,
    memory: MemoryAccessor,
    count_out: u32,
    size_out: u32,
    sizes: TableSizes,
) -> Result<()> {
    memory.write32(&mut store, count_out, sizes.count)?;
    memory.write32(&mut store, size_out, sizes.buf_size)?;
    Ok(())
}

/// Register the locally provided `wasi_snapshot_preview1` functions.
fn register_syscalls(linker: &mut Linker<HostState>) -> Result<()> {
    // proc_exit(code)
    linker
        .func_wrap(
            WASI_MODULE,
            "proc_exit",
            |_caller: Caller<'_, HostState>, code: i32| -> wasmtime::Result<()> {
                tracing::debug!(code, "proc_exit");
                Err(MemfsError::ProcessExit { code }.into())
            },
        )
        .map_err(host_function("proc_exit"))?;

    // environ_sizes_get(count_out, size_out) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "environ_sizes_get",
            |mut caller: Caller<'_, HostState>,
             count_out: u32,
             size_out: u32|
             -> wasmtime::Result<i32> {
                let memory = caller.data().foreign_memory()?;
                let sizes = TableSizes::of(&caller.data().process()?.environ.records());
                tracing::debug!(
                    count = sizes.count,
                    buf_size = sizes.buf_size,
                    "environ_sizes_get"
                );
                write_table_sizes(caller.as_context_mut(), memory, count_out, size_out, sizes)?;
                Ok(ESUCCESS)
            },
        )
        .map_err(host_function("environ_sizes_get"))?;

    // environ_get(ptrs, buf) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "environ_get",
            |mut caller: Caller<'_, HostState>, ptrs: u32, buf: u32| -> wasmtime::Result<i32> {
                let memory = caller.data().foreign_memory()?;
                let table = StringTable::layout(&caller.data().process()?.environ.records(), buf);
                tracing::debug!(ptrs, buf, size = table.bytes.len(), "environ_get");
                table.write(caller.as_context_mut(), memory, ptrs, buf)?;
                Ok(ESUCCESS)
            },
        )
        .map_err(host_function("environ_get"))?;

    // args_sizes_get(count_out, size_out) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "args_sizes_get",
            |mut caller: Caller<'_, HostState>,
             count_out: u32,
             size_out: u32|
             -> wasmtime::Result<i32> {
                let memory = caller.data().foreign_memory()?;
                let sizes = TableSizes::of(&caller.data().process()?.argv);
                tracing::debug!(count = sizes.count, buf_size = sizes.buf_size, "args_sizes_get");
                write_table_sizes(caller.as_context_mut(), memory, count_out, size_out, sizes)?;
                Ok(ESUCCESS)
            },
        )
        .map_err(host_function("args_sizes_get"))?;

    // args_get(ptrs, buf) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "args_get",
            |mut caller: Caller<'_, HostState>, ptrs: u32, buf: u32| -> wasmtime::Result<i32> {
                let memory = caller.data().foreign_memory()?;
                let table = StringTable::layout(&caller.data().process()?.argv, buf);
                tracing::debug!(ptrs, buf, size = table.bytes.len(), "args_get");
                table.write(caller.as_context_mut(), memory, ptrs, buf)?;
                Ok(ESUCCESS)
            },
        )
        .map_err(host_function("args_get"))?;

    // random_get(buf, len) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "random_get",
            |mut caller: Caller<'_, HostState>, buf: u32, len: u32| -> wasmtime::Result<i32> {
                let memory = caller.data().foreign_memory()?;
                tracing::debug!(buf, len, "random_get");
                let (dest, state) = memory.slice_and_data_mut(&mut caller, buf, len)?;
                state.rng().fill_bytes(dest);
                Ok(ESUCCESS)
            },
        )
        .map_err(host_function("random_get"))?;

    // clock_time_get(id, precision, time_out) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "clock_time_get",
            |_caller: Caller<'_, HostState>,
             id: u32,
             _precision: u64,
             _time_out: u32|
             -> wasmtime::Result<i32> {
                tracing::debug!(id, "clock_time_get");
                Err(MemfsError::not_implemented(WASI_MODULE, "clock_time_get").into())
            },
        )
        .map_err(host_function("clock_time_get"))?;

    // poll_oneoff(in, out, nsubscriptions, nevents_out) -> errno
    linker
        .func_wrap(
            WASI_MODULE,
            "poll_oneoff",
            |_caller: Caller<'_, HostState>,
             _in: u32,
             _out: u32,
             nsubscriptions: u32,
             _nevents: u32|
             -> wasmtime::Result<i32> {
                tracing::debug!(nsubscriptions, "poll_oneoff");
                Err(MemfsError::not_implemented(WASI_MODULE, "poll_oneoff").into())
            },
        )
        .map_err(host_function("poll_oneoff"))?;

    Ok(())
}
