//! The in-memory filesystem guest and its host side.
//!
//! [`MemFs`] instantiates the filesystem module with the five `env` imports
//! it needs (`abort`, `host_write`, `memfs_log`, `copy_in`, `copy_out`) and
//! wraps its node-management exports in a typed API. Paths are byte strings
//! stored exactly as given; they are passed by
//! writing them into the guest's path buffer and handing over the length.
//!
//! The filesystem's exports double as the syscall surface of every guest
//! process run on top of it; see [`crate::process`].

use crate::error::{from_guest, host_function};
use crate::memory::MemoryAccessor;
use crate::observability::GUEST_TARGET;
use crate::process::{GuestProcess, ProcessConfig};
use crate::runtime::{CompiledModule, WasmRuntime};
use crate::state::HostState;
use memfs_core::error::{MemfsError, Result};
use memfs_core::hexdump;
use memfs_core::output::{LineSink, OutputAggregator};
use memfs_core::rng::{RealRng, RngProvider};
use memfs_core::tar::{EntryKind, TarReader};
use wasmtime::{Caller, Instance, Linker, Store, TypedFunc};

/// Import namespace of the filesystem module's host callbacks.
pub const ENV_MODULE: &str = "env";

/// Highest descriptor `host_write` accepts (stdin, stdout, stderr).
const MAX_STD_FD: u32 = 2;

/// Node handle returned by the filesystem guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inode(u32);

impl Inode {
    /// Raw value as the guest reports it.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Inode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inode {}", self.0)
    }
}

/// What an archive import added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Regular files added.
    pub files: usize,
    /// Directories added.
    pub directories: usize,
    /// Total file content bytes copied in.
    pub bytes: u64,
}

/// Host-side choices for a filesystem instance.
pub struct MemFsOptions {
    output: OutputAggregator,
    rng: Box<dyn RngProvider>,
}

impl Default for MemFsOptions {
    fn default() -> Self {
        Self {
            output: OutputAggregator::default(),
            rng: Box::new(RealRng::new()),
        }
    }
}

impl MemFsOptions {
    /// Options writing guest output to stdout with a real random source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver completed output lines to `sink`.
    pub fn with_sink(mut self, sink: impl LineSink + 'static) -> Self {
        self.output = OutputAggregator::new(sink);
        self
    }

    /// Serve `random_get` from `rng`.
    pub fn with_rng(mut self, rng: impl RngProvider + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }
}

impl std::fmt::Debug for MemFsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFsOptions")
            .field("output", &self.output)
            .field("deterministic_rng", &self.rng.is_deterministic())
            .finish()
    }
}

struct MemFsExports {
    init: TypedFunc<(), ()>,
    get_path_buf: TypedFunc<(), u32>,
    add_directory_node: TypedFunc<u32, ()>,
    add_file_node: TypedFunc<(u32, u32), u32>,
    find_node: TypedFunc<u32, u32>,
    get_file_node_address: TypedFunc<u32, u32>,
    get_file_node_size: TypedFunc<u32, u32>,
}

impl MemFsExports {
    fn resolve(store: &mut Store<HostState>, instance: &Instance, module: &str) -> Result<Self> {
        fn typed<P, R>(
            store: &mut Store<HostState>,
            instance: &Instance,
            module: &str,
            export: &str,
        ) -> Result<TypedFunc<P, R>>
        where
            P: wasmtime::WasmParams,
            R: wasmtime::WasmResults,
        {
            instance
                .get_typed_func::<P, R>(&mut *store, export)
                .map_err(|_| MemfsError::WasmMissingExport {
                    module: module.to_string(),
                    export: export.to_string(),
                })
        }

        Ok(Self {
            init: typed(store, instance, module, "init")?,
            get_path_buf: typed(store, instance, module, "GetPathBuf")?,
            add_directory_node: typed(store, instance, module, "AddDirectoryNode")?,
            add_file_node: typed(store, instance, module, "AddFileNode")?,
            find_node: typed(store, instance, module, "FindNode")?,
            get_file_node_address: typed(store, instance, module, "GetFileNodeAddress")?,
            get_file_node_size: typed(store, instance, module, "GetFileNodeSize")?,
        })
    }
}

/// A running filesystem guest.
pub struct MemFs {
    name: String,
    store: Store<HostState>,
    instance: Instance,
    memory: MemoryAccessor,
    exports: MemFsExports,
}

impl MemFs {
    /// Instantiate the filesystem module and run its `init` export.
    pub fn new(
        runtime: &WasmRuntime,
        module: &CompiledModule,
        options: MemFsOptions,
    ) -> Result<Self> {
        let state = HostState::new(options.output, options.rng, runtime.store_limits());
        let mut store = Store::new(runtime.engine(), state);
        store.limiter(|state| &mut state.limits);

        if let Some(fuel) = runtime.initial_fuel() {
            store.set_fuel(fuel).map_err(|e| MemfsError::WasmInstantiate {
                module: module.name().to_string(),
                cause: format!("failed to set fuel: {}", e),
            })?;
        }

        let mut linker = Linker::new(runtime.engine());
        register_callbacks(&mut linker)?;

        let instance = linker
            .instantiate(&mut store, module.module())
            .map_err(|e| MemfsError::WasmInstantiate {
                module: module.name().to_string(),
                cause: e.to_string(),
            })?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .map(MemoryAccessor::new)
            .ok_or_else(|| MemfsError::WasmMissingExport {
                module: module.name().to_string(),
                export: "memory".to_string(),
            })?;
        store.data_mut().bind_own_memory(memory);

        let exports = MemFsExports::resolve(&mut store, &instance, module.name())?;
        exports
            .init
            .call(&mut store, ())
            .map_err(|e| from_guest("init", e))?;

        tracing::debug!(
            module = module.name(),
            memory_bytes = memory.size(&store),
            "filesystem initialized"
        );

        Ok(Self {
            name: module.name().to_string(),
            store,
            instance,
            memory,
            exports,
        })
    }

    /// Name of the filesystem module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accessor over the filesystem's own memory.
    pub fn memory(&self) -> MemoryAccessor {
        self.memory
    }

    /// Current size of the filesystem's memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.size(&self.store)
    }

    /// Create a directory node.
    pub fn add_directory(&mut self, path: impl AsRef<[u8]>) -> Result<()> {
        let path = path.as_ref();
        let len = self.write_path(path)?;
        self.exports
            .add_directory_node
            .call(&mut self.store, len)
            .map_err(|e| from_guest("AddDirectoryNode", e))?;
        tracing::debug!(path = %display_path(path), "added directory");
        Ok(())
    }

    /// Create a file node and copy `contents` into its storage.
    pub fn add_file(&mut self, path: impl AsRef<[u8]>, contents: &[u8]) -> Result<Inode> {
        let path = path.as_ref();
        let len = self.write_path(path)?;
        let size = u32::try_from(contents.len()).map_err(|_| {
            MemfsError::assertion(format!(
                "file too large for guest memory: {}",
                display_path(path)
            ))
        })?;

        let inode = self
            .exports
            .add_file_node
            .call(&mut self.store, (len, size))
            .map_err(|e| from_guest("AddFileNode", e))?;
        let address = self
            .exports
            .get_file_node_address
            .call(&mut self.store, inode)
            .map_err(|e| from_guest("GetFileNodeAddress", e))?;

        // Node creation may have grown the memory; the accessor re-derives its view.
        self.memory.write(&mut self.store, address, contents)?;
        tracing::debug!(path = %display_path(path), inode, size, "added file");
        Ok(Inode(inode))
    }

    /// Look up the node for `path`.
    pub fn find(&mut self, path: impl AsRef<[u8]>) -> Result<Inode> {
        let len = self.write_path(path.as_ref())?;
        self.exports
            .find_node
            .call(&mut self.store, len)
            .map(Inode)
            .map_err(|e| from_guest("FindNode", e))
    }

    /// Borrow the current contents of the file at `path`.
    pub fn file_contents(&mut self, path: impl AsRef<[u8]>) -> Result<&[u8]> {
        let inode = self.find(path)?;
        let address = self
            .exports
            .get_file_node_address
            .call(&mut self.store, inode.raw())
            .map_err(|e| from_guest("GetFileNodeAddress", e))?;
        let size = self
            .exports
            .get_file_node_size
            .call(&mut self.store, inode.raw())
            .map_err(|e| from_guest("GetFileNodeSize", e))?;
        self.memory.slice(&self.store, address, size)
    }

    /// Populate the filesystem from a `ustar` archive.
    ///
    /// Entries are added in archive order. Content of each file is copied
    /// in after its node is created.
    pub fn import_tar(&mut self, archive: &[u8]) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for entry in TarReader::new(archive) {
            let entry = entry?;
            match entry.kind {
                EntryKind::Directory => {
                    self.add_directory(entry.name)?;
                    summary.directories += 1;
                }
                EntryKind::File => {
                    self.add_file(entry.name, entry.contents)?;
                    summary.files += 1;
                    summary.bytes += entry.contents.len() as u64;
                }
            }
        }
        tracing::info!(
            files = summary.files,
            directories = summary.directories,
            bytes = summary.bytes,
            "imported archive"
        );
        Ok(summary)
    }

    /// Emit any buffered partial output line.
    pub fn flush_output(&mut self) {
        self.store.data_mut().output().flush();
    }

    /// Instantiate `module` as a guest process on this filesystem.
    pub fn spawn(
        &mut self,
        module: &CompiledModule,
        config: ProcessConfig,
    ) -> Result<GuestProcess<'_>> {
        GuestProcess::spawn(self, module, config)
    }

    /// Spawn `module` and run it to completion.
    ///
    /// A clean exit, by returning from `_start` or by `proc_exit(0)`, is `Ok`.
    pub fn run(&mut self, module: &CompiledModule, config: ProcessConfig) -> Result<()> {
        self.spawn(module, config)?.start()
    }

    /// Fuel left in the store, when fuel limiting is enabled.
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }

    pub(crate) fn store(&self) -> &Store<HostState> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut Store<HostState> {
        &mut self.store
    }

    pub(crate) fn instance(&self) -> Instance {
        self.instance
    }

    /// Copy `path` into the guest path buffer, returning its length.
    fn write_path(&mut self, path: &[u8]) -> Result<u32> {
        let buf = self
            .exports
            .get_path_buf
            .call(&mut self.store, ())
            .map_err(|e| from_guest("GetPathBuf", e))?;
        self.memory.write(&mut self.store, buf, path)
    }
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs")
            .field("name", &self.name)
            .field("state", self.store.data())
            .finish_non_exhaustive()
    }
}

/// Paths are stored as raw bytes; logs show them lossily.
fn display_path(path: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(path)
}

/// Register the `env` imports of the filesystem module.
fn register_callbacks(linker: &mut Linker<HostState>) -> Result<()> {
    // abort()
    linker
        .func_wrap(
            ENV_MODULE,
            "abort",
            |_caller: Caller<'_, HostState>| -> wasmtime::Result<()> {
                Err(MemfsError::Abort.into())
            },
        )
        .map_err(host_function("abort"))?;

    // memfs_log(buf, len): diagnostics from the filesystem itself
    linker
        .func_wrap(
            ENV_MODULE,
            "memfs_log",
            |caller: Caller<'_, HostState>, buf: u32, len: u32| -> wasmtime::Result<()> {
                let memory = caller.data().own_memory()?;
                let message = memory.read_str(&caller, buf, Some(len))?;
                tracing::info!(target: GUEST_TARGET, "{}", message);
                Ok(())
            },
        )
        .map_err(host_function("memfs_log"))?;

    // host_write(fd, iovs, iovs_len, nwritten) -> errno
    linker
        .func_wrap(
            ENV_MODULE,
            "host_write",
            |mut caller: Caller<'_, HostState>,
             fd: u32,
             iovs: u32,
             iovs_len: u32,
             nwritten: u32|
             -> wasmtime::Result<i32> {
                let memory = caller.data().foreign_memory()?;
                if fd > MAX_STD_FD {
                    return Err(MemfsError::assertion(format!("host_write to fd {}", fd)).into());
                }

                let mut text = String::new();
                let mut size: u32 = 0;
                for i in 0..iovs_len {
                    let iov = iovs.wrapping_add(i * 8);
                    let buf = memory.read32(&caller, iov)?;
                    let len = memory.read32(&caller, iov.wrapping_add(4))?;
                    text.push_str(&memory.read_str(&caller, buf, Some(len))?);
                    size = size.wrapping_add(len);
                }

                caller.data_mut().output().write(&text);
                memory.write32(&mut caller, nwritten, size)?;
                tracing::trace!(fd, iovs = iovs_len, size, "host_write");
                Ok(0)
            },
        )
        .map_err(host_function("host_write"))?;

    // copy_in(memfs_dst, guest_src, size): guest process memory -> filesystem
    linker
        .func_wrap(
            ENV_MODULE,
            "copy_in",
            |mut caller: Caller<'_, HostState>,
             memfs_dst: u32,
             guest_src: u32,
             size: u32|
             -> wasmtime::Result<()> {
                let state = caller.data();
                let guest = state.foreign_memory()?;
                let own = state.own_memory()?;
                let bytes = guest.read_bytes(&caller, guest_src, size)?;
                own.write(&mut caller, memfs_dst, &bytes)?;
                tracing::trace!(memfs_dst, guest_src, size, "copy_in");
                Ok(())
            },
        )
        .map_err(host_function("copy_in"))?;

    // copy_out(guest_dst, memfs_src, size): filesystem -> guest process memory
    linker
        .func_wrap(
            ENV_MODULE,
            "copy_out",
            |mut caller: Caller<'_, HostState>,
             guest_dst: u32,
             memfs_src: u32,
             size: u32|
             -> wasmtime::Result<()> {
                let state = caller.data();
                let guest = state.foreign_memory()?;
                let own = state.own_memory()?;
                let bytes = own.read_bytes(&caller, memfs_src, size)?;
                if tracing::enabled!(tracing::Level::TRACE) {
                    tracing::trace!(
                        guest_dst,
                        memfs_src,
                        size,
                        "copy_out\n{}",
                        hexdump::format(&bytes)
                    );
                }
                guest.write(&mut caller, guest_dst, &bytes)?;
                Ok(())
            },
        )
        .map_err(host_function("copy_out"))?;

    Ok(())
}
