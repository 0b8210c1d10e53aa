//! State shared by every instance living in the bridge's store.
//!
//! The filesystem guest and each application guest are instantiated into one
//! `wasmtime::Store<HostState>`, so host functions of either import surface
//! see the same state. The active foreign memory is the only cross-component
//! mutable reference; it is rebound once per guest process and only by the
//! process host.

use crate::memory::MemoryAccessor;
use memfs_core::environ::Environ;
use memfs_core::error::{MemfsError, Result};
use memfs_core::output::OutputAggregator;
use memfs_core::rng::RngProvider;
use wasmtime::StoreLimits;

/// Argument vector and environment of the running guest process.
#[derive(Debug, Clone, Default)]
pub struct ProcessContext {
    /// Program name followed by its arguments.
    pub argv: Vec<String>,
    /// Environment visible through `environ_get`.
    pub environ: Environ,
}

/// Data stored in the bridge's `Store`.
pub struct HostState {
    output: OutputAggregator,
    rng: Box<dyn RngProvider>,
    own_memory: Option<MemoryAccessor>,
    foreign_memory: Option<MemoryAccessor>,
    process: Option<ProcessContext>,
    pub(crate) limits: StoreLimits,
}

impl HostState {
    /// Create state with no memories bound.
    pub fn new(output: OutputAggregator, rng: Box<dyn RngProvider>, limits: StoreLimits) -> Self {
        Self {
            output,
            rng,
            own_memory: None,
            foreign_memory: None,
            process: None,
            limits,
        }
    }

    /// Guest output aggregator.
    pub fn output(&mut self) -> &mut OutputAggregator {
        &mut self.output
    }

    /// Random source for `random_get`.
    pub fn rng(&mut self) -> &mut dyn RngProvider {
        self.rng.as_mut()
    }

    /// Memory of the filesystem guest.
    pub fn own_memory(&self) -> Result<MemoryAccessor> {
        self.own_memory
            .ok_or_else(|| MemfsError::assertion("filesystem memory accessed before init"))
    }

    /// Memory of the running guest process.
    pub fn foreign_memory(&self) -> Result<MemoryAccessor> {
        self.foreign_memory.ok_or(MemfsError::ForeignMemoryUnbound)
    }

    /// Context of the running guest process.
    pub fn process(&self) -> Result<&ProcessContext> {
        self.process.as_ref().ok_or(MemfsError::ForeignMemoryUnbound)
    }

    pub(crate) fn bind_own_memory(&mut self, memory: MemoryAccessor) {
        self.own_memory = Some(memory);
    }

    pub(crate) fn bind_process(&mut self, memory: MemoryAccessor, process: ProcessContext) {
        self.foreign_memory = Some(memory);
        self.process = Some(process);
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("output", &self.output)
            .field("own_memory", &self.own_memory.is_some())
            .field("foreign_memory", &self.foreign_memory.is_some())
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}
