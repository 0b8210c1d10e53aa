//! WASM runtime management using Wasmtime.
//!
//! Provides engine configuration, module compilation and caching, and the
//! per-store resource limits every guest runs under.

use dashmap::DashMap;
use memfs_core::error::{MemfsError, Result};
use std::sync::Arc;
use wasmtime::{Config, Engine, Module, StoreLimits, StoreLimitsBuilder};

/// WebAssembly page size in bytes.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Default maximum memory pages per linear memory.
const DEFAULT_MAX_MEMORY_PAGES: u32 = 16 * 1024; // 1 GiB

/// Default fuel amount for execution limiting.
const DEFAULT_FUEL: u64 = 10_000_000_000;

/// Configuration for the WASM runtime.
#[derive(Debug, Clone)]
pub struct WasmRuntimeConfig {
    /// Maximum pages any single linear memory may grow to.
    pub max_memory_pages: u32,
    /// Whether to enable fuel-based execution limiting.
    pub fuel_enabled: bool,
    /// Fuel given to each store when fuel is enabled.
    pub fuel_amount: u64,
    /// Whether to cache compiled modules.
    pub cache_modules: bool,
    /// Enable debug info in compiled modules.
    pub debug_info: bool,
}

impl Default for WasmRuntimeConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            fuel_enabled: false,
            fuel_amount: DEFAULT_FUEL,
            cache_modules: true,
            debug_info: false,
        }
    }
}

impl WasmRuntimeConfig {
    /// Create a configuration for testing with stricter limits.
    pub fn testing() -> Self {
        Self {
            max_memory_pages: 256, // 16 MB
            fuel_enabled: true,
            fuel_amount: 10_000_000,
            cache_modules: false,
            debug_info: true,
        }
    }

    /// Set maximum memory pages.
    pub fn with_max_memory_pages(mut self, pages: u32) -> Self {
        self.max_memory_pages = pages;
        self
    }

    /// Enable or disable fuel-based limiting.
    pub fn with_fuel(mut self, enabled: bool, amount: u64) -> Self {
        self.fuel_enabled = enabled;
        self.fuel_amount = amount;
        self
    }

    /// Create a Wasmtime Config from this configuration.
    fn to_wasmtime_config(&self) -> Config {
        let mut config = Config::new();
        config.consume_fuel(self.fuel_enabled);
        config.debug_info(self.debug_info);
        config.strategy(wasmtime::Strategy::Cranelift);
        config
    }
}

/// A compiled WASM module ready for instantiation.
pub struct CompiledModule {
    name: String,
    module: Module,
    hash: u64,
}

impl CompiledModule {
    /// Name the module was compiled under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the underlying Wasmtime module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Get the hash of this module.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("name", &self.name)
            .field("hash", &format_args!("{:016x}", self.hash))
            .finish()
    }
}

/// WASM runtime managing the Wasmtime engine and compiled modules.
pub struct WasmRuntime {
    engine: Engine,
    config: WasmRuntimeConfig,
    module_cache: DashMap<u64, Module>,
}

impl WasmRuntime {
    /// Create a new WASM runtime with the given configuration.
    pub fn new(config: WasmRuntimeConfig) -> Result<Self> {
        let engine =
            Engine::new(&config.to_wasmtime_config()).map_err(|e| MemfsError::WasmLoad {
                module: "engine".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            engine,
            config,
            module_cache: DashMap::new(),
        })
    }

    /// Create a new runtime with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(WasmRuntimeConfig::default())
    }

    /// Get the Wasmtime engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile WASM bytes (binary or text) into a module.
    ///
    /// If caching is enabled and the same bytes were compiled before, the
    /// cached code is reused under `name`.
    pub fn compile(&self, name: &str, wasm_bytes: &[u8]) -> Result<Arc<CompiledModule>> {
        let hash = hash_bytes(wasm_bytes);
        let named = |module: Module| {
            Arc::new(CompiledModule {
                name: name.to_string(),
                module,
                hash,
            })
        };

        if self.config.cache_modules {
            if let Some(cached) = self.module_cache.get(&hash) {
                tracing::debug!(module = name, hash, "module cache hit");
                return Ok(named(cached.value().clone()));
            }
        }

        let started = std::time::Instant::now();
        let module = Module::new(&self.engine, wasm_bytes).map_err(|e| MemfsError::WasmLoad {
            module: name.to_string(),
            cause: e.to_string(),
        })?;
        tracing::info!(
            module = name,
            bytes = wasm_bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compiled module"
        );

        if self.config.cache_modules {
            self.module_cache.insert(hash, module.clone());
        }

        Ok(named(module))
    }

    /// Compile WASM bytes from a host file.
    pub fn compile_file(&self, path: &std::path::Path) -> Result<Arc<CompiledModule>> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        let wasm_bytes = std::fs::read(path).map_err(|e| MemfsError::Io {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;

        self.compile(name, &wasm_bytes)
    }

    /// Get the number of cached modules.
    pub fn cache_size(&self) -> usize {
        self.module_cache.len()
    }

    /// Get the initial fuel amount for new stores.
    pub fn initial_fuel(&self) -> Option<u64> {
        if self.config.fuel_enabled {
            Some(self.config.fuel_amount)
        } else {
            None
        }
    }

    /// Resource limits for a new store.
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory_pages as usize * WASM_PAGE_SIZE)
            .build()
    }
}

/// Compute a hash of bytes (for cache key).
fn hash_bytes(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
