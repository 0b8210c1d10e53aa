//! Error types for memfs.
//!
//! Every condition a guest run can end in is a variant here, including the
//! structured process exit. Messages carry a stable code prefix so faults can
//! be matched in logs without parsing prose.

use thiserror::Error;

/// The main error type for memfs operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemfsError {
    // =========================================================================
    // Guest control conditions (E101-E199)
    // =========================================================================
    /// The filesystem guest asked to terminate abnormally.
    #[error("E101: abort")]
    Abort,

    /// A guest called a syscall that is deliberately unsupported.
    #[error("E102: {table}.{field} not implemented")]
    NotImplemented {
        /// Import namespace the call was made through.
        table: String,
        /// Name of the import.
        field: String,
    },

    /// An internal invariant did not hold.
    #[error("E103: assertion failed: {message}")]
    AssertionViolation {
        /// What was being checked.
        message: String,
    },

    /// A guest called `proc_exit`.
    #[error("E104: process exited with code {code}")]
    ProcessExit {
        /// The exit code passed by the guest.
        code: i32,
    },

    // =========================================================================
    // Memory errors (E201-E299)
    // =========================================================================
    /// An access fell outside the current bounds of a memory region.
    #[error("E201: memory access out of bounds: offset {offset}, length {len}, region size {size}")]
    MemoryOutOfBounds {
        /// First byte of the access.
        offset: u64,
        /// Number of bytes accessed.
        len: u64,
        /// Size of the region at the time of the access.
        size: u64,
    },

    /// A 32-bit access was not word-aligned.
    #[error("E202: misaligned 32-bit access at offset {offset}")]
    MisalignedAccess {
        /// The offending byte offset.
        offset: u32,
    },

    /// A cross-memory operation ran before any guest process was bound.
    #[error("E203: no guest process memory is bound")]
    ForeignMemoryUnbound,

    /// A string holds a character with no single-byte encoding.
    #[error("E204: character {ch:?} does not fit in one byte")]
    WideCharacter {
        /// The first offending character.
        ch: char,
    },

    // =========================================================================
    // Archive errors (E301-E399)
    // =========================================================================
    /// A file entry declares more content than the archive holds.
    #[error("E301: archive truncated at offset {offset}: entry needs {needed} bytes, {available} available")]
    ArchiveTruncated {
        /// Offset where the entry content starts.
        offset: usize,
        /// Declared content size.
        needed: usize,
        /// Bytes remaining in the archive.
        available: usize,
    },

    // =========================================================================
    // Engine errors (E401-E499)
    // =========================================================================
    /// Compiling a module failed.
    #[error("E401: failed to load WASM module '{module}': {cause}")]
    WasmLoad {
        /// The module name.
        module: String,
        /// Reason for the failure.
        cause: String,
    },

    /// Instantiating a module failed.
    #[error("E402: failed to instantiate WASM module '{module}': {cause}")]
    WasmInstantiate {
        /// The module name.
        module: String,
        /// Reason for the failure.
        cause: String,
    },

    /// A module is missing an export the host relies on.
    #[error("E403: WASM module '{module}' does not export '{export}'")]
    WasmMissingExport {
        /// The module name.
        module: String,
        /// Name of the missing export.
        export: String,
    },

    /// A guest function trapped.
    #[error("E404: WASM function '{function}' trapped: {cause}")]
    WasmTrap {
        /// The guest function that was called.
        function: String,
        /// Trap description from the engine.
        cause: String,
    },

    /// Defining a host function failed.
    #[error("E405: WASM host function '{function}' failed: {cause}")]
    WasmHostFunction {
        /// The host function name.
        function: String,
        /// Reason for the failure.
        cause: String,
    },

    // =========================================================================
    // I/O errors (E901-E999)
    // =========================================================================
    /// Host I/O failed.
    #[error("E901: I/O error at {path}: {cause}")]
    Io {
        /// Host path involved.
        path: String,
        /// Reason for the failure.
        cause: String,
    },
}

/// Result type alias for memfs operations.
pub type Result<T> = std::result::Result<T, MemfsError>;

impl MemfsError {
    /// Build an assertion violation.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionViolation {
            message: message.into(),
        }
    }

    /// Build a not-implemented condition for `table.field`.
    pub fn not_implemented(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::NotImplemented {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Abort => "E101",
            Self::NotImplemented { .. } => "E102",
            Self::AssertionViolation { .. } => "E103",
            Self::ProcessExit { .. } => "E104",
            Self::MemoryOutOfBounds { .. } => "E201",
            Self::MisalignedAccess { .. } => "E202",
            Self::ForeignMemoryUnbound => "E203",
            Self::WideCharacter { .. } => "E204",
            Self::ArchiveTruncated { .. } => "E301",
            Self::WasmLoad { .. } => "E401",
            Self::WasmInstantiate { .. } => "E402",
            Self::WasmMissingExport { .. } => "E403",
            Self::WasmTrap { .. } => "E404",
            Self::WasmHostFunction { .. } => "E405",
            Self::Io { .. } => "E901",
        }
    }

    /// Exit code carried by a `ProcessExit`.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessExit { code } => Some(*code),
            _ => None,
        }
    }

    /// True only for `proc_exit(0)`, which the invocation boundary swallows.
    #[must_use]
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, Self::ProcessExit { code: 0 })
    }
}
