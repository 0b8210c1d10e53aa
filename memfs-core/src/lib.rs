//! memfs core library.
//!
//! Engine-independent building blocks for hosting sandboxed guests over an
//! in-memory filesystem:
//!
//! - **Errors**: the fatal condition taxonomy plus the structured process exit
//! - **Output**: line buffering between guest `fd_write` calls and a line sink
//! - **Tar**: sequential `ustar` reader used to bulk-populate the filesystem
//! - **Environ**: ordered guest environment and syscall table sizing
//! - **Rng**: pseudo-random providers backing `random_get`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod environ;
pub mod error;
pub mod hexdump;
pub mod output;
pub mod rng;
pub mod tar;

pub use environ::{Environ, TableSizes};
pub use error::{MemfsError, Result};
pub use output::{GUEST_TARGET, LineSink, OutputAggregator, SharedLines, StdoutSink, TracingSink};
pub use rng::{RealRng, RngProvider, SeededRng};
pub use tar::{EntryKind, TarEntry, TarReader};
