//! Version command - show version information.

use anyhow::Result;

/// Version information.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command.
pub fn run() -> Result<()> {
    println!("memfs - WebAssembly guests over an in-memory filesystem");
    println!();
    println!("Version:     {}", VERSION);
    println!(
        "Platform:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!("Syscalls:    {}", memfs_runtime::WASI_MODULE);
    println!();
    println!("Components:");
    println!("  memfs-core     Errors, output buffering, tar reader, environment");
    println!("  memfs-runtime  Wasmtime host, filesystem bridge, guest processes");
    println!("  memfs-cli      Command-line interface");

    Ok(())
}
