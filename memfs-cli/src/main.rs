//! memfs CLI - run guest modules over an in-memory filesystem.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::run::OutputMode;
use memfs_runtime::observability::{TracingConfig, init_tracing};
use std::path::PathBuf;
use std::process::ExitCode;

/// memfs - host WebAssembly guests on top of an in-memory filesystem module.
#[derive(Parser)]
#[command(name = "memfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Populate a filesystem and run a guest module on it
    Run {
        /// Filesystem support module
        #[arg(long, value_name = "WASM")]
        memfs: PathBuf,

        /// Import a ustar archive (repeatable, applied after files)
        #[arg(long = "tar", value_name = "ARCHIVE")]
        tars: Vec<PathBuf>,

        /// Add a host file, optionally under another guest path
        #[arg(long = "file", value_name = "HOST[=GUEST]")]
        files: Vec<String>,

        /// Create a directory node (applied first)
        #[arg(long = "dir", value_name = "GUEST")]
        dirs: Vec<String>,

        /// Set an environment variable for the guest
        #[arg(long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,

        /// Program name passed as argv[0] (defaults to the module file stem)
        #[arg(long)]
        argv0: Option<String>,

        /// Copy a guest file to the host after the run
        #[arg(long = "extract", value_name = "GUEST=HOST")]
        extract: Vec<String>,

        /// Where guest output lines go
        #[arg(long, value_enum, default_value_t = OutputMode::Stdout)]
        output: OutputMode,

        /// Stop guests after this much fuel (unlimited when omitted)
        #[arg(long, value_name = "UNITS")]
        fuel: Option<u64>,

        /// Largest linear memory any guest may grow to, in 64 KiB pages
        #[arg(long, value_name = "PAGES")]
        max_memory_pages: Option<u32>,

        /// Application module to run
        module: PathBuf,

        /// Arguments for the guest
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List the entries of a ustar archive
    Tar {
        /// Archive to read
        archive: PathBuf,

        /// Hex-dump each file's contents
        #[arg(long)]
        hex: bool,
    },

    /// Show version information
    Version,
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let mut config = TracingConfig::from_env();

    // MEMFS_LOG_LEVEL / RUST_LOG win over -v.
    let filter_from_env =
        std::env::var_os("MEMFS_LOG_LEVEL").is_some() || std::env::var_os("RUST_LOG").is_some();
    if !filter_from_env {
        let filter = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        config = config.with_log_filter(filter);
    }

    init_tracing(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            memfs,
            tars,
            files,
            dirs,
            env,
            argv0,
            extract,
            output,
            fuel,
            max_memory_pages,
            module,
            args,
        } => {
            let options = commands::run::RunOptions {
                memfs,
                tars,
                files,
                dirs,
                env,
                argv0,
                extract,
                output,
                fuel,
                max_memory_pages,
                module,
                args,
            };
            let code = commands::run::run(&options)?;
            Ok(commands::run::exit_status(code))
        }
        Commands::Tar { archive, hex } => {
            commands::tar::run(&archive, hex)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            commands::version::run()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
