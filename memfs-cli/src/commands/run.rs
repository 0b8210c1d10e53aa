//! Run command - populate a filesystem and run a guest module on it.

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use memfs_core::{Environ, StdoutSink, TracingSink};
use memfs_runtime::{MemFs, MemFsOptions, ProcessConfig, WasmRuntime, WasmRuntimeConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Where guest output lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Print each line on stdout.
    #[default]
    Stdout,
    /// Log each line as an info event under `memfs::guest`.
    Tracing,
}

/// Everything `memfs run` was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Filesystem support module.
    pub memfs: PathBuf,
    /// Archives imported after the individual files.
    pub tars: Vec<PathBuf>,
    /// `HOST[=GUEST]` file specs.
    pub files: Vec<String>,
    /// Directories created before anything else.
    pub dirs: Vec<String>,
    /// `NAME=VALUE` environment overrides.
    pub env: Vec<String>,
    /// Program name override.
    pub argv0: Option<String>,
    /// `GUEST=HOST` files copied out after the run.
    pub extract: Vec<String>,
    /// Destination of guest output.
    pub output: OutputMode,
    /// Fuel limit for guest execution.
    pub fuel: Option<u64>,
    /// Linear memory limit in pages.
    pub max_memory_pages: Option<u32>,
    /// Application module.
    pub module: PathBuf,
    /// Guest arguments after the program name.
    pub args: Vec<String>,
}

fn runtime_config(options: &RunOptions) -> WasmRuntimeConfig {
    let mut config = WasmRuntimeConfig::default();
    if let Some(fuel) = options.fuel {
        config = config.with_fuel(true, fuel);
    }
    if let Some(pages) = options.max_memory_pages {
        config = config.with_max_memory_pages(pages);
    }
    config
}

fn fs_options(output: OutputMode) -> MemFsOptions {
    match output {
        OutputMode::Stdout => MemFsOptions::new().with_sink(StdoutSink),
        OutputMode::Tracing => MemFsOptions::new().with_sink(TracingSink),
    }
}

/// Run the command. Returns the guest's exit status.
pub fn run(options: &RunOptions) -> Result<i32> {
    let runtime = WasmRuntime::new(runtime_config(options))?;
    let fs_module = runtime
        .compile_file(&options.memfs)
        .with_context(|| format!("Failed to load filesystem module {}", options.memfs.display()))?;
    let app = runtime
        .compile_file(&options.module)
        .with_context(|| format!("Failed to load module {}", options.module.display()))?;

    let mut fs = MemFs::new(&runtime, &fs_module, fs_options(options.output))
        .context("Failed to initialize filesystem")?;

    for dir in &options.dirs {
        fs.add_directory(dir)?;
    }
    for spec in &options.files {
        let (host, guest) = parse_file_spec(spec);
        let contents =
            std::fs::read(host).with_context(|| format!("Failed to read input file {}", host))?;
        fs.add_file(guest, &contents)?;
    }
    for tar in &options.tars {
        let archive = std::fs::read(tar)
            .with_context(|| format!("Failed to read archive {}", tar.display()))?;
        fs.import_tar(&archive)
            .with_context(|| format!("Failed to import archive {}", tar.display()))?;
    }

    let config = process_config(options)?;
    tracing::info!(module = %options.module.display(), argv = ?config.argv(), "Running guest");

    let outcome = fs.run(&app, config);
    fs.flush_output();
    let code = match outcome {
        Ok(()) => 0,
        Err(e) => e.exit_code().ok_or(e).context("Guest process failed")?,
    };

    for spec in &options.extract {
        let (guest, host) = parse_extract_spec(spec)?;
        let contents = fs
            .file_contents(guest)
            .with_context(|| format!("Failed to extract {}", guest))?;
        std::fs::write(host, contents).with_context(|| format!("Failed to write {}", host))?;
        tracing::info!(guest, host, bytes = contents.len(), "Extracted file");
    }

    Ok(code)
}

/// Map a guest exit status onto a process exit code.
pub fn exit_status(code: i32) -> ExitCode {
    match code {
        0 => ExitCode::SUCCESS,
        c => ExitCode::from(u8::try_from(c).unwrap_or(1)),
    }
}

/// Build argv and environment from the options.
fn process_config(options: &RunOptions) -> Result<ProcessConfig> {
    let name = match &options.argv0 {
        Some(name) => name.clone(),
        None => module_stem(&options.module),
    };

    let mut config = ProcessConfig::new(name).args(options.args.iter().cloned());
    for pair in &options.env {
        let (name, value) = Environ::parse_pair(pair)
            .ok_or_else(|| anyhow!("Invalid --env '{}', expected NAME=VALUE", pair))?;
        config = config.env(name, value);
    }
    Ok(config)
}

fn module_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("a.out")
        .to_string()
}

/// `HOST=GUEST` or just `HOST`, which keeps the same path in the guest.
fn parse_file_spec(spec: &str) -> (&str, &str) {
    spec.split_once('=').unwrap_or((spec, spec))
}

fn parse_extract_spec(spec: &str) -> Result<(&str, &str)> {
    match spec.split_once('=') {
        Some((guest, host)) if !guest.is_empty() && !host.is_empty() => Ok((guest, host)),
        _ => Err(anyhow!("Invalid --extract '{}', expected GUEST=HOST", spec)),
    }
}
