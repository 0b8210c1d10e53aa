//! Shared fixtures: a small filesystem guest written in WAT, application
//! module builders, and a tar archive builder.

#![allow(dead_code)]

use memfs_core::{SeededRng, SharedLines};
use memfs_runtime::{CompiledModule, MemFs, MemFsOptions, WasmRuntime, WasmRuntimeConfig};
use std::sync::Arc;

/// Filesystem guest.
///
/// Memory layout: path buffer at 1024, node table at 4096 with 16-byte
/// entries `[path_ptr, path_len, data_addr, size]`, bump heap from 65536
/// that grows the memory a page at a time. `FindNode` aborts on a miss.
/// Besides the node API it exports `fd_write` (forwarded to `host_write`)
/// and `memfs_read`/`memfs_write`, which move whole files between its
/// memory and the running process through `copy_out`/`copy_in`.
pub const MEMFS_WAT: &str = r#"
(module
  (import "env" "abort" (func $abort))
  (import "env" "host_write" (func $host_write (param i32 i32 i32 i32) (result i32)))
  (import "env" "memfs_log" (func $log (param i32 i32)))
  (import "env" "copy_in" (func $copy_in (param i32 i32 i32)))
  (import "env" "copy_out" (func $copy_out (param i32 i32 i32)))
  (memory (export "memory") 1)
  (global $count (mut i32) (i32.const 0))
  (global $heap (mut i32) (i32.const 65536))
  (data (i32.const 512) "memfs ready")

  (func (export "init")
    (call $log (i32.const 512) (i32.const 11)))

  (func (export "GetPathBuf") (result i32)
    (i32.const 1024))

  (func $alloc (param $size i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local.set $ptr (global.get $heap))
    (local.set $end (i32.add (local.get $ptr) (local.get $size)))
    (block $done
      (loop $grow
        (br_if $done
          (i32.le_u (local.get $end) (i32.mul (memory.size) (i32.const 65536))))
        (if (i32.eq (memory.grow (i32.const 1)) (i32.const -1))
          (then (call $abort)))
        (br $grow)))
    (global.set $heap (local.get $end))
    (local.get $ptr))

  (func $entry (param $inode i32) (result i32)
    (i32.add (i32.const 4096) (i32.mul (local.get $inode) (i32.const 16))))

  (func $add_node (param $path_len i32) (param $size i32) (result i32)
    (local $inode i32)
    (local $entry i32)
    (local $path i32)
    (local.set $path (call $alloc (local.get $path_len)))
    (memory.copy (local.get $path) (i32.const 1024) (local.get $path_len))
    (local.set $inode (global.get $count))
    (local.set $entry (call $entry (local.get $inode)))
    (i32.store (local.get $entry) (local.get $path))
    (i32.store offset=4 (local.get $entry) (local.get $path_len))
    (i32.store offset=8 (local.get $entry) (call $alloc (local.get $size)))
    (i32.store offset=12 (local.get $entry) (local.get $size))
    (global.set $count (i32.add (local.get $inode) (i32.const 1)))
    (local.get $inode))

  (func (export "AddDirectoryNode") (param $path_len i32)
    (drop (call $add_node (local.get $path_len) (i32.const 0))))

  (func (export "AddFileNode") (param $path_len i32) (param $size i32) (result i32)
    (call $add_node (local.get $path_len) (local.get $size)))

  (func $path_eq (param $a i32) (param $b i32) (param $len i32) (result i32)
    (local $i i32)
    (block $differ
      (loop $next
        (if (i32.ge_u (local.get $i) (local.get $len))
          (then (return (i32.const 1))))
        (br_if $differ
          (i32.ne (i32.load8_u (i32.add (local.get $a) (local.get $i)))
                  (i32.load8_u (i32.add (local.get $b) (local.get $i)))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next)))
    (i32.const 0))

  (func (export "FindNode") (param $path_len i32) (result i32)
    (local $inode i32)
    (local $entry i32)
    (block $missing
      (loop $scan
        (br_if $missing (i32.ge_u (local.get $inode) (global.get $count)))
        (local.set $entry (call $entry (local.get $inode)))
        (if (i32.eq (i32.load offset=4 (local.get $entry)) (local.get $path_len))
          (then
            (if (call $path_eq (i32.load (local.get $entry)) (i32.const 1024) (local.get $path_len))
              (then (return (local.get $inode))))))
        (local.set $inode (i32.add (local.get $inode) (i32.const 1)))
        (br $scan)))
    (call $abort)
    (unreachable))

  (func (export "GetFileNodeAddress") (param $inode i32) (result i32)
    (i32.load offset=8 (call $entry (local.get $inode))))

  (func (export "GetFileNodeSize") (param $inode i32) (result i32)
    (i32.load offset=12 (call $entry (local.get $inode))))

  (func (export "fd_write") (param i32 i32 i32 i32) (result i32)
    (call $host_write (local.get 0) (local.get 1) (local.get 2) (local.get 3)))

  (func (export "memfs_read") (param $inode i32) (param $dst i32) (result i32)
    (call $copy_out
      (local.get $dst)
      (i32.load offset=8 (call $entry (local.get $inode)))
      (i32.load offset=12 (call $entry (local.get $inode))))
    (i32.load offset=12 (call $entry (local.get $inode))))

  (func (export "memfs_write") (param $inode i32) (param $src i32)
    (call $copy_in
      (i32.load offset=8 (call $entry (local.get $inode)))
      (local.get $src)
      (i32.load offset=12 (call $entry (local.get $inode)))))
)
"#;

/// A filesystem instance whose output lands in `lines`.
pub struct Harness {
    pub runtime: WasmRuntime,
    pub lines: SharedLines,
    pub fs: MemFs,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(WasmRuntimeConfig::default())
    }

    pub fn with_config(config: WasmRuntimeConfig) -> Self {
        let runtime = WasmRuntime::new(config).expect("Failed to create runtime");
        let lines = SharedLines::new();
        let options = MemFsOptions::new()
            .with_sink(lines.clone())
            .with_rng(SeededRng::new(7));
        let module = compile(&runtime, "memfs", MEMFS_WAT);
        let fs = MemFs::new(&runtime, &module, options).expect("Failed to start memfs");
        Self { runtime, lines, fs }
    }

    pub fn app(&self, name: &str, wat: &str) -> Arc<CompiledModule> {
        compile(&self.runtime, name, wat)
    }
}

pub fn compile(runtime: &WasmRuntime, name: &str, wat: &str) -> Arc<CompiledModule> {
    let wasm = wat::parse_str(wat).expect("Failed to parse WAT");
    runtime.compile(name, &wasm).expect("Failed to compile module")
}

/// Escape arbitrary bytes for a WAT string literal.
fn wat_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}

/// An application that writes `text` to `fd` in one `fd_write` call, then
/// exits with `exit` (or returns from `_start` when `None`).
pub fn write_app(fd: u32, text: &str, exit: Option<i32>) -> String {
    let finish = match exit {
        Some(code) => format!("(call $exit (i32.const {}))", code),
        None => String::new(),
    };
    format!(
        r#"
(module
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\00\01\00\00")
  (data (i32.const 4) "{len}")
  (data (i32.const 256) "{text}")
  (func (export "_start")
    (drop (call $fd_write (i32.const {fd}) (i32.const 0) (i32.const 1) (i32.const 16)))
    {finish}))
"#,
        len = wat_bytes(&(text.len() as u32).to_le_bytes()),
        text = wat_bytes(text.as_bytes()),
        fd = fd,
        finish = finish,
    )
}

/// One tar header record in GNU `ustar` layout.
pub fn tar_header(name: &str, type_flag: u8, size: usize) -> Vec<u8> {
    let mut record = vec![0u8; 512];
    record[..name.len()].copy_from_slice(name.as_bytes());
    record[100..108].copy_from_slice(b"0000644\0");
    record[124..136].copy_from_slice(format!("{:011o}\0", size).as_bytes());
    record[156] = type_flag;
    record[257..265].copy_from_slice(b"ustar  \0");
    record
}

pub fn tar_file(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut out = tar_header(name, b'0', contents.len());
    out.extend_from_slice(contents);
    out.resize(out.len().div_ceil(512) * 512, 0);
    out
}

pub fn tar_dir(name: &str) -> Vec<u8> {
    tar_header(name, b'5', 0)
}
