//! Integration tests for the filesystem bridge.

mod common;

use common::{Harness, MEMFS_WAT, compile, tar_dir, tar_file, tar_header};
use memfs_core::MemfsError;
use memfs_runtime::{ImportSummary, MemFs, MemFsOptions, WASM_PAGE_SIZE, WasmRuntime};

#[test]
fn file_contents_round_trip() {
    let mut h = Harness::new();
    let a = h.fs.add_file("a.txt", b"alpha").unwrap();
    let b = h.fs.add_file("dir/b.txt", b"bravo\n").unwrap();
    assert_ne!(a, b);

    assert_eq!(h.fs.file_contents("a.txt").unwrap(), b"alpha");
    assert_eq!(h.fs.file_contents("dir/b.txt").unwrap(), b"bravo\n");
    assert_eq!(h.fs.find("a.txt").unwrap(), a);
}

#[test]
fn empty_file_reads_back_empty() {
    let mut h = Harness::new();
    h.fs.add_file("empty", b"").unwrap();
    assert!(h.fs.file_contents("empty").unwrap().is_empty());
}

#[test]
fn directories_are_nodes() {
    let mut h = Harness::new();
    h.fs.add_directory("include").unwrap();
    h.fs.add_file("include/stdio.h", b"int printf(const char *, ...);").unwrap();

    assert_eq!(h.fs.find("include").unwrap().raw(), 0);
    assert_eq!(
        h.fs.file_contents("include/stdio.h").unwrap(),
        b"int printf(const char *, ...);"
    );
}

#[test]
fn missing_path_aborts() {
    let mut h = Harness::new();
    h.fs.add_file("present", b"x").unwrap();
    let err = h.fs.file_contents("absent").unwrap_err();
    assert_eq!(err, MemfsError::Abort);
    assert_eq!(err.code(), "E101");
}

#[test]
fn contents_survive_memory_growth() {
    let mut h = Harness::new();
    h.fs.add_file("small", b"before growth").unwrap();
    let before = h.fs.memory_size();

    let big: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    h.fs.add_file("big", &big).unwrap();

    let after = h.fs.memory_size();
    assert!(after >= before + 4 * WASM_PAGE_SIZE);
    assert_eq!(h.fs.file_contents("big").unwrap(), &big[..]);
    assert_eq!(h.fs.file_contents("small").unwrap(), b"before growth");
}

#[test]
fn import_tar_adds_entries_in_order() {
    let mut h = Harness::new();
    let mut archive = tar_dir("lib/");
    archive.extend(tar_file("lib/a.h", b"int a;\n"));
    archive.extend(tar_file("lib/empty.h", b""));
    archive.extend(tar_file("lib/b.h", &[b'b'; 700]));
    archive.extend(vec![0u8; 1024]);

    let summary = h.fs.import_tar(&archive).unwrap();
    assert_eq!(
        summary,
        ImportSummary {
            files: 3,
            directories: 1,
            bytes: 707,
        }
    );
    assert_eq!(h.fs.find("lib/").unwrap().raw(), 0);
    assert_eq!(h.fs.file_contents("lib/a.h").unwrap(), b"int a;\n");
    assert!(h.fs.file_contents("lib/empty.h").unwrap().is_empty());
    assert_eq!(h.fs.file_contents("lib/b.h").unwrap().len(), 700);
}

#[test]
fn non_ascii_archive_names_are_found_by_name() {
    let mut h = Harness::new();
    let mut archive = tar_dir("d\u{e9}j\u{e0}/");
    archive.extend(tar_file("d\u{e9}j\u{e0}/caf\u{e9}.txt", b"data"));
    // A Latin-1 name byte that is not valid UTF-8 on its own.
    let mut latin1 = tar_file("cafe.bin", b"raw");
    latin1[3] = 0xe9;
    archive.extend(latin1);

    let summary = h.fs.import_tar(&archive).unwrap();
    assert_eq!(summary.files, 2);
    assert_eq!(h.fs.find("d\u{e9}j\u{e0}/").unwrap().raw(), 0);
    assert_eq!(
        h.fs.file_contents("d\u{e9}j\u{e0}/caf\u{e9}.txt").unwrap(),
        b"data"
    );
    assert_eq!(h.fs.file_contents(b"caf\xe9.bin").unwrap(), b"raw");
    assert_eq!(
        h.fs.file_contents("caf\u{e9}.bin").unwrap_err(),
        MemfsError::Abort
    );
}

#[test]
fn byte_paths_round_trip() {
    let mut h = Harness::new();
    let path: &[u8] = b"bin/\xff\x80";
    let inode = h.fs.add_file(path, b"payload").unwrap();
    assert_eq!(h.fs.find(path).unwrap(), inode);
    assert_eq!(h.fs.file_contents(path).unwrap(), b"payload");
}

#[test]
fn truncated_archive_is_an_error() {
    let mut h = Harness::new();
    let mut archive = tar_file("ok", b"fine");
    archive.extend(tar_header("short", b'0', 2048));
    archive.extend_from_slice(&[0u8; 10]);

    let err = h.fs.import_tar(&archive).unwrap_err();
    assert_eq!(err.code(), "E301");
    // Entries before the damaged one are already in place.
    assert_eq!(h.fs.file_contents("ok").unwrap(), b"fine");
}

#[test]
fn unsupported_entry_type_is_an_assertion() {
    let mut h = Harness::new();
    let archive = tar_header("link", b'2', 0);
    assert_eq!(h.fs.import_tar(&archive).unwrap_err().code(), "E103");
}

#[test]
fn module_without_node_api_is_rejected() {
    let runtime = WasmRuntime::with_defaults().unwrap();
    let module = compile(
        &runtime,
        "bare",
        r#"(module (memory (export "memory") 1) (func (export "init")))"#,
    );
    let err = MemFs::new(&runtime, &module, MemFsOptions::default()).unwrap_err();
    assert_eq!(
        err,
        MemfsError::WasmMissingExport {
            module: "bare".to_string(),
            export: "GetPathBuf".to_string(),
        }
    );
}

#[test]
fn module_without_memory_is_rejected() {
    let runtime = WasmRuntime::with_defaults().unwrap();
    let module = compile(&runtime, "nomem", "(module (func (export \"init\")))");
    let err = MemFs::new(&runtime, &module, MemFsOptions::default()).unwrap_err();
    assert_eq!(err.code(), "E403");
}

#[test]
fn unknown_env_import_fails_instantiation() {
    let runtime = WasmRuntime::with_defaults().unwrap();
    let module = compile(
        &runtime,
        "needy",
        r#"(module (import "env" "emscripten_memcpy_big" (func)) (memory (export "memory") 1))"#,
    );
    let err = MemFs::new(&runtime, &module, MemFsOptions::default()).unwrap_err();
    assert_eq!(err.code(), "E402");
}

/// The filesystem guest with `init` replaced by `body`.
fn memfs_with_init(body: &str) -> String {
    let init = "(call $log (i32.const 512) (i32.const 11))";
    assert!(MEMFS_WAT.contains(init));
    MEMFS_WAT.replace(init, body)
}

#[test]
fn process_callbacks_need_a_running_process() {
    let bodies = [
        "(drop (call $host_write (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0)))",
        "(call $copy_in (i32.const 2048) (i32.const 0) (i32.const 4))",
        "(call $copy_out (i32.const 0) (i32.const 2048) (i32.const 4))",
    ];
    let runtime = WasmRuntime::with_defaults().unwrap();
    for (i, body) in bodies.iter().enumerate() {
        let module = compile(&runtime, &format!("early{i}"), &memfs_with_init(body));
        let err = MemFs::new(&runtime, &module, MemFsOptions::default()).unwrap_err();
        assert_eq!(err, MemfsError::ForeignMemoryUnbound, "init body {body}");
    }
}

#[test]
fn init_log_goes_to_tracing_not_output() {
    let mut h = Harness::new();
    h.fs.flush_output();
    assert!(h.lines.lines().is_empty());
    // The same module compiles to a cached entry.
    let again = compile(&h.runtime, "memfs", MEMFS_WAT);
    assert_eq!(again.name(), "memfs");
    assert_eq!(h.runtime.cache_size(), 1);
}
