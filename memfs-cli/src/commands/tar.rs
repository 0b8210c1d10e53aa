//! Tar command - list archive entries.

use anyhow::{Context, Result};
use memfs_core::hexdump;
use memfs_core::tar::{EntryKind, TarReader};
use std::fmt::Write;
use std::path::Path;

/// Run the tar command.
pub fn run(archive: &Path, hex: bool) -> Result<()> {
    let bytes = std::fs::read(archive)
        .with_context(|| format!("Failed to read archive {}", archive.display()))?;

    tracing::info!(archive = %archive.display(), bytes = bytes.len(), "Listing archive");
    print!("{}", describe(&bytes, hex)?);
    Ok(())
}

/// One line per entry (`d`/`f`, size, name), then a total.
pub fn describe(archive: &[u8], hex: bool) -> Result<String> {
    let mut out = String::new();
    let mut entries = 0usize;
    let mut bytes = 0u64;

    for entry in TarReader::new(archive) {
        let entry = entry.context("Malformed archive")?;
        let kind = match entry.kind {
            EntryKind::File => 'f',
            EntryKind::Directory => 'd',
        };
        writeln!(out, "{} {:>10} {}", kind, entry.size, entry.filename)?;
        if hex && entry.kind == EntryKind::File {
            out.push_str(&hexdump::format(entry.contents));
        }
        entries += 1;
        bytes += entry.contents.len() as u64;
    }

    writeln!(out, "{} entries, {} bytes", entries, bytes)?;
    Ok(out)
}
