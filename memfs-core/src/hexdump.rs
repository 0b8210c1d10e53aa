//! Hex dump formatting for diagnostics.

use std::fmt::Write;

const BYTES_PER_ROW: usize = 16;

/// Column where the ASCII rendering starts.
const ASCII_COLUMN: usize = 51;

/// Render `bytes` as rows of `offset: hex pairs  ascii`, one row per 16 bytes.
///
/// ```
/// let dump = memfs_core::hexdump::format(b"hi!");
/// assert_eq!(dump, format!("00000000: 6869 21{}hi!\n", " ".repeat(34)));
/// ```
pub fn format(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        let mut line = format!("{:08x}:", row * BYTES_PER_ROW);
        for pair in chunk.chunks(2) {
            line.push(' ');
            for b in pair {
                let _ = write!(line, "{:02x}", b);
            }
        }
        while line.len() < ASCII_COLUMN {
            line.push(' ');
        }
        line.extend(chunk.iter().map(|&b| if is_print(b) { char::from(b) } else { '.' }));
        line.push('\n');
        out.push_str(&line);
    }
    out
}

fn is_print(b: u8) -> bool {
    (32..128).contains(&b)
}
