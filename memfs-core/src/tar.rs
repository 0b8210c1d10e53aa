//! Sequential reader for GNU-style `ustar` archives.
//!
//! Archives are a run of 512-byte header records. A regular file's content
//! follows its header and is padded to the next record boundary; a directory
//! has no content. Reading stops at the first record whose magic field is not
//! `"ustar  "`, which also covers the zero-filled end-of-archive records.
//!
//! ```text
//! offset  size  field
//!      0   100  name
//!    100     8  mode (octal)
//!    108     8  owner id (octal)
//!    116     8  group id (octal)
//!    124    12  size (octal)
//!    136    12  modification time (octal)
//!    148     8  checksum (octal)
//!    156     1  type flag
//!    157   100  link name
//!    257     8  magic
//!    265    32  owner name
//!    297    32  group name
//!    329     8  device major
//!    337     8  device minor
//!    345   155  name prefix
//! ```

use crate::error::{MemfsError, Result};

/// Size of one header record.
pub const RECORD_SIZE: usize = 512;

/// Magic field of the archives this reader accepts.
pub const USTAR_MAGIC: &str = "ustar  ";

/// What a header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Type flag `'0'`.
    File,
    /// Type flag `'5'`.
    Directory,
}

/// One archive member. Borrows its content from the archive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry<'a> {
    /// Member name as stored, up to the first NUL.
    pub name: &'a [u8],
    /// Member name decoded one char per byte, for display.
    pub filename: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Permission bits.
    pub mode: u64,
    /// Numeric owner id.
    pub owner: u64,
    /// Numeric group id.
    pub group: u64,
    /// Declared content size in bytes.
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: u64,
    /// Header checksum as stored.
    pub checksum: u64,
    /// Link target name.
    pub linkname: String,
    /// Owner user name.
    pub owner_name: String,
    /// Owner group name.
    pub group_name: String,
    /// Device major number field.
    pub dev_major: String,
    /// Device minor number field.
    pub dev_minor: String,
    /// Name prefix field.
    pub prefix: String,
    /// File content; empty for directories.
    pub contents: &'a [u8],
}

/// Single-pass iterator over the entries of an archive buffer.
#[derive(Debug)]
pub struct TarReader<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> TarReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            done: false,
        }
    }

    /// Current read cursor.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Read the next entry, or `None` at the end of the archive.
    pub fn read_entry(&mut self) -> Result<Option<TarEntry<'a>>> {
        let data: &'a [u8] = self.data;
        if self.offset + RECORD_SIZE > data.len() {
            return Ok(None);
        }

        let name = field_bytes(&data[self.offset..self.offset + 100]);
        let filename = self.read_str(100);
        let mode = self.read_octal(8);
        let owner = self.read_octal(8);
        let group = self.read_octal(8);
        let size = self.read_octal(12);
        let mtime = self.read_octal(12);
        let checksum = self.read_octal(8);
        let type_flag = data[self.offset];
        self.offset += 1;
        let linkname = self.read_str(100);

        if self.read_str(8) != USTAR_MAGIC {
            return Ok(None);
        }

        let owner_name = self.read_str(32);
        let group_name = self.read_str(32);
        let dev_major = self.read_str(8);
        let dev_minor = self.read_str(8);
        let prefix = self.read_str(155);
        self.align_up();

        let (kind, contents) = match type_flag {
            b'0' => {
                let len = usize::try_from(size).unwrap_or(usize::MAX);
                let available = data.len() - self.offset;
                if len > available {
                    return Err(MemfsError::ArchiveTruncated {
                        offset: self.offset,
                        needed: len,
                        available,
                    });
                }
                let contents = &data[self.offset..self.offset + len];
                self.offset += len;
                self.align_up();
                (EntryKind::File, contents)
            }
            b'5' => (EntryKind::Directory, &data[..0]),
            other => {
                return Err(MemfsError::assertion(format!(
                    "unsupported tar type flag {:?} for '{}'",
                    char::from(other),
                    filename
                )));
            }
        };

        Ok(Some(TarEntry {
            name,
            filename,
            kind,
            mode,
            owner,
            group,
            size,
            mtime,
            checksum,
            linkname,
            owner_name,
            group_name,
            dev_major,
            dev_minor,
            prefix,
            contents,
        }))
    }

    /// Read a NUL-terminated field of `len` bytes and advance past all of it.
    fn read_str(&mut self, len: usize) -> String {
        let end = (self.offset + len).min(self.data.len());
        let field = &self.data[self.offset..end];
        self.offset += len;
        decode_field(field)
    }

    fn read_octal(&mut self, len: usize) -> u64 {
        parse_octal(&self.read_str(len))
    }

    fn align_up(&mut self) {
        self.offset = (self.offset + RECORD_SIZE - 1) & !(RECORD_SIZE - 1);
    }
}

impl<'a> Iterator for TarReader<'a> {
    type Item = Result<TarEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Bytes up to the first NUL.
fn field_bytes(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Bytes up to the first NUL, one char per byte.
fn decode_field(field: &[u8]) -> String {
    field_bytes(field).iter().map(|&b| char::from(b)).collect()
}

/// Leading octal digits after optional padding; anything else reads as 0.
fn parse_octal(text: &str) -> u64 {
    text.trim_start_matches(' ')
        .bytes()
        .take_while(|b| (b'0'..=b'7').contains(b))
        .fold(0u64, |acc, b| acc.wrapping_mul(8).wrapping_add(u64::from(b - b'0')))
}
