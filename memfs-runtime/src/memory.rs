//! Accessor over one guest linear memory.
//!
//! A linear memory may grow during any call into its instance, including
//! calls that re-enter the host. Growth can move the backing allocation, so
//! no byte view is ever kept between operations: every method derives a
//! fresh view from the live `wasmtime::Memory` handle before touching it.
//! Offsets are guest addresses (`u32`), values are little-endian.

use memfs_core::error::{MemfsError, Result};
use wasmtime::{AsContext, Memory, StoreContext, StoreContextMut};

/// Typed access to a single linear memory.
///
/// Read operations accept anything convertible into a `StoreContext`
/// (`&Store<T>`, `&Caller<T>`), writes anything convertible into a
/// `StoreContextMut` (`&mut Store<T>`, `&mut Caller<T>`).
#[derive(Debug, Clone, Copy)]
pub struct MemoryAccessor {
    memory: Memory,
}

impl MemoryAccessor {
    /// Wrap a memory handle.
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    /// The underlying memory handle.
    pub fn memory(&self) -> Memory {
        self.memory
    }

    /// Current size of the region in bytes.
    pub fn size(&self, store: impl AsContext) -> usize {
        self.memory.data_size(store)
    }

    /// Read one byte.
    pub fn read8<'a, T: 'static>(
        &self,
        store: impl Into<StoreContext<'a, T>>,
        offset: u32,
    ) -> Result<u8> {
        Ok(self.slice(store, offset, 1)?[0])
    }

    /// Read a word-aligned 32-bit value.
    pub fn read32<'a, T: 'static>(
        &self,
        store: impl Into<StoreContext<'a, T>>,
        offset: u32,
    ) -> Result<u32> {
        check_aligned(offset)?;
        let bytes = self.slice(store, offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write one byte.
    pub fn write8<'a, T: 'static>(
        &self,
        store: impl Into<StoreContextMut<'a, T>>,
        offset: u32,
        value: u8,
    ) -> Result<()> {
        self.slice_mut(store, offset, 1)?[0] = value;
        Ok(())
    }

    /// Write a word-aligned 32-bit value.
    pub fn write32<'a, T: 'static>(
        &self,
        store: impl Into<StoreContextMut<'a, T>>,
        offset: u32,
        value: u32,
    ) -> Result<()> {
        check_aligned(offset)?;
        self.slice_mut(store, offset, 4)?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Write a 64-bit value as two 32-bit words, low word first.
    pub fn write64<'a, T: 'static>(
        &self,
        store: impl Into<StoreContextMut<'a, T>>,
        offset: u32,
        low: u32,
        high: u32,
    ) -> Result<()> {
        check_aligned(offset)?;
        let dest = self.slice_mut(store, offset, 8)?;
        dest[..4].copy_from_slice(&low.to_le_bytes());
        dest[4..].copy_from_slice(&high.to_le_bytes());
        Ok(())
    }

    /// Read a string of single-byte characters.
    ///
    /// Stops at the first NUL, at `offset + len` when a length is given, or at
    /// the end of the region otherwise.
    pub fn read_str<'a, T: 'static>(
        &self,
        store: impl Into<StoreContext<'a, T>>,
        offset: u32,
        len: Option<u32>,
    ) -> Result<String> {
        let data = self.memory.data(store);
        let start = offset as usize;
        let end = match len {
            Some(len) => start + len as usize,
            None if start < data.len() => data.len(),
            None => return Err(out_of_bounds(offset, 1, data.len())),
        };
        let bytes = data
            .get(start..end)
            .ok_or_else(|| out_of_bounds(offset, (end - start) as u64, data.len()))?;
        Ok(bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| char::from(b))
            .collect())
    }

    /// Write `text` one byte per char, followed by a NUL. Returns bytes
    /// written including the NUL.
    ///
    /// Inverse of [`read_str`](Self::read_str); chars above U+00FF are
    /// rejected before anything is written.
    pub fn write_str<'a, T: 'static>(
        &self,
        store: impl Into<StoreContextMut<'a, T>>,
        offset: u32,
        text: &str,
    ) -> Result<u32> {
        let mut bytes = encode_single_byte(text)?;
        bytes.push(0);
        self.write(store, offset, &bytes)
    }

    /// Copy `bytes` into the region at `offset`. Returns the byte count.
    pub fn write<'a, T: 'static>(
        &self,
        store: impl Into<StoreContextMut<'a, T>>,
        offset: u32,
        bytes: &[u8],
    ) -> Result<u32> {
        self.slice_mut(store, offset, bytes.len() as u32)?
            .copy_from_slice(bytes);
        Ok(bytes.len() as u32)
    }

    /// Copy `len` bytes out of the region.
    pub fn read_bytes<'a, T: 'static>(
        &self,
        store: impl Into<StoreContext<'a, T>>,
        offset: u32,
        len: u32,
    ) -> Result<Vec<u8>> {
        Ok(self.slice(store, offset, len)?.to_vec())
    }

    /// Borrow `len` bytes of the region.
    ///
    /// The borrow ties up the store, so the region cannot grow while it lives.
    pub fn slice<'a, T: 'static>(
        &self,
        store: impl Into<StoreContext<'a, T>>,
        offset: u32,
        len: u32,
    ) -> Result<&'a [u8]> {
        let data = self.memory.data(store);
        let size = data.len();
        data.get(offset as usize..offset as usize + len as usize)
            .ok_or_else(|| out_of_bounds(offset, u64::from(len), size))
    }

    fn slice_mut<'a, T: 'static>(
        &self,
        store: impl Into<StoreContextMut<'a, T>>,
        offset: u32,
        len: u32,
    ) -> Result<&'a mut [u8]> {
        let data = self.memory.data_mut(store);
        let size = data.len();
        data.get_mut(offset as usize..offset as usize + len as usize)
            .ok_or_else(|| out_of_bounds(offset, u64::from(len), size))
    }

    /// Borrow `len` bytes of the region mutably alongside the store data.
    pub(crate) fn slice_and_data_mut<'a, T: 'static>(
        &self,
        store: impl Into<StoreContextMut<'a, T>>,
        offset: u32,
        len: u32,
    ) -> Result<(&'a mut [u8], &'a mut T)> {
        let (data, state) = self.memory.data_and_store_mut(store);
        let size = data.len();
        let dest = data
            .get_mut(offset as usize..offset as usize + len as usize)
            .ok_or_else(|| out_of_bounds(offset, u64::from(len), size))?;
        Ok((dest, state))
    }
}

/// One byte per char, as [`MemoryAccessor::read_str`] decodes them.
fn encode_single_byte(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|ch| u8::try_from(ch).map_err(|_| MemfsError::WideCharacter { ch }))
        .collect()
}

fn check_aligned(offset: u32) -> Result<()> {
    if offset % 4 != 0 {
        return Err(MemfsError::MisalignedAccess { offset });
    }
    Ok(())
}

fn out_of_bounds(offset: u32, len: u64, size: usize) -> MemfsError {
    MemfsError::MemoryOutOfBounds {
        offset: u64::from(offset),
        len,
        size: size as u64,
    }
}
