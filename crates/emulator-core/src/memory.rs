//! Flat byte-addressed main memory.
//!
//! A single coarse lock makes each `read`/`write` call atomic with respect
//! to concurrent accesses of overlapping ranges; tearing within one call is
//! not observable. Scalar accesses are little-endian.

use std::sync::Mutex;

use crate::fault::CoreError;

/// Default size of the flat address space (2 MiB).
pub const MAIN_MEMORY_BYTES: usize = 0x20_0000;

/// Address where firmware is loaded and execution begins.
pub const BIOS_START: u64 = 0xC1800;

/// Mutex-guarded flat memory.
#[derive(Debug)]
pub struct MainMemory {
    length: usize,
    bytes: Mutex<Box<[u8]>>,
}

impl MainMemory {
    /// Allocates a zeroed memory of `length` bytes.
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self {
            length,
            bytes: Mutex::new(vec![0; length].into_boxed_slice()),
        }
    }

    /// Total size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// True when the memory has zero length.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn range(&self, address: u64, length: usize) -> Result<std::ops::Range<usize>, CoreError> {
        let start = usize::try_from(address).ok().filter(|s| *s <= self.length);
        let end = start.and_then(|s| s.checked_add(length)).filter(|e| *e <= self.length);
        match (start, end) {
            (Some(start), Some(end)) => Ok(start..end),
            _ => Err(CoreError::IllegalInstruction(format!(
                "memory access out of range: {address:#X}+{length}"
            ))),
        }
    }

    /// Reads `buffer.len()` consecutive bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] when the range falls
    /// outside the address space.
    ///
    /// # Panics
    ///
    /// Panics if the memory lock is poisoned.
    pub fn read(&self, address: u64, buffer: &mut [u8]) -> Result<(), CoreError> {
        let range = self.range(address, buffer.len())?;
        let bytes = self.bytes.lock().expect("memory lock poisoned");
        buffer.copy_from_slice(&bytes[range]);
        Ok(())
    }

    /// Writes `data` as consecutive bytes starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] when the range falls
    /// outside the address space.
    ///
    /// # Panics
    ///
    /// Panics if the memory lock is poisoned.
    pub fn write(&self, address: u64, data: &[u8]) -> Result<(), CoreError> {
        let range = self.range(address, data.len())?;
        let mut bytes = self.bytes.lock().expect("memory lock poisoned");
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Reads a little-endian scalar of `length` bytes (at most 8),
    /// zero-extended into a 64-bit cell.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] for an out-of-range access.
    pub fn read_uint(&self, address: u64, length: usize) -> Result<u64, CoreError> {
        let mut bytes = [0u8; 8];
        self.read(address, &mut bytes[..length.min(8)])?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Writes the low `length` bytes (at most 8) of `value`, little-endian.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalInstruction`] for an out-of-range access.
    pub fn write_uint(&self, address: u64, value: u64, length: usize) -> Result<(), CoreError> {
        let bytes = value.to_le_bytes();
        self.write(address, &bytes[..length.min(8)])
    }
}
