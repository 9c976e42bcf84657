use embedded_storage::{ReadStorage, Storage};
use thiserror_no_std::Error;

/// Value of erased (never written) storage bytes.
pub const ERASED: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RamStorageError {
    #[error("access of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds { offset: u32, len: usize },
}

/// In-memory byte storage that starts out erased, like a fresh EEPROM.
#[derive(Debug, Clone)]
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RamStorage<N> {
    pub const fn new() -> Self {
        Self { bytes: [ERASED; N] }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn erase(&mut self) {
        self.bytes = [ERASED; N];
    }

    fn range(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, RamStorageError> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= N)
            .ok_or(RamStorageError::OutOfBounds { offset, len })?;
        Ok(start..end)
    }
}

impl<const N: usize> ReadStorage for RamStorage<N> {
    type Error = RamStorageError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Storage for RamStorage<N> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}
