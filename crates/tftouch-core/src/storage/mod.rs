//! Persistent calibration storage.
//!
//! The touch handler keeps its calibration in a small non-volatile slot
//! (EEPROM, a flash page, or RAM in tests) so a panel only has to be
//! calibrated once.
//!
//! # Slot layout
//!
//! ```text
//! base + 0      flag      0x01 calibrated, 0x00 cleared, 0xFF never written
//! base + 1..3   length    u16 little endian, 0xFFFF when no record was saved
//! base + 3..    payload   postcard-encoded CalibrationRecord
//! ```
//!
//! Every write is read back and compared, a medium that silently drops
//! writes shows up as [`StorageError::Mismatch`].

mod ram;

pub use ram::{ERASED, RamStorage, RamStorageError};

use embedded_storage::{ReadStorage, Storage};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::calibration::{
    AxisCalibration, Calibration, CalibrationGeometry, CalibrationResult, Markers,
};

/// Largest encoded record the slot accepts.
pub const RECORD_CAPACITY: usize = 256;

/// Bytes needed for a full slot, header included.
pub const SLOT_SIZE: usize = RECORD_OFFSET as usize + LENGTH_LEN + RECORD_CAPACITY;

const FLAG_OFFSET: u32 = 0;
const RECORD_OFFSET: u32 = 1;
const LENGTH_LEN: usize = 2;

const FLAG_CALIBRATED: u8 = 0x01;
const FLAG_CLEARED: u8 = 0x00;
const NO_RECORD: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage medium access failed")]
    Medium,
    #[error("calibration record could not be encoded")]
    Encode,
    #[error("calibration record could not be decoded")]
    Decode,
    #[error("stored record length {0} exceeds the slot")]
    TooLarge(usize),
    #[error("read-back after write does not match")]
    Mismatch,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Serialized form of a calibration, tagged with the geometry it was
/// captured for.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CalibrationRecord {
    pub geometry: CalibrationGeometry,
    pub x_markers: Markers,
    pub y_markers: Markers,
    pub x_reversed: bool,
    pub y_reversed: bool,
}

impl CalibrationRecord {
    pub fn new(geometry: CalibrationGeometry, calibration: &Calibration) -> Self {
        // Both axes were validated on construction, so they fit.
        let mut x_markers = Markers::new();
        let _ = x_markers.extend_from_slice(calibration.x.markers());
        let mut y_markers = Markers::new();
        let _ = y_markers.extend_from_slice(calibration.y.markers());
        Self {
            geometry,
            x_markers,
            y_markers,
            x_reversed: calibration.x.is_reversed(),
            y_reversed: calibration.y.is_reversed(),
        }
    }

    /// Rebuild and revalidate the calibration.
    pub fn to_calibration(&self) -> CalibrationResult<Calibration> {
        let spacing = self.geometry.cell_size;
        Ok(Calibration::new(
            AxisCalibration::new(&self.x_markers, spacing, self.x_reversed)?,
            AxisCalibration::new(&self.y_markers, spacing, self.y_reversed)?,
        ))
    }
}

/// Where the touch handler loads and saves its calibration.
pub trait CalibrationStore {
    /// Whether the slot has never been written.
    fn is_virgin(&mut self) -> StorageResult<bool>;

    fn is_calibrated(&mut self) -> StorageResult<bool>;

    fn set_calibrated(&mut self, calibrated: bool) -> StorageResult<()>;

    /// The stored record, `None` if nothing was saved yet.
    fn load(&mut self) -> StorageResult<Option<CalibrationRecord>>;

    fn save(&mut self, record: &CalibrationRecord) -> StorageResult<()>;
}

/// [`CalibrationStore`] occupying one slot of an `embedded-storage` medium.
pub struct SlotStore<M> {
    medium: M,
    base: u32,
}

impl<M> SlotStore<M>
where
    M: ReadStorage + Storage,
    M::Error: core::fmt::Debug,
{
    /// Use the slot starting at `base`, see [`SLOT_SIZE`].
    pub const fn new(medium: M, base: u32) -> Self {
        Self { medium, base }
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    pub fn into_inner(self) -> M {
        self.medium
    }

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> StorageResult<()> {
        self.medium
            .read(self.base + offset, bytes)
            .map_err(|e| {
                warn!("Storage read at {} failed: {:?}", self.base + offset, e);
                StorageError::Medium
            })
    }

    fn write_verified(&mut self, offset: u32, bytes: &[u8]) -> StorageResult<()> {
        self.medium.write(self.base + offset, bytes).map_err(|e| {
            warn!("Storage write at {} failed: {:?}", self.base + offset, e);
            StorageError::Medium
        })?;

        let mut readback = [0u8; SLOT_SIZE];
        let readback = &mut readback[..bytes.len()];
        self.read(offset, readback)?;
        if readback != bytes {
            warn!("Storage read-back at {} does not match", self.base + offset);
            return Err(StorageError::Mismatch);
        }
        Ok(())
    }
}

impl<M> CalibrationStore for SlotStore<M>
where
    M: ReadStorage + Storage,
    M::Error: core::fmt::Debug,
{
    fn is_virgin(&mut self) -> StorageResult<bool> {
        let mut header = [0u8; 1 + LENGTH_LEN];
        self.read(FLAG_OFFSET, &mut header)?;
        Ok(header.iter().all(|&b| b == ERASED))
    }

    fn is_calibrated(&mut self) -> StorageResult<bool> {
        let mut flag = [0u8; 1];
        self.read(FLAG_OFFSET, &mut flag)?;
        Ok(flag[0] == FLAG_CALIBRATED)
    }

    fn set_calibrated(&mut self, calibrated: bool) -> StorageResult<()> {
        let flag = if calibrated {
            FLAG_CALIBRATED
        } else {
            FLAG_CLEARED
        };
        self.write_verified(FLAG_OFFSET, &[flag])
    }

    fn load(&mut self) -> StorageResult<Option<CalibrationRecord>> {
        let mut length = [0u8; LENGTH_LEN];
        self.read(RECORD_OFFSET, &mut length)?;
        let length = u16::from_le_bytes(length);
        if length == NO_RECORD {
            return Ok(None);
        }

        let length = length as usize;
        if length > RECORD_CAPACITY {
            return Err(StorageError::TooLarge(length));
        }

        let mut payload = [0u8; RECORD_CAPACITY];
        self.read(RECORD_OFFSET + LENGTH_LEN as u32, &mut payload[..length])?;
        postcard::from_bytes(&payload[..length])
            .map(Some)
            .map_err(|e| {
                warn!("Stored calibration record is corrupt: {:?}", e);
                StorageError::Decode
            })
    }

    fn save(&mut self, record: &CalibrationRecord) -> StorageResult<()> {
        let mut buf = [ERASED; LENGTH_LEN + RECORD_CAPACITY];
        let used = postcard::to_slice(record, &mut buf[LENGTH_LEN..])
            .map_err(|e| {
                warn!("Failed to encode calibration record: {:?}", e);
                StorageError::Encode
            })?
            .len();
        buf[..LENGTH_LEN].copy_from_slice(&(used as u16).to_le_bytes());

        debug!("Saving {} byte calibration record", used);
        self.write_verified(RECORD_OFFSET, &buf[..LENGTH_LEN + used])
    }
}
