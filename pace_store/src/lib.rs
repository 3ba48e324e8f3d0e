//! # pace_store
//!
//! Persistent store facade: a byte-addressable 512 KiB buffer (the FRAM on
//! the board, a memory-mapped file on a hosted target) plus the typed
//! records the firmware keeps in it — sensor calibration, the recorded
//! course, and the run log region.
//!
//! All multi-byte quantities are little-endian. Distances and yaw samples
//! are stored as millimeter / milliradian `u16` fixed point, which bounds
//! them to 65.535 m / rad — ample for the intended course lengths — and a
//! write outside that range fails instead of silently wrapping.

use thiserror::Error;

pub mod file;
pub mod layout;
pub mod mem;
pub mod records;

pub use file::FileStore;
pub use mem::MemStore;
pub use records::{CalibrationRecord, CourseRecord};

/// Store capacity [bytes]: 512 KiB, matching the part on the board.
pub const STORE_CAPACITY: u32 = 0x8_0000;

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors surfaced by the store and its typed records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Access outside the device capacity.
    #[error("store access out of bounds: {addr:#x}+{len}")]
    OutOfBounds {
        /// Start address of the offending access.
        addr: u32,
        /// Length of the offending access.
        len: u32,
    },

    /// A value does not fit the fixed-point wire format.
    #[error("value out of storable range: {what}")]
    OutOfRange {
        /// Which field overflowed.
        what: &'static str,
    },

    /// A stored record fails its own consistency checks.
    #[error("stored record corrupt: {what}")]
    Corrupt {
        /// Which record failed.
        what: &'static str,
    },

    /// Backend I/O error.
    #[error("store I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ─── Store trait ────────────────────────────────────────────────────

/// A byte-addressable persistent buffer with atomic-region operations.
///
/// Each call is atomic with respect to other calls on the same store;
/// backends serialize internally. There is no partial success: a failed
/// read leaves `buf` unspecified, a failed write leaves the region
/// unchanged.
pub trait Store: Send {
    /// Device capacity in bytes.
    fn capacity(&self) -> u32;

    /// Read `buf.len()` bytes starting at `addr`.
    fn read(&self, addr: u32, buf: &mut [u8]) -> StoreResult<()>;

    /// Write `data` starting at `addr`.
    fn write(&mut self, addr: u32, data: &[u8]) -> StoreResult<()>;

    /// Erase the whole device to zero.
    fn clear(&mut self) -> StoreResult<()>;
}

/// Bounds check shared by the backends.
pub(crate) fn check_bounds(capacity: u32, addr: u32, len: usize) -> StoreResult<()> {
    let len32 = u32::try_from(len).map_err(|_| StoreError::OutOfBounds { addr, len: u32::MAX })?;
    if addr.checked_add(len32).is_none_or(|end| end > capacity) {
        return Err(StoreError::OutOfBounds { addr, len: len32 });
    }
    Ok(())
}
