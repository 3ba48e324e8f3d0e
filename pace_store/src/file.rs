//! Memory-mapped file store backend.
//!
//! Stands in for the FRAM on hosted targets: a fixed-size file mapped
//! read-write, flushed after every mutating region operation so a crash
//! between runs loses nothing already committed.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;
use tracing::debug;

use crate::{check_bounds, Store, StoreResult, STORE_CAPACITY};

/// File-backed store of device capacity.
pub struct FileStore {
    map: MmapMut,
}

impl FileStore {
    /// Open (or create and zero-extend) the backing file and map it.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(u64::from(STORE_CAPACITY))?;
        // SAFETY: the file is exclusively owned by this process for the
        // lifetime of the map; capacity was just enforced above.
        let map = unsafe { MmapMut::map_mut(&file)? };
        debug!(path = %path.display(), capacity = STORE_CAPACITY, "store mapped");
        Ok(Self { map })
    }
}

impl Store for FileStore {
    fn capacity(&self) -> u32 {
        STORE_CAPACITY
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> StoreResult<()> {
        check_bounds(self.capacity(), addr, buf.len())?;
        let start = addr as usize;
        buf.copy_from_slice(&self.map[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> StoreResult<()> {
        check_bounds(self.capacity(), addr, data.len())?;
        let start = addr as usize;
        self.map[start..start + data.len()].copy_from_slice(data);
        self.map.flush_range(start, data.len())?;
        Ok(())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.map.fill(0);
        self.map.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pace.fram");
        {
            let mut store = FileStore::open(&path).unwrap();
            store.write(1000, b"persist me").unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        let mut buf = [0u8; 10];
        store.read(1000, &mut buf).unwrap();
        assert_eq!(&buf, b"persist me");
    }

    #[test]
    fn capacity_is_device_sized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("pace.fram")).unwrap();
        assert_eq!(store.capacity(), STORE_CAPACITY);
    }
}
