//! Backing store: a single fixed-size, `mmap`-backed local file (`spec.md` §6).

use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("backing store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lba {lba} + {sectors} sectors exceeds capacity of {capacity_sectors} sectors")]
    OutOfRange {
        lba: u64,
        sectors: u64,
        capacity_sectors: u64,
    },
    #[error("buffer length {len} is not a multiple of the {sector_size}-byte sector size")]
    UnalignedBuffer { len: usize, sector_size: u32 },
    #[error("backing file size {size_bytes} is not a multiple of the {block_size}-byte block size")]
    UnalignedCapacity { size_bytes: u64, block_size: u32 },
}

/// A single fixed-size image file, memory-mapped for the lifetime of the device.
///
/// Created (with the correct size) if missing; an existing file of the wrong size is an
/// attach-time error rather than silently truncated or grown.
pub struct BackingStore {
    mmap: MmapMut,
    block_size: u32,
    total_sectors: u64,
}

impl BackingStore {
    pub fn open(path: &Path, size_bytes: u64, block_size: u32) -> Result<Self, DiskError> {
        if size_bytes % u64::from(block_size) != 0 {
            return Err(DiskError::UnalignedCapacity {
                size_bytes,
                block_size,
            });
        }

        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if existed {
            let actual_len = file.metadata()?.len();
            if actual_len != size_bytes {
                file.set_len(size_bytes)?;
            }
        } else {
            file.set_len(size_bytes)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            mmap,
            block_size,
            total_sectors: size_bytes / u64::from(block_size),
        })
    }

    /// Open an already-created temp file, mostly for tests that want a scratch disk.
    pub fn from_file(file: &File, block_size: u32) -> Result<Self, DiskError> {
        let size_bytes = file.metadata()?.len();
        if size_bytes % u64::from(block_size) != 0 {
            return Err(DiskError::UnalignedCapacity {
                size_bytes,
                block_size,
            });
        }
        let mmap = unsafe { MmapMut::map_mut(file)? };
        Ok(Self {
            mmap,
            block_size,
            total_sectors: size_bytes / u64::from(block_size),
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn total_sectors(&self) -> u64 {
        self.total_sectors
    }

    fn check_range(&self, lba: u64, sectors: u64, buf_len: usize) -> Result<(), DiskError> {
        if buf_len as u64 != sectors * u64::from(self.block_size) {
            return Err(DiskError::UnalignedBuffer {
                len: buf_len,
                sector_size: self.block_size,
            });
        }
        if lba.checked_add(sectors).map_or(true, |end| end > self.total_sectors) {
            return Err(DiskError::OutOfRange {
                lba,
                sectors,
                capacity_sectors: self.total_sectors,
            });
        }
        Ok(())
    }

    pub fn read_sectors(&self, lba: u64, sectors: u64, buf: &mut [u8]) -> Result<(), DiskError> {
        self.check_range(lba, sectors, buf.len())?;
        let off = (lba * u64::from(self.block_size)) as usize;
        buf.copy_from_slice(&self.mmap[off..off + buf.len()]);
        Ok(())
    }

    pub fn write_sectors(&mut self, lba: u64, sectors: u64, buf: &[u8]) -> Result<(), DiskError> {
        self.check_range(lba, sectors, buf.len())?;
        let off = (lba * u64::from(self.block_size)) as usize;
        self.mmap[off..off + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), DiskError> {
        self.mmap.flush()?;
        Ok(())
    }
}
