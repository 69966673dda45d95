//! # Block device layer
//!
//! A block device stores data in fixed-size **blocks**. [`BlockDevice`] is the
//! abstraction the filesystem reads and writes through; a type implementing it
//! is a **block device driver**.
//!
//! [`MemoryDisk`] is the in-memory driver used for scratch mounts and tests.

use std::any::Any;
use std::collections::BTreeMap;
use std::io;

use spin::Mutex;

/// Block device driver trait
pub trait BlockDevice: Send + Sync + Any {
    /// Size of one block in bytes.
    fn block_size(&self) -> usize;

    /// Number of addressable blocks.
    fn block_count(&self) -> u64;

    /// Reads block `block_id` into `buf`, which is exactly one block long.
    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Writes `buf`, exactly one block long, to block `block_id`.
    fn write_block(&self, block_id: u64, buf: &[u8]) -> io::Result<()>;

    /// Flushes buffered writes to the backing storage.
    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Checks a request against the device geometry.
pub fn check_request(dev: &dyn BlockDevice, block_id: u64, len: usize) -> io::Result<()> {
    if block_id >= dev.block_count() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "block {block_id} out of range (device has {} blocks)",
                dev.block_count()
            ),
        ));
    }
    if len != dev.block_size() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "buffer of {len} bytes is not a complete block of {}",
                dev.block_size()
            ),
        ));
    }

    Ok(())
}

/// Sparse in-memory disk.
///
/// Blocks that were never written, or were last written with zeros, occupy no
/// memory and read back as zeros.
#[derive(Debug)]
pub struct MemoryDisk {
    block_size: usize,
    block_count: u64,
    blocks: Mutex<BTreeMap<u64, Box<[u8]>>>,
}

impl MemoryDisk {
    pub fn new(block_size: usize, block_count: u64) -> Self {
        Self {
            block_size,
            block_count,
            blocks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of blocks currently holding non-zero data.
    pub fn resident_blocks(&self) -> usize {
        self.blocks.lock().len()
    }
}

impl BlockDevice for MemoryDisk {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> io::Result<()> {
        check_request(self, block_id, buf.len())?;
        match self.blocks.lock().get(&block_id) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }

        Ok(())
    }

    fn write_block(&self, block_id: u64, buf: &[u8]) -> io::Result<()> {
        check_request(self, block_id, buf.len())?;
        let mut blocks = self.blocks.lock();
        if buf.iter().all(|&b| b == 0) {
            blocks.remove(&block_id);
        } else {
            blocks.insert(block_id, buf.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_blocks_read_as_zero() {
        let disk = MemoryDisk::new(512, 8);
        let mut buf = vec![0xAA; 512];
        disk.read_block(7, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_then_read() {
        let disk = MemoryDisk::new(256, 4);
        let data: Vec<u8> = (0..256).map(|i| i as u8).collect();
        disk.write_block(2, &data).unwrap();

        let mut buf = vec![0; 256];
        disk.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(disk.resident_blocks(), 1);

        disk.write_block(2, &[0; 256]).unwrap();
        assert_eq!(disk.resident_blocks(), 0);
    }

    #[test]
    fn out_of_range() {
        let disk = MemoryDisk::new(256, 4);
        let mut buf = vec![0; 256];
        let err = disk.read_block(4, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err = disk.write_block(0, &[1; 128]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
