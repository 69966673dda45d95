use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use block_dev::{check_request, BlockDevice};

/// A disk image on the host, one block per `block_size` bytes of the file.
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    block_size: usize,
    block_count: u64,
}

impl BlockFile {
    /// Creates an image of `block_count` zeroed blocks, truncating `path`.
    pub fn create(path: impl AsRef<Path>, block_size: usize, block_count: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(block_size as u64 * block_count)?;

        Ok(Self {
            file: Mutex::new(file),
            block_size,
            block_count,
        })
    }

    /// Opens an existing image. The block count follows from its length.
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % block_size as u64 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("image of {len} bytes is not a multiple of {block_size}-byte blocks"),
            ));
        }

        Ok(Self {
            file: Mutex::new(file),
            block_size,
            block_count: len / block_size as u64,
        })
    }

    fn seek(&self, block_id: u64, len: usize) -> io::Result<MutexGuard<'_, File>> {
        check_request(self, block_id, len)?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start(block_id * self.block_size as u64))?;

        Ok(file)
    }
}

impl BlockDevice for BlockFile {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&self, block_id: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(block_id, buf.len())?.read_exact(buf)
    }

    fn write_block(&self, block_id: u64, buf: &[u8]) -> io::Result<()> {
        self.seek(block_id, buf.len())?.write_all(buf)
    }

    fn sync(&self) -> io::Result<()> {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sync_data()
    }
}
