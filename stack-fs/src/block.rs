//! # Block access layer
//!
//! [`Disk`] wraps the block device with the geometry read from it and checks
//! every block index before it reaches the device. [`Block`] is one owned block
//! buffer; indirect blocks and free-stack nodes are viewed through
//! [`Block::id_at`] / [`Block::set_id`] as arrays of little-endian [`BlockId`]s.

use std::ops::{Add, Sub};
use std::sync::Arc;

use binrw::binrw;
use block_dev::BlockDevice;
use derive_more::{Deref, DerefMut, Display, From, Into};

use crate::Result;

/// Width of one on-disk block reference.
pub const BLOCK_ID_SIZE: usize = 8;

#[binrw]
#[brw(little)]
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display,
)]
#[repr(transparent)]
pub struct BlockId(u64);

impl BlockId {
    /// Block 0 holds the superblock, so it never appears as a pointer target.
    pub const NULL: Self = Self(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl Add<u64> for BlockId {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<u64> for BlockId {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Sub for BlockId {
    type Output = u64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

/// One block worth of bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deref, DerefMut)]
#[deref(forward)]
#[deref_mut(forward)]
pub struct Block(Box<[u8]>);

impl Block {
    pub fn zeroed(block_size: usize) -> Self {
        Self(vec![0; block_size].into_boxed_slice())
    }

    /// Number of block references the block holds when used as an index.
    #[inline]
    pub fn fanout(&self) -> usize {
        self.0.len() / BLOCK_ID_SIZE
    }

    /// Reads slot `index` of an indirect view.
    pub fn id_at(&self, index: usize) -> BlockId {
        let mut raw = [0; BLOCK_ID_SIZE];
        raw.copy_from_slice(&self.0[index * BLOCK_ID_SIZE..][..BLOCK_ID_SIZE]);
        BlockId(u64::from_le_bytes(raw))
    }

    /// Writes slot `index` of an indirect view.
    pub fn set_id(&mut self, index: usize, id: BlockId) {
        self.0[index * BLOCK_ID_SIZE..][..BLOCK_ID_SIZE].copy_from_slice(&id.0.to_le_bytes());
    }
}

/// The block device together with its geometry.
#[derive(Clone)]
pub struct Disk {
    dev: Arc<dyn BlockDevice>,
    block_size: usize,
    block_count: u64,
}

impl Disk {
    pub fn new(dev: Arc<dyn BlockDevice>) -> Self {
        let block_size = dev.block_size();
        let block_count = dev.block_count();
        Self {
            dev,
            block_size,
            block_count,
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// References per indirect block.
    #[inline]
    pub fn fanout(&self) -> u64 {
        (self.block_size / BLOCK_ID_SIZE) as u64
    }

    #[inline]
    fn check(&self, id: BlockId) {
        assert!(
            id.0 < self.block_count,
            "block {id} out of range, the disk has {} blocks",
            self.block_count
        );
    }

    pub fn read(&self, id: BlockId) -> Result<Block> {
        self.check(id);
        let mut block = Block::zeroed(self.block_size);
        self.dev.read_block(id.0, &mut block)?;

        Ok(block)
    }

    pub fn write(&self, id: BlockId, block: &Block) -> Result<()> {
        self.check(id);
        debug_assert_eq!(block.len(), self.block_size);
        self.dev.write_block(id.0, block)?;

        Ok(())
    }

    #[inline]
    pub fn zero(&self, id: BlockId) -> Result<()> {
        self.write(id, &Block::zeroed(self.block_size))
    }

    #[inline]
    pub fn map<V>(&self, id: BlockId, f: impl FnOnce(&Block) -> V) -> Result<V> {
        Ok(f(&self.read(id)?))
    }

    /// Read-modify-write of a single block.
    pub fn map_mut<V>(&self, id: BlockId, f: impl FnOnce(&mut Block) -> V) -> Result<V> {
        let mut block = self.read(id)?;
        let ret = f(&mut block);
        self.write(id, &block)?;

        Ok(ret)
    }

    pub fn sync(&self) -> Result<()> {
        Ok(self.dev.sync()?)
    }
}

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disk")
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .finish()
    }
}
