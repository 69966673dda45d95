//! Free stack of data blocks
//!
//! Free block IDs are kept on a stack threaded through node blocks at the
//! tail of the data region. A node is a whole block of IDs; the stack grows
//! towards `first_block`, the highest node, and shrinks towards
//! `last_block`. The cursor `(block, index)` names the slot holding the next
//! ID to hand out. The bottom slot `(last_block, last_index)` is the boundary
//! and never holds a usable ID.
//!
//! The cursor lives in the superblock's `data_config` slot:
//! `[magic, top_block, top_index, last_index, last_block, first_block]`.
//! Every reservation and release persists it right away.

use std::io;

use crate::block::{Block, BlockId, Disk};
use crate::layout::SuperBlock;
use crate::{Error, Result};

const STACK_MAGIC: u64 = 0x5354_4143_4B46_5245;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    block: BlockId,
    index: u64,
}

impl Cursor {
    #[inline]
    fn new(block: BlockId, index: u64) -> Self {
        Self { block, index }
    }
}

#[derive(Debug)]
pub struct StackAllocator {
    sb: SuperBlock,
    /// IDs per node
    nrefs: u64,
    top: Cursor,
    last: Cursor,
    first_block: BlockId,
}

impl StackAllocator {
    /// Turns the whole data region of `sb` into one free stack and persists
    /// the superblock with the new cursor.
    ///
    /// IDs are stacked so that reservations come out in ascending order from
    /// the start of the region.
    pub fn mkfs(disk: &Disk, sb: SuperBlock) -> Result<Self> {
        if sb.data_block_count < 2 {
            return Err(Error::InvalidArgument);
        }

        let nrefs = disk.fanout();
        let first_block = sb.data_block_start + (sb.data_block_count - 1);
        let mut free_block = sb.data_block_start;
        let mut node_block = first_block;

        let last = 'fill: loop {
            let mut node = Block::zeroed(disk.block_size());
            for i in (0..nrefs).rev() {
                if free_block == node_block {
                    if i == nrefs - 1 {
                        // the previous node is full, its lowest slot is the boundary
                        break 'fill Cursor::new(node_block + 1, 0);
                    }
                    disk.write(node_block, &node)?;
                    break 'fill Cursor::new(node_block, i + 1);
                }
                node.set_id(i as usize, free_block);
                free_block = free_block + 1;
            }
            disk.write(node_block, &node)?;
            node_block = node_block - 1;
        };

        let mut allocator = Self {
            sb,
            nrefs,
            top: Cursor::new(first_block, nrefs - 1),
            last,
            first_block,
        };
        allocator.persist(disk)?;
        log::debug!(
            "free stack: nodes {}..={}, {} usable blocks",
            last.block,
            first_block,
            allocator.total()
        );

        Ok(allocator)
    }

    /// Restores the allocator from a superblock written by [`Self::mkfs`].
    pub fn open(disk: &Disk, sb: SuperBlock) -> Result<Self> {
        let config = sb.data_config;
        if config[0] != STACK_MAGIC {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "free stack configuration missing from the superblock",
            )));
        }

        let allocator = Self {
            nrefs: disk.fanout(),
            top: Cursor::new(BlockId::new(config[1]), config[2]),
            last: Cursor::new(BlockId::new(config[4]), config[3]),
            first_block: BlockId::new(config[5]),
            sb,
        };
        let end = allocator.sb.data_block_start + allocator.sb.data_block_count;
        if allocator.last.block < allocator.sb.data_block_start
            || allocator.first_block >= end
            || allocator.top.block < allocator.last.block
            || allocator.top.block > allocator.first_block
            || allocator.top.index >= allocator.nrefs
        {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "free stack cursor outside the data region",
            )));
        }

        Ok(allocator)
    }

    /// Pops the next free block.
    pub fn reserve(&mut self, disk: &Disk) -> Result<BlockId> {
        if self.top == self.last {
            return Err(Error::OutOfDataBlocks);
        }

        let id = disk.map(self.top.block, |node| node.id_at(self.top.index as usize))?;
        let popped = if self.top.index == 0 {
            Cursor::new(self.top.block - 1, self.nrefs - 1)
        } else {
            Cursor::new(self.top.block, self.top.index - 1)
        };
        self.commit(disk, popped)?;

        Ok(id)
    }

    #[inline]
    pub fn release(&mut self, disk: &Disk, id: BlockId) -> Result<()> {
        self.release_all(disk, &[id])
    }

    /// Pushes `ids` in order, writing each touched node once and the
    /// superblock once.
    pub fn release_all(&mut self, disk: &Disk, ids: &[BlockId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut top = self.top;
        let mut node: Option<(BlockId, Block)> = None;
        for &id in ids {
            assert!(
                self.sb.data_block_start <= id && id < self.last.block,
                "released block {id} is not managed by the free stack"
            );

            top = self.pushed(top);
            if !matches!(&node, Some((block, _)) if *block == top.block) {
                if let Some((block, data)) = node.take() {
                    disk.write(block, &data)?;
                }
                node = Some((top.block, disk.read(top.block)?));
            }
            if let Some((_, data)) = &mut node {
                data.set_id(top.index as usize, id);
            }
        }
        if let Some((block, data)) = node {
            disk.write(block, &data)?;
        }

        self.commit(disk, top)
    }

    /// Cursor after one more push.
    fn pushed(&self, top: Cursor) -> Cursor {
        if top.index == self.nrefs - 1 {
            assert_ne!(
                top.block, self.first_block,
                "free stack overflow, more blocks released than reserved"
            );
            Cursor::new(top.block + 1, 0)
        } else {
            Cursor::new(top.block, top.index + 1)
        }
    }

    /// Persists `top` and adopts it once the superblock is on disk.
    fn commit(&mut self, disk: &Disk, top: Cursor) -> Result<()> {
        let old = self.top;
        self.top = top;
        if let Err(err) = self.persist(disk) {
            self.top = old;
            return Err(err);
        }

        Ok(())
    }

    fn persist(&mut self, disk: &Disk) -> Result<()> {
        let config = &mut self.sb.data_config;
        config[0] = STACK_MAGIC;
        config[1] = self.top.block.into();
        config[2] = self.top.index;
        config[3] = self.last.index;
        config[4] = self.last.block.into();
        config[5] = self.first_block.into();
        self.sb.store(disk)
    }

    /// Slots between the boundary and `at`.
    #[inline]
    fn distance(&self, at: Cursor) -> u64 {
        (at.block - self.last.block) * self.nrefs + at.index - self.last.index
    }

    /// Usable blocks of the region.
    #[inline]
    pub fn total(&self) -> u64 {
        self.distance(Cursor::new(self.first_block, self.nrefs - 1))
    }

    /// Blocks currently free.
    #[inline]
    pub fn free(&self) -> u64 {
        self.distance(self.top)
    }

    /// `(total, free)` block counts.
    pub fn statfs(&self) -> (u64, u64) {
        (self.total(), self.free())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::MemoryDisk;

    use super::*;

    fn setup(block_size: usize, block_count: u64, inode_blocks: u64) -> (Disk, StackAllocator) {
        let disk = Disk::new(Arc::new(MemoryDisk::new(block_size, block_count)));
        let sb = SuperBlock::new(block_size, block_count, inode_blocks);
        sb.store(&disk).unwrap();
        let allocator = StackAllocator::mkfs(&disk, sb).unwrap();
        (disk, allocator)
    }

    fn drain(disk: &Disk, allocator: &mut StackAllocator) -> Vec<u64> {
        let mut ids = Vec::new();
        loop {
            match allocator.reserve(disk) {
                Ok(id) => ids.push(id.into()),
                Err(Error::OutOfDataBlocks) => break ids,
                Err(err) => panic!("{err}"),
            }
        }
    }

    #[test]
    fn single_partial_node() {
        // data region 2..12, node at 11
        let (disk, mut allocator) = setup(4096, 12, 1);
        assert_eq!(allocator.statfs(), (8, 8));
        assert_eq!(drain(&disk, &mut allocator), (2..10).collect::<Vec<_>>());
        assert_eq!(allocator.free(), 0);
    }

    #[test]
    fn several_full_nodes() {
        // data region 2..102, 32 IDs per node
        let (disk, mut allocator) = setup(256, 102, 1);
        assert_eq!(allocator.total(), 95);
        assert_eq!(drain(&disk, &mut allocator), (2..97).collect::<Vec<_>>());
    }

    #[test]
    fn stack_round_trip() {
        let (disk, mut allocator) = setup(256, 300, 4);
        let first: Vec<BlockId> = (0..70).map(|_| allocator.reserve(&disk).unwrap()).collect();
        let free = allocator.free();

        for &id in first.iter().rev() {
            allocator.release(&disk, id).unwrap();
        }
        assert_eq!(allocator.free(), free + 70);

        let again: Vec<BlockId> = (0..70).map(|_| allocator.reserve(&disk).unwrap()).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn batch_release_matches_single() {
        let (disk, mut allocator) = setup(256, 300, 4);
        let ids: Vec<BlockId> = (0..50).map(|_| allocator.reserve(&disk).unwrap()).collect();
        let reversed: Vec<BlockId> = ids.iter().rev().copied().collect();
        allocator.release_all(&disk, &reversed).unwrap();

        let again: Vec<BlockId> = (0..50).map(|_| allocator.reserve(&disk).unwrap()).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn cursor_survives_reopen() {
        let (disk, mut allocator) = setup(256, 200, 2);
        for _ in 0..40 {
            allocator.reserve(&disk).unwrap();
        }

        let sb = SuperBlock::load(&disk).unwrap();
        let mut reopened = StackAllocator::open(&disk, sb).unwrap();
        assert_eq!(reopened.statfs(), allocator.statfs());
        assert_eq!(
            reopened.reserve(&disk).unwrap(),
            allocator.reserve(&disk).unwrap()
        );
    }

    #[test]
    fn tiny_region() {
        let (disk, mut allocator) = setup(256, 4, 1);
        assert_eq!(allocator.total(), 0);
        assert!(matches!(
            allocator.reserve(&disk),
            Err(Error::OutOfDataBlocks)
        ));
    }

    #[test]
    #[should_panic(expected = "free stack overflow")]
    fn overflow_is_fatal() {
        let (disk, mut allocator) = setup(256, 12, 1);
        // node at 11 is full with nothing reserved yet
        let _ = allocator.reserve(&disk);
        for id in 2..5 {
            let _ = allocator.release(&disk, BlockId::new(id));
        }
    }
}
