use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};

use crate::block::{Block, BlockId, Disk};
use crate::Result;

/// Magic number + 6 geometry words + two 8-word config slots.
pub const SUPER_BLOCK_SIZE: usize = 4 + 6 * 8 + 2 * 8 * 8;

const _: () = assert!(SUPER_BLOCK_SIZE <= crate::MIN_BLOCK_SIZE);

/// Superblock, always at block 0:
/// - validates the filesystem through its magic number
/// - locates the inode and data regions
/// - keeps the private cursor state of both allocators
#[binrw]
#[brw(little, magic = 0xBEBA_FECAu32)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub block_size: u64,
    pub block_count: u64,
    pub inode_block_start: BlockId,
    pub inode_block_count: u64,
    pub data_block_start: BlockId,
    pub data_block_count: u64,
    /// Unused by the linear inode allocator, kept zero.
    pub inode_config: [u64; 8],
    pub data_config: [u64; 8],
}

impl SuperBlock {
    pub const BLOCK: BlockId = BlockId::NULL;

    pub fn new(block_size: usize, block_count: u64, inode_blocks: u64) -> Self {
        Self {
            block_size: block_size as u64,
            block_count,
            inode_block_start: Self::BLOCK + 1,
            inode_block_count: inode_blocks,
            data_block_start: Self::BLOCK + 1 + inode_blocks,
            data_block_count: block_count - 1 - inode_blocks,
            inode_config: [0; 8],
            data_config: [0; 8],
        }
    }

    pub fn decode(block: &Block) -> Result<Self> {
        Ok(Self::read(&mut Cursor::new(&block[..]))?)
    }

    pub fn encode(&self, block: &mut Block) -> Result<()> {
        block.fill(0);
        BinWrite::write(self, &mut Cursor::new(&mut block[..]))?;

        Ok(())
    }

    pub fn load(disk: &Disk) -> Result<Self> {
        Self::decode(&disk.read(Self::BLOCK)?)
    }

    pub fn store(&self, disk: &Disk) -> Result<()> {
        let mut block = Block::zeroed(disk.block_size());
        self.encode(&mut block)?;
        disk.write(Self::BLOCK, &block)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::Error;

    #[test]
    fn encoded_size() {
        let sb = SuperBlock::new(256, 100, 2);
        let mut block = Block::zeroed(256);
        sb.encode(&mut block).unwrap();
        assert!(block[SUPER_BLOCK_SIZE..].iter().all(|&b| b == 0));
        assert_eq!(&block[..4], &0xBEBA_FECAu32.to_le_bytes());
        assert_eq!(SuperBlock::decode(&block).unwrap(), sb);
    }

    #[test]
    fn geometry() {
        let sb = SuperBlock::new(4096, 1000, 10);
        assert_eq!(sb.inode_block_start, BlockId::new(1));
        assert_eq!(sb.data_block_start, BlockId::new(11));
        assert_eq!(sb.data_block_count, 989);
    }

    #[test]
    fn bad_magic() {
        let block = Block::zeroed(256);
        match SuperBlock::decode(&block) {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected {other:?}"),
        }
    }
}
