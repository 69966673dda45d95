//! # 地址转换
//!
//! 把文件内的字节偏移转换为存放它的数据块。
//!
//! 设每个间接索引块可存放 `S` 个**块编号**，文件的第 `n` 个逻辑块：
//! - `n < 10` 时位于 `pointers[n]`
//! - 接下来的 `S` 块挂在一级索引块下
//! - 再接下来的 `S²` 块挂在二级索引块下
//! - 再接下来的 `S³` 块挂在三级索引块下
//!
//! ## 块索引编码
//!
//! - 块索引除以一个槽位覆盖的块数，可得槽位
//! - 块索引模一个槽位覆盖的块数，可得在子块中的索引

use crate::block::{BlockId, Disk};
use crate::layout::Inode;
use crate::Result;

/// 直接索引块可编号数量
pub const DIRECT: usize = 10;
/// 间接索引的级数
pub const INDIRECT_LEVELS: usize = 3;
/// Pointer slots of an inode.
pub const POINTERS: usize = DIRECT + INDIRECT_LEVELS;

/// Where logical block `n` of a file hangs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Direct(usize),
    Indirect {
        /// 1, 2 or 3
        level: usize,
        /// Block index inside the level's tree
        index: u64,
        /// Data blocks covered by one slot of the level's top block
        span: u64,
    },
}

impl Slot {
    /// Pointer of the inode the slot hangs from.
    #[inline]
    pub fn pointer(&self) -> usize {
        match *self {
            Slot::Direct(i) => i,
            Slot::Indirect { level, .. } => DIRECT + level - 1,
        }
    }
}

/// Locates logical block `index` in a tree of the given fan-out, or `None`
/// when the file cannot be that large.
pub fn locate(index: u64, fanout: u64) -> Option<Slot> {
    if index < DIRECT as u64 {
        return Some(Slot::Direct(index as usize));
    }

    let mut index = index - DIRECT as u64;
    let mut span = 1;
    for level in 1..=INDIRECT_LEVELS {
        let capacity = span * fanout;
        if index < capacity {
            return Some(Slot::Indirect { level, index, span });
        }
        index -= capacity;
        span *= fanout;
    }

    None
}

/// Largest file size on a device with `block_size` blocks.
pub fn max_file_size(block_size: usize) -> u64 {
    let s = (block_size / crate::block::BLOCK_ID_SIZE) as u64;
    (DIRECT as u64 + s + s * s + s * s * s) * block_size as u64
}

/// Data block holding byte `offset` of `inode`.
///
/// # Panics
///
/// The offset must lie inside the blocks already attached to the inode.
pub fn block_at(disk: &Disk, inode: &Inode, offset: u64) -> Result<BlockId> {
    let block_size = disk.block_size() as u64;
    assert!(
        offset < inode.blocks * block_size,
        "offset {offset} beyond the {} blocks of the inode",
        inode.blocks
    );

    if offset < DIRECT as u64 * block_size {
        return Ok(inode.pointers[(offset / block_size) as usize]);
    }

    let fanout = disk.fanout();
    let mut offset = offset - DIRECT as u64 * block_size;
    let mut level_size = block_size;
    for level in 0..INDIRECT_LEVELS {
        if offset < level_size * fanout {
            return indirect_block_at(disk, inode.pointers[DIRECT + level], offset, level_size);
        }
        offset -= level_size * fanout;
        level_size *= fanout;
    }

    unreachable!("offset inside the attached blocks but beyond the triple indirect tree")
}

/// Descends from indirect block `block`, each of whose slots covers
/// `level_size` bytes, to the data block holding `offset`.
pub fn indirect_block_at(
    disk: &Disk,
    block: BlockId,
    offset: u64,
    level_size: u64,
) -> Result<BlockId> {
    let index = (offset / level_size) as usize;
    let child = disk.map(block, |node| node.id_at(index))?;
    if level_size == disk.block_size() as u64 {
        return Ok(child);
    }

    indirect_block_at(
        disk,
        child,
        offset % level_size,
        level_size / disk.fanout(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_tiers() {
        assert_eq!(locate(9, 32), Some(Slot::Direct(9)));
        assert_eq!(
            locate(10, 32),
            Some(Slot::Indirect {
                level: 1,
                index: 0,
                span: 1
            })
        );
        assert_eq!(
            locate(42, 32),
            Some(Slot::Indirect {
                level: 2,
                index: 0,
                span: 32
            })
        );
        assert_eq!(
            locate(42 + 1024 + 5, 32),
            Some(Slot::Indirect {
                level: 3,
                index: 5,
                span: 1024
            })
        );
        assert_eq!(locate(10 + 32 + 1024 + 32768, 32), None);
        assert_eq!(locate(10 + 32 + 1024 + 32767, 32).map(|s| s.pointer()), Some(12));
    }

    #[test]
    fn max_sizes() {
        assert_eq!(max_file_size(256), (10 + 32 + 1024 + 32768) * 256);
        assert_eq!(
            max_file_size(4096),
            (10 + 512 + 512 * 512 + 512 * 512 * 512) * 4096
        );
    }
}
