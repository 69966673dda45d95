#![allow(dead_code)]

use std::sync::Arc;

use block_dev::MemoryDisk;
use stack_fs::{Error, FormatOptions, InodeId, StackFileSystem, ROOT};

pub fn format(block_size: usize, block_count: u64, inode_blocks: u64) -> StackFileSystem {
    let dev = Arc::new(MemoryDisk::new(block_size, block_count));
    let options = FormatOptions {
        inode_blocks,
        uid: 1000,
        gid: 1000,
    };
    StackFileSystem::format(dev, options).unwrap()
}

/// 256-byte blocks: 32 IDs per indirect block, one inode per block.
pub fn small_blocks() -> StackFileSystem {
    format(256, 2048, 256)
}

pub fn new_file(fs: &mut StackFileSystem, name: &str) -> InodeId {
    fs.mknod(ROOT, name, 0o644, 0, 1000, 1000).unwrap()
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) | 1)
        .collect()
}

pub fn read_all(fs: &mut StackFileSystem, id: InodeId) -> Vec<u8> {
    let size = fs.get_inode(id).unwrap().size as usize;
    let mut buf = vec![0; size];
    assert_eq!(fs.read(id, &mut buf, 0).unwrap(), size);
    buf
}

pub fn free_blocks(fs: &StackFileSystem) -> u64 {
    fs.statfs().unwrap().blocks_free
}

/// Appends whole blocks to `id` until the data region is used up.
pub fn fill(fs: &mut StackFileSystem, id: InodeId) {
    let block = vec![7; fs.block_size()];
    loop {
        let size = fs.get_inode(id).unwrap().size;
        match fs.write(id, &block, size) {
            Ok(_) => {}
            Err(Error::OutOfDataBlocks) => break,
            Err(err) => panic!("write at {size}: {err}"),
        }
    }
}
