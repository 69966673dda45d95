//! # Block transactions
//!
//! A [`Txn`] changes a value copy of an inode. Data blocks inside the
//! committed size and every indirect block on their paths are copied before
//! they change, so the committed pointer tree stays intact until the inode
//! record is written. Slots past the committed block count and bytes past the
//! committed size are not visible through the committed tree and are
//! written in place.
//!
//! Blocks taken from the allocator are `fresh`; blocks the new tree no longer
//! references are `retired`. Committing releases the retired blocks, rolling
//! back releases the fresh ones.

use std::collections::HashSet;

use crate::block::{Block, BlockId, Disk};
use crate::layout::{Inode, StackAllocator};
use crate::translate::{self, Slot};
use crate::{Error, Result};

pub struct Txn<'a> {
    disk: &'a Disk,
    blocks: &'a mut StackAllocator,
    fresh: Vec<BlockId>,
    fresh_set: HashSet<BlockId>,
    retired: Vec<BlockId>,
}

impl<'a> Txn<'a> {
    pub fn new(disk: &'a Disk, blocks: &'a mut StackAllocator) -> Self {
        Self {
            disk,
            blocks,
            fresh: Vec::new(),
            fresh_set: HashSet::new(),
            retired: Vec::new(),
        }
    }

    #[inline]
    fn block_size(&self) -> u64 {
        self.disk.block_size() as u64
    }

    fn reserve(&mut self) -> Result<BlockId> {
        let id = self.blocks.reserve(self.disk)?;
        self.fresh.push(id);
        self.fresh_set.insert(id);

        Ok(id)
    }

    fn reserve_zeroed(&mut self) -> Result<BlockId> {
        let id = self.reserve()?;
        self.disk.zero(id)?;

        Ok(id)
    }

    #[inline]
    fn is_fresh(&self, id: BlockId) -> bool {
        self.fresh_set.contains(&id)
    }

    #[inline]
    fn retire(&mut self, id: BlockId) {
        self.retired.push(id);
    }

    /// Releases the blocks the committed inode no longer references.
    pub fn commit(self) {
        if self.retired.is_empty() {
            return;
        }
        if let Err(err) = self.blocks.release_all(self.disk, &self.retired) {
            log::error!("leaked {} retired blocks: {err}", self.retired.len());
        }
    }

    /// Gives every block reserved by the transaction back, newest first, so
    /// the allocator ends up where it started.
    pub fn rollback(self) {
        for &id in self.fresh.iter().rev() {
            if let Err(err) = self.blocks.release(self.disk, id) {
                log::error!("leaked block {id} on rollback: {err}");
            }
        }
    }

    /// Replaces `data.len()` bytes at `offset`, all inside `inode.size`.
    pub fn overwrite(&mut self, inode: &mut Inode, offset: u64, data: &[u8]) -> Result<()> {
        debug_assert!(offset + data.len() as u64 <= inode.size);
        let block_size = self.block_size();

        let mut done = 0;
        while done < data.len() {
            let pos = offset + done as u64;
            let index = pos / block_size;
            let inner = (pos % block_size) as usize;
            let len = (block_size as usize - inner).min(data.len() - done);
            let chunk = &data[done..done + len];

            let old = translate::block_at(self.disk, inode, index * block_size)?;
            if self.is_fresh(old) {
                self.disk
                    .map_mut(old, |block| block[inner..inner + len].copy_from_slice(chunk))?;
            } else {
                let mut block = if len == block_size as usize {
                    Block::zeroed(block_size as usize)
                } else {
                    self.disk.read(old)?
                };
                block[inner..inner + len].copy_from_slice(chunk);

                let leaf = self.reserve()?;
                self.disk.write(leaf, &block)?;
                self.replace_block(inode, index, leaf)?;
                self.retire(old);
            }

            done += len;
        }

        Ok(())
    }

    /// Points logical block `index` at `leaf`, copying the indirect blocks on
    /// the way.
    fn replace_block(&mut self, inode: &mut Inode, index: u64, leaf: BlockId) -> Result<()> {
        match translate::locate(index, self.disk.fanout()) {
            Some(Slot::Direct(i)) => inode.pointers[i] = leaf,
            Some(slot @ Slot::Indirect { index, span, .. }) => {
                let top = slot.pointer();
                inode.pointers[top] = self.rewrite(inode.pointers[top], index, span, leaf)?;
            }
            None => unreachable!("block {index} of an existing file cannot be located"),
        }

        Ok(())
    }

    fn rewrite(&mut self, node: BlockId, index: u64, span: u64, leaf: BlockId) -> Result<BlockId> {
        let (node, mut block) = self.writable(node)?;
        let slot = (index / span) as usize;
        if span == 1 {
            block.set_id(slot, leaf);
        } else {
            let child = self.rewrite(
                block.id_at(slot),
                index % span,
                span / self.disk.fanout(),
                leaf,
            )?;
            block.set_id(slot, child);
        }
        self.disk.write(node, &block)?;

        Ok(node)
    }

    /// An indirect block the transaction may modify: the block itself when
    /// fresh, a fresh copy otherwise.
    fn writable(&mut self, node: BlockId) -> Result<(BlockId, Block)> {
        let block = self.disk.read(node)?;
        if self.is_fresh(node) {
            return Ok((node, block));
        }

        let copy = self.reserve()?;
        self.retire(node);

        Ok((copy, block))
    }

    /// Appends `len` bytes at the end of the file, taken from `data` or zeros.
    pub fn extend(&mut self, inode: &mut Inode, data: Option<&[u8]>, len: u64) -> Result<()> {
        let block_size = self.block_size();

        let mut done = 0;
        while done < len {
            let inner = (inode.size % block_size) as usize;
            let n = (block_size - inner as u64).min(len - done) as usize;
            let chunk = data.map(|data| &data[done as usize..done as usize + n]);

            if inner != 0 {
                // slack of the last block
                let leaf = translate::block_at(self.disk, inode, inode.size - inner as u64)?;
                self.disk.map_mut(leaf, |block| {
                    let slack = &mut block[inner..inner + n];
                    match chunk {
                        Some(chunk) => slack.copy_from_slice(chunk),
                        None => slack.fill(0),
                    }
                })?;
            } else {
                let leaf = self.allocate_next_block(inode)?;
                let mut block = Block::zeroed(block_size as usize);
                if let Some(chunk) = chunk {
                    block[..n].copy_from_slice(chunk);
                }
                self.disk.write(leaf, &block)?;
            }

            inode.size += n as u64;
            done += n as u64;
        }

        Ok(())
    }

    /// Cuts the file down to `length` bytes, detaching trailing blocks.
    pub fn shrink(&mut self, inode: &mut Inode, length: u64) -> Result<()> {
        debug_assert!(length <= inode.size);
        let keep = length.div_ceil(self.block_size());
        while inode.blocks > keep {
            self.deallocate_last_block(inode)?;
        }
        inode.size = length;

        Ok(())
    }

    /// Attaches one more data block, growing the pointer tree when the new
    /// block is the first below a slot.
    pub fn allocate_next_block(&mut self, inode: &mut Inode) -> Result<BlockId> {
        let leaf = match translate::locate(inode.blocks, self.disk.fanout()) {
            Some(Slot::Direct(i)) => {
                let leaf = self.reserve()?;
                inode.pointers[i] = leaf;
                leaf
            }
            Some(slot @ Slot::Indirect { index, span, .. }) => {
                let top = slot.pointer();
                if index == 0 {
                    inode.pointers[top] = self.reserve_zeroed()?;
                }
                self.attach(inode.pointers[top], index, span)?
            }
            None => return Err(Error::FileTooBig),
        };
        inode.blocks += 1;

        Ok(leaf)
    }

    fn attach(&mut self, node: BlockId, index: u64, span: u64) -> Result<BlockId> {
        let slot = (index / span) as usize;
        if span == 1 {
            let leaf = self.reserve()?;
            self.disk.map_mut(node, |block| block.set_id(slot, leaf))?;
            return Ok(leaf);
        }

        let rest = index % span;
        let child = if rest == 0 {
            let child = self.reserve_zeroed()?;
            self.disk.map_mut(node, |block| block.set_id(slot, child))?;
            child
        } else {
            self.disk.map(node, |block| block.id_at(slot))?
        };

        self.attach(child, rest, span / self.disk.fanout())
    }

    /// Detaches the last data block, and every indirect block whose first slot
    /// it occupied.
    pub fn deallocate_last_block(&mut self, inode: &mut Inode) -> Result<()> {
        debug_assert!(inode.blocks > 0);
        match translate::locate(inode.blocks - 1, self.disk.fanout()) {
            Some(Slot::Direct(i)) => {
                let leaf = std::mem::take(&mut inode.pointers[i]);
                self.retire(leaf);
            }
            Some(slot @ Slot::Indirect { index, span, .. }) => {
                let top = slot.pointer();
                self.detach(inode.pointers[top], index, span)?;
                if index == 0 {
                    let node = std::mem::take(&mut inode.pointers[top]);
                    self.retire(node);
                }
            }
            None => unreachable!("block {} of an existing file cannot be located", inode.blocks - 1),
        }
        inode.blocks -= 1;

        Ok(())
    }

    fn detach(&mut self, node: BlockId, index: u64, span: u64) -> Result<()> {
        let slot = (index / span) as usize;
        let child = self.disk.map(node, |block| block.id_at(slot))?;
        if span == 1 {
            self.retire(child);
            return Ok(());
        }

        let rest = index % span;
        self.detach(child, rest, span / self.disk.fanout())?;
        if rest == 0 {
            self.retire(child);
        }

        Ok(())
    }
}
