//! # Inode table
//!
//! Fixed-size inode records packed into the inode region, addressed directly
//! by ID. Allocation scans linearly for the first `Free` record.

use crate::block::{BlockId, Disk};
use crate::layout::{Inode, InodeId, InodeKind, SuperBlock, INODE_SIZE};
use crate::Result;

#[derive(Debug)]
pub struct InodeTable {
    start: BlockId,
    blocks: u64,
    per_block: u64,
}

impl InodeTable {
    pub fn new(sb: &SuperBlock) -> Self {
        Self {
            start: sb.inode_block_start,
            blocks: sb.inode_block_count,
            per_block: sb.block_size / INODE_SIZE as u64,
        }
    }

    /// Number of inode records, reserved ones included.
    #[inline]
    pub fn count(&self) -> u64 {
        self.blocks * self.per_block
    }

    #[inline]
    pub fn root(&self) -> InodeId {
        InodeId::ROOT
    }

    #[inline]
    pub fn contains(&self, id: InodeId) -> bool {
        InodeId::ROOT <= id && u64::from(id) < self.count()
    }

    /// Block and in-block offset of a record.
    fn position(&self, id: InodeId) -> (BlockId, usize) {
        let id = u64::from(id);
        (
            self.start + id / self.per_block,
            (id % self.per_block) as usize * INODE_SIZE,
        )
    }

    #[inline]
    fn check(&self, id: InodeId) {
        assert!(
            self.contains(id),
            "inode {id} out of range, the table holds {} inodes",
            self.count()
        );
    }

    pub fn get(&self, disk: &Disk, id: InodeId) -> Result<Inode> {
        self.check(id);
        self.read_record(disk, id)
    }

    pub fn set(&self, disk: &Disk, id: InodeId, inode: &Inode) -> Result<()> {
        self.check(id);
        self.write_record(disk, id, inode)
    }

    fn read_record(&self, disk: &Disk, id: InodeId) -> Result<Inode> {
        let (block, offset) = self.position(id);
        disk.read(block)
            .and_then(|data| Inode::decode(&data[offset..offset + INODE_SIZE]))
    }

    fn write_record(&self, disk: &Disk, id: InodeId, inode: &Inode) -> Result<()> {
        let (block, offset) = self.position(id);
        let mut data = disk.read(block)?;
        inode.encode(&mut data[offset..offset + INODE_SIZE])?;
        disk.write(block, &data)
    }

    /// Zeroes the region and fences IDs 0 and 1 off as `Reserved`.
    pub fn mkfs(&self, disk: &Disk) -> Result<()> {
        for i in 0..self.blocks {
            disk.zero(self.start + i)?;
        }

        let fence = Inode {
            kind: InodeKind::Reserved,
            ..Default::default()
        };
        self.write_record(disk, InodeId::new(0), &fence)?;
        self.write_record(disk, InodeId::ROOT, &fence)
    }

    /// First free inode ID. Nothing is marked; the caller stores the new
    /// record with [`Self::set`].
    pub fn reserve(&self, disk: &Disk) -> Result<InodeId> {
        let mut found = None;
        self.scan(disk, |id, inode| {
            if inode.is_free() {
                found = Some(id);
                return true;
            }
            false
        })?;

        found.ok_or(crate::Error::OutOfInodes)
    }

    /// Returns the record to the free pool by zeroing it.
    pub fn release(&self, disk: &Disk, id: InodeId) -> Result<()> {
        self.set(disk, id, &Inode::default())
    }

    pub fn count_free(&self, disk: &Disk) -> Result<u64> {
        let mut free = 0;
        self.scan(disk, |_, inode| {
            if inode.is_free() {
                free += 1;
            }
            false
        })?;

        Ok(free)
    }

    /// Visits every record in ID order until `f` returns `true`.
    fn scan(&self, disk: &Disk, mut f: impl FnMut(InodeId, &Inode) -> bool) -> Result<()> {
        for i in 0..self.blocks {
            let data = disk.read(self.start + i)?;
            for (slot, bytes) in data.chunks_exact(INODE_SIZE).enumerate() {
                let id = InodeId::new(i * self.per_block + slot as u64);
                if f(id, &Inode::decode(bytes)?) {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::MemoryDisk;

    use super::*;
    use crate::Error;

    fn setup() -> (Disk, InodeTable) {
        let disk = Disk::new(Arc::new(MemoryDisk::new(512, 16)));
        let table = InodeTable::new(&SuperBlock::new(512, 16, 2));
        table.mkfs(&disk).unwrap();
        (disk, table)
    }

    #[test]
    fn reserve_skips_fenced_ids() {
        let (disk, table) = setup();
        assert_eq!(table.count(), 4);
        assert_eq!(table.count_free(&disk).unwrap(), 2);
        assert_eq!(table.reserve(&disk).unwrap(), InodeId::new(2));
    }

    #[test]
    fn reserve_release() {
        let (disk, table) = setup();
        for _ in 0..2 {
            let id = table.reserve(&disk).unwrap();
            let inode = Inode::new(InodeKind::Regular, 0o644, 0, 0, 0);
            table.set(&disk, id, &inode).unwrap();
            assert_eq!(table.get(&disk, id).unwrap(), inode);
        }
        assert!(matches!(table.reserve(&disk), Err(Error::OutOfInodes)));

        table.release(&disk, InodeId::new(3)).unwrap();
        assert_eq!(table.reserve(&disk).unwrap(), InodeId::new(3));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn id_zero_is_fatal() {
        let (disk, table) = setup();
        let _ = table.get(&disk, InodeId::new(0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn id_past_the_table_is_fatal() {
        let (disk, table) = setup();
        let _ = table.set(&disk, InodeId::new(4), &Inode::default());
    }
}
