//! Inode records
//!
//! Every filesystem object is described by one 256-byte record in the inode
//! region. The record addresses the object's data through 13 block pointers:
//! - 10 direct pointers, each naming a **data block**
//! - 1 single indirect block, a whole block of pointers to data blocks
//! - 1 double indirect block, pointing to single indirect blocks
//! - 1 triple indirect block, pointing to double indirect blocks
//!
//! A directory stores its records in its data, a symbolic link its target
//! and a regular file its content.

use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};
use derive_more::{Display, From, Into};
use enumflags2::{bitflags, BitFlags};

use crate::block::BlockId;
use crate::translate::POINTERS;
use crate::Result;

/// Size of an on-disk inode record.
pub const INODE_SIZE: usize = 256;

const _: () = assert!(4 * 6 + 2 + 8 + 8 + 4 + 1 + 8 + POINTERS * 8 + 97 == INODE_SIZE);

#[binrw]
#[brw(little)]
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display,
)]
#[repr(transparent)]
pub struct InodeId(u64);

impl InodeId {
    /// The root directory, ID 0 is never handed out.
    pub const ROOT: Self = Self(1);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

#[binrw]
#[brw(repr = u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    #[default]
    Free = 0,
    Regular = 1,
    Directory = 2,
    Symlink = 3,
    /// Never allocatable, marks IDs 0 and 1 at format time.
    Reserved = 4,
}

/// Timestamps an operation refreshes.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Access = 1,
    Change = 2,
    Modify = 4,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Inode {
    /// Permission bits, `0o7777`
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    /// Hard link count
    pub links: u16,
    /// Data blocks reachable from `pointers`, pointer blocks excluded
    pub blocks: u64,
    pub size: u64,
    pub flags: u32,
    pub kind: InodeKind,
    /// Device number, stored only
    pub dev: u64,
    #[brw(pad_after = 97)]
    pub pointers: [BlockId; POINTERS],
}

impl Inode {
    pub fn new(kind: InodeKind, mode: u32, uid: u32, gid: u32, now: u32) -> Self {
        Self {
            mode: mode & 0o7777,
            uid,
            gid,
            atime: now,
            ctime: now,
            mtime: now,
            links: 1,
            kind,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.kind == InodeKind::Free
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.kind == InodeKind::Symlink
    }

    pub fn touch(&mut self, stamps: impl Into<BitFlags<Stamp>>, now: u32) {
        let stamps = stamps.into();
        if stamps.contains(Stamp::Access) {
            self.atime = now;
        }
        if stamps.contains(Stamp::Change) {
            self.ctime = now;
        }
        if stamps.contains(Stamp::Modify) {
            self.mtime = now;
        }
    }

    /// Decodes the record held by `bytes`, exactly [`INODE_SIZE`] long.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        debug_assert_eq!(bytes.len(), INODE_SIZE);
        Ok(Self::read(&mut Cursor::new(bytes))?)
    }

    /// Encodes the record into `bytes`, exactly [`INODE_SIZE`] long.
    pub fn encode(&self, bytes: &mut [u8]) -> Result<()> {
        debug_assert_eq!(bytes.len(), INODE_SIZE);
        bytes.fill(0);
        BinWrite::write(self, &mut Cursor::new(bytes))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let mut inode = Inode::new(InodeKind::Symlink, 0o120777, 1000, 100, 42);
        inode.pointers[0] = BlockId::new(0x11);
        inode.pointers[12] = BlockId::new(0x22);
        inode.dev = 7;

        let mut bytes = [0xFF; INODE_SIZE];
        inode.encode(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], &0o777u32.to_le_bytes());
        assert_eq!(bytes[46], InodeKind::Symlink as u8);
        assert_eq!(bytes[55], 0x11);
        assert_eq!(bytes[55 + 12 * 8], 0x22);
        assert!(bytes[55 + 13 * 8..].iter().all(|&b| b == 0));

        assert_eq!(Inode::decode(&bytes).unwrap(), inode);
    }

    #[test]
    fn unknown_kind_is_invalid() {
        let mut bytes = [0; INODE_SIZE];
        bytes[46] = 9;
        assert!(Inode::decode(&bytes).is_err());
    }

    #[test]
    fn touch_selected_stamps() {
        let mut inode = Inode::new(InodeKind::Regular, 0o644, 0, 0, 1);
        inode.touch(Stamp::Access | Stamp::Modify, 5);
        assert_eq!((inode.atime, inode.ctime, inode.mtime), (5, 1, 5));
        inode.touch(Stamp::Change, 9);
        assert_eq!((inode.atime, inode.ctime, inode.mtime), (5, 9, 5));
    }
}
