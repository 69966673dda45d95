//! # Filesystem layer
//!
//! [`StackFileSystem`] ties the superblock, the free stack, the inode table
//! and the translator together. File data changes go through a [`Txn`]; the
//! namespace operations work on parent inode and entry name, the way a FUSE
//! kernel module hands requests over.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::BlockDevice;
use enumflags2::BitFlags;

use crate::block::Disk;
use crate::directory::Directory;
use crate::inode_table::InodeTable;
use crate::layout::{
    bury_record, find_record, name_max, Inode, InodeId, InodeKind, Stamp, StackAllocator,
    SuperBlock,
};
use crate::options::{FormatOptions, MountOptions};
use crate::translate::{self, max_file_size};
use crate::txn::Txn;
use crate::{Error, Result, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// Seconds since the epoch, as stored in inodes.
pub fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub id: InodeId,
    pub kind: InodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub inodes: u64,
    pub inodes_free: u64,
    pub name_max: u64,
}

#[derive(Debug)]
pub struct StackFileSystem {
    disk: Disk,
    blocks: StackAllocator,
    inodes: InodeTable,
    options: MountOptions,
}

impl StackFileSystem {
    /// Lays a fresh filesystem out on `dev`:
    /// superblock, zeroed inode region, free stack and the root directory.
    pub fn format(dev: Arc<dyn BlockDevice>, options: FormatOptions) -> Result<Self> {
        let disk = Disk::new(dev);
        let block_size = disk.block_size();
        let block_count = disk.block_count();
        if !block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
        {
            return Err(Error::InvalidArgument);
        }
        if options.inode_blocks == 0
            || block_count
                .checked_sub(1 + options.inode_blocks)
                .map_or(true, |data_blocks| data_blocks < 2)
        {
            return Err(Error::InvalidArgument);
        }

        let sb = SuperBlock::new(block_size, block_count, options.inode_blocks);
        sb.store(&disk)?;

        let inodes = InodeTable::new(&sb);
        inodes.mkfs(&disk)?;
        let blocks = StackAllocator::mkfs(&disk, sb)?;

        let mut root = Inode::new(
            InodeKind::Directory,
            0o777,
            options.uid,
            options.gid,
            now(),
        );
        root.links = 2;
        inodes.set(&disk, InodeId::ROOT, &root)?;

        let mut fs = Self {
            disk,
            blocks,
            inodes,
            options: MountOptions::default(),
        };
        fs.store_directory(&Directory::new(InodeId::ROOT, InodeId::ROOT), &mut root)?;
        fs.disk.sync()?;

        let (total, free) = fs.blocks.statfs();
        log::info!(
            "formatted {block_count} blocks of {block_size} bytes: {} inodes, {free}/{total} data blocks free",
            fs.inodes.count()
        );

        Ok(fs)
    }

    /// Opens a filesystem written by [`Self::format`].
    pub fn open(dev: Arc<dyn BlockDevice>, options: MountOptions) -> Result<Self> {
        let disk = Disk::new(dev);
        let sb = SuperBlock::load(&disk)?;

        let data_end = u64::from(sb.data_block_start) + sb.data_block_count;
        if sb.block_size != disk.block_size() as u64
            || sb.block_count > disk.block_count()
            || sb.inode_block_start + sb.inode_block_count != sb.data_block_start
            || data_end != sb.block_count
        {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "superblock geometry does not match a device of {} blocks of {} bytes",
                    disk.block_count(),
                    disk.block_size()
                ),
            )));
        }

        let inodes = InodeTable::new(&sb);
        let blocks = StackAllocator::open(&disk, sb)?;
        let (total, free) = blocks.statfs();
        log::info!(
            "opened {} blocks of {} bytes: {free}/{total} data blocks free, atime {:?}",
            disk.block_count(),
            disk.block_size(),
            options.atime
        );

        Ok(Self {
            disk,
            blocks,
            inodes,
            options,
        })
    }

    #[inline]
    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.disk.block_size()
    }

    #[inline]
    pub fn root(&self) -> InodeId {
        self.inodes.root()
    }

    #[inline]
    pub fn max_file_size(&self) -> u64 {
        max_file_size(self.block_size())
    }

    #[inline]
    pub fn name_max(&self) -> usize {
        name_max(self.block_size())
    }

    pub fn sync(&self) -> Result<()> {
        self.disk.sync()
    }

    /******** inodes ********/

    /// Inode `id`, reporting IDs outside the table or not in use as missing.
    pub fn get_inode(&self, id: InodeId) -> Result<Inode> {
        if !self.inodes.contains(id) {
            return Err(Error::NoSuchEntry);
        }
        let inode = self.inodes.get(&self.disk, id)?;
        if inode.is_free() {
            return Err(Error::NoSuchEntry);
        }

        Ok(inode)
    }

    pub fn save_inode(&mut self, id: InodeId, inode: &Inode) -> Result<()> {
        if !self.inodes.contains(id) {
            return Err(Error::NoSuchEntry);
        }
        self.inodes.set(&self.disk, id, inode)
    }

    /// A free inode ID. Nothing is marked until the inode is saved.
    pub fn new_inode_id(&self) -> Result<InodeId> {
        self.inodes.reserve(&self.disk)
    }

    fn regular(&self, id: InodeId) -> Result<Inode> {
        let inode = self.get_inode(id)?;
        match inode.kind {
            InodeKind::Regular => Ok(inode),
            InodeKind::Directory => Err(Error::IsADirectory),
            _ => Err(Error::NotAFile),
        }
    }

    /// Runs `f` on a copy of `inode` inside a block transaction. The copy is
    /// saved and adopted on success; on failure nothing changes.
    fn transact(
        &mut self,
        id: InodeId,
        inode: &mut Inode,
        f: impl FnOnce(&mut Txn, &mut Inode) -> Result<()>,
    ) -> Result<()> {
        let mut txn = Txn::new(&self.disk, &mut self.blocks);
        let mut staged = inode.clone();

        match f(&mut txn, &mut staged).and_then(|()| self.inodes.set(&self.disk, id, &staged)) {
            Ok(()) => {
                txn.commit();
                *inode = staged;
                Ok(())
            }
            Err(err) => {
                log::warn!("inode {id}: rolled back, {err}");
                txn.rollback();
                Err(err)
            }
        }
    }

    /******** file data ********/

    /// Writes `data` at `offset`, zero-filling any gap behind the old end of
    /// file. Returns the bytes added or replaced, the gap included.
    pub fn write(&mut self, id: InodeId, data: &[u8], offset: u64) -> Result<u64> {
        let mut inode = self.regular(id)?;
        let max = self.max_file_size();
        let len = data.len() as u64;
        if offset > max || len > max - offset {
            return Err(Error::FileTooBig);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let old_size = inode.size;
        let split = old_size.saturating_sub(offset).min(len) as usize;
        log::debug!("write inode={id} offset={offset} len={len} size={old_size}");
        self.transact(id, &mut inode, |txn, inode| {
            if split > 0 {
                txn.overwrite(inode, offset, &data[..split])?;
            }
            if offset > inode.size {
                let gap = offset - inode.size;
                txn.extend(inode, None, gap)?;
            }
            if split < data.len() {
                txn.extend(inode, Some(&data[split..]), (data.len() - split) as u64)?;
            }
            inode.touch(BitFlags::all(), now());
            Ok(())
        })?;

        Ok(offset.saturating_sub(old_size) + len)
    }

    /// Reads up to `buf.len()` bytes at `offset`; 0 at or past the end.
    pub fn read(&mut self, id: InodeId, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut inode = self.regular(id)?;
        if offset >= inode.size {
            return Ok(0);
        }

        let len = (buf.len() as u64).min(inode.size - offset) as usize;
        self.read_data(&inode, offset, &mut buf[..len])?;

        let now = now();
        if self.options.atime.should_update(&inode, now) {
            inode.touch(Stamp::Access, now);
            self.inodes.set(&self.disk, id, &inode)?;
        }

        Ok(len)
    }

    fn read_data(&self, inode: &Inode, offset: u64, buf: &mut [u8]) -> Result<()> {
        let block_size = self.block_size() as u64;

        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done as u64;
            let inner = (pos % block_size) as usize;
            let len = (block_size as usize - inner).min(buf.len() - done);

            let block = translate::block_at(&self.disk, inode, pos - inner as u64)?;
            self.disk.map(block, |block| {
                buf[done..done + len].copy_from_slice(&block[inner..inner + len]);
            })?;
            done += len;
        }

        Ok(())
    }

    fn read_all(&self, inode: &Inode) -> Result<Vec<u8>> {
        let mut data = vec![0; inode.size as usize];
        self.read_data(inode, 0, &mut data)?;

        Ok(data)
    }

    /// Cuts or zero-extends a regular file to `length` bytes.
    pub fn truncate(&mut self, id: InodeId, length: u64) -> Result<()> {
        if length > self.max_file_size() {
            return Err(Error::FileTooBig);
        }
        let mut inode = self.regular(id)?;
        log::debug!("truncate inode={id} size={} length={length}", inode.size);

        self.resize(id, &mut inode, length)
    }

    fn resize(&mut self, id: InodeId, inode: &mut Inode, length: u64) -> Result<()> {
        self.transact(id, inode, |txn, inode| {
            if length > inode.size {
                let gap = length - inode.size;
                txn.extend(inode, None, gap)?;
            } else {
                txn.shrink(inode, length)?;
            }
            inode.touch(Stamp::Change | Stamp::Modify, now());
            Ok(())
        })
    }

    /// Replaces the whole content of `inode` with `data`.
    fn rewrite_data(&mut self, id: InodeId, inode: &mut Inode, data: &[u8]) -> Result<()> {
        let len = data.len() as u64;
        self.transact(id, inode, |txn, inode| {
            let keep = inode.size.min(len) as usize;
            if keep > 0 {
                txn.overwrite(inode, 0, &data[..keep])?;
            }
            if len > inode.size {
                txn.extend(inode, Some(&data[keep..]), len - keep as u64)?;
            } else {
                txn.shrink(inode, len)?;
            }
            inode.touch(Stamp::Change | Stamp::Modify, now());
            Ok(())
        })
    }

    /// Drops one hard link of `id`, freeing the inode and its blocks with the
    /// last one.
    pub fn unlink(&mut self, id: InodeId) -> Result<()> {
        let mut inode = self.get_inode(id)?;
        if inode.links < 2 {
            return self.free(id, inode);
        }

        inode.links -= 1;
        inode.touch(Stamp::Change, now());
        self.inodes.set(&self.disk, id, &inode)
    }

    fn free(&mut self, id: InodeId, mut inode: Inode) -> Result<()> {
        log::debug!("free inode={id} blocks={}", inode.blocks);
        self.transact(id, &mut inode, |txn, inode| txn.shrink(inode, 0))?;
        self.inodes.release(&self.disk, id)
    }

    /******** directories ********/

    fn load_directory(&self, id: InodeId, inode: &Inode) -> Result<Directory> {
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        Directory::parse(id, &self.read_all(inode)?, self.block_size())
    }

    fn store_directory(&mut self, dir: &Directory, inode: &mut Inode) -> Result<()> {
        let data = dir.serialize(self.block_size())?;
        self.rewrite_data(dir.id(), inode, &data)
    }

    pub fn directory(&self, id: InodeId) -> Result<Directory> {
        let inode = self.get_inode(id)?;
        self.load_directory(id, &inode)
    }

    pub fn save_directory(&mut self, dir: &Directory) -> Result<()> {
        let mut inode = self.get_inode(dir.id())?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        self.store_directory(dir, &mut inode)
    }

    /// Resolves an absolute path from the root directory.
    pub fn get_inode_id(&self, path: &str) -> Result<InodeId> {
        path.split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .try_fold(self.root(), |id, part| self.lookup(id, part))
    }

    pub fn directory_at(&self, path: &str) -> Result<Directory> {
        self.directory(self.get_inode_id(path)?)
    }

    pub fn lookup(&self, parent: InodeId, name: &str) -> Result<InodeId> {
        self.directory(parent)?.search(name)
    }

    pub fn readdir(&self, id: InodeId) -> Result<Vec<DirEntry>> {
        let dir = self.directory(id)?;
        dir.iter()
            .map(|(name, child)| {
                Ok(DirEntry {
                    name: name.to_owned(),
                    id: child,
                    kind: self.inodes.get(&self.disk, child)?.kind,
                })
            })
            .collect()
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\0']) {
            return Err(Error::InvalidArgument);
        }
        if name.len() > self.name_max() {
            return Err(Error::NameTooLong);
        }

        Ok(())
    }

    /// Fails early when `name` cannot be added to `parent`.
    fn check_new_entry(&self, parent: InodeId, name: &str) -> Result<()> {
        self.check_name(name)?;
        if self.directory(parent)?.contains(name) {
            return Err(Error::AlreadyExists);
        }

        Ok(())
    }

    /// Adds `name -> id` to `parent`; a subdirectory also adds a link to the
    /// parent through its `..`.
    fn add_entry(&mut self, parent: InodeId, name: &str, id: InodeId, subdir: bool) -> Result<()> {
        let mut inode = self.get_inode(parent)?;
        let mut dir = self.load_directory(parent, &inode)?;
        dir.insert(name, id)?;
        if subdir {
            inode.links += 1;
        }
        self.store_directory(&dir, &mut inode)
    }

    /// Takes `name` out of `dir` and saves it. On a full disk the record is
    /// buried in place instead, so removals can still free space.
    fn drop_entry(&mut self, dir: &mut Directory, inode: &mut Inode, name: &str) -> Result<()> {
        dir.remove(name)?;
        match self.store_directory(dir, inode) {
            Err(Error::OutOfDataBlocks) => {
                log::warn!("directory {}: no space to rewrite, burying {name:?}", dir.id());
                self.bury_entry(dir.id(), inode, name)
            }
            result => result,
        }
    }

    fn bury_entry(&mut self, id: InodeId, inode: &mut Inode, name: &str) -> Result<()> {
        let block_size = self.block_size();
        let offset = find_record(&self.read_all(inode)?, block_size, name)?
            .ok_or(Error::NoSuchEntry)?;
        let inner = offset % block_size;
        let block = translate::block_at(&self.disk, inode, (offset - inner) as u64)?;
        self.disk.map_mut(block, |block| bury_record(block, inner))?;

        inode.touch(Stamp::Change | Stamp::Modify, now());
        self.inodes.set(&self.disk, id, inode)
    }

    /// Stores a new inode and links it into `parent`, undoing the inode when
    /// the parent cannot take the entry.
    fn create(
        &mut self,
        parent: InodeId,
        name: &str,
        mut inode: Inode,
        body: &[u8],
    ) -> Result<InodeId> {
        self.check_new_entry(parent, name)?;
        let id = self.inodes.reserve(&self.disk)?;
        self.inodes.set(&self.disk, id, &inode)?;

        let body = if inode.is_dir() {
            Directory::new(id, parent).serialize(self.block_size())?
        } else {
            body.to_vec()
        };
        if !body.is_empty() {
            if let Err(err) = self.rewrite_data(id, &mut inode, &body) {
                self.inodes.release(&self.disk, id)?;
                return Err(err);
            }
        }

        if let Err(err) = self.add_entry(parent, name, id, inode.is_dir()) {
            self.free(id, inode)?;
            return Err(err);
        }
        log::debug!("create parent={parent} name={name:?} inode={id} kind={:?}", inode.kind);

        Ok(id)
    }

    pub fn mkdir(
        &mut self,
        parent: InodeId,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId> {
        let mut inode = Inode::new(InodeKind::Directory, mode, uid, gid, now());
        inode.links = 2;
        self.create(parent, name, inode, &[])
    }

    /// Creates a regular file; `dev` is only recorded.
    pub fn mknod(
        &mut self,
        parent: InodeId,
        name: &str,
        mode: u32,
        dev: u64,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId> {
        let mut inode = Inode::new(InodeKind::Regular, mode, uid, gid, now());
        inode.dev = dev;
        self.create(parent, name, inode, &[])
    }

    pub fn symlink(
        &mut self,
        parent: InodeId,
        name: &str,
        target: &str,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId> {
        if target.is_empty() || target.len() as u64 > self.max_file_size() {
            return Err(Error::InvalidArgument);
        }
        let inode = Inode::new(InodeKind::Symlink, 0o777, uid, gid, now());
        self.create(parent, name, inode, target.as_bytes())
    }

    pub fn readlink(&self, id: InodeId) -> Result<Vec<u8>> {
        let inode = self.get_inode(id)?;
        if !inode.is_symlink() {
            return Err(Error::NotASymlink);
        }
        self.read_all(&inode)
    }

    /// Adds another name for a non-directory.
    pub fn link(&mut self, id: InodeId, new_parent: InodeId, new_name: &str) -> Result<()> {
        let mut inode = self.get_inode(id)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }
        self.check_new_entry(new_parent, new_name)?;
        self.add_entry(new_parent, new_name, id, false)?;

        inode.links += 1;
        inode.touch(Stamp::Change, now());
        self.inodes.set(&self.disk, id, &inode)
    }

    /// Removes the entry of a non-directory and drops its link.
    pub fn remove(&mut self, parent: InodeId, name: &str) -> Result<()> {
        let mut parent_inode = self.get_inode(parent)?;
        let mut dir = self.load_directory(parent, &parent_inode)?;
        let id = dir.search(name)?;
        if self.get_inode(id)?.is_dir() {
            return Err(Error::IsADirectory);
        }

        self.drop_entry(&mut dir, &mut parent_inode, name)?;
        self.unlink(id)
    }

    pub fn rmdir(&mut self, parent: InodeId, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(Error::InvalidArgument);
        }
        let mut parent_inode = self.get_inode(parent)?;
        let mut dir = self.load_directory(parent, &parent_inode)?;
        let id = dir.search(name)?;
        let inode = self.get_inode(id)?;
        if !self.load_directory(id, &inode)?.is_empty() {
            return Err(Error::DirectoryNotEmpty);
        }

        parent_inode.links -= 1;
        self.drop_entry(&mut dir, &mut parent_inode, name)?;
        self.free(id, inode)
    }

    /// Whether `id` is `ancestor` or lies below it.
    fn is_within(&self, ancestor: InodeId, mut id: InodeId) -> Result<bool> {
        loop {
            if id == ancestor {
                return Ok(true);
            }
            if id == self.root() {
                return Ok(false);
            }
            id = self.lookup(id, "..")?;
        }
    }

    /// Moves `parent/name` to `new_parent/new_name`, replacing a compatible
    /// destination.
    pub fn rename(
        &mut self,
        parent: InodeId,
        name: &str,
        new_parent: InodeId,
        new_name: &str,
    ) -> Result<()> {
        if [name, new_name].iter().any(|&n| n == "." || n == "..") {
            return Err(Error::InvalidArgument);
        }
        self.check_name(new_name)?;

        let same = parent == new_parent;
        let mut old_inode = self.get_inode(parent)?;
        let mut old_dir = self.load_directory(parent, &old_inode)?;
        let id = old_dir.search(name)?;
        let mut inode = self.get_inode(id)?;
        if same && name == new_name {
            return Ok(());
        }

        let mut new_inode = self.get_inode(new_parent)?;
        let mut new_dir = if same {
            old_dir.clone()
        } else {
            self.load_directory(new_parent, &new_inode)?
        };
        if inode.is_dir() && !same && self.is_within(id, new_parent)? {
            return Err(Error::InvalidArgument);
        }

        // the entry being replaced, if any
        let replaced = match new_dir.search(new_name) {
            Ok(other) if other == id => return Ok(()),
            Ok(other) => {
                let other_inode = self.get_inode(other)?;
                match (inode.is_dir(), other_inode.is_dir()) {
                    (true, false) => return Err(Error::NotADirectory),
                    (false, true) => return Err(Error::IsADirectory),
                    (true, true) if !self.load_directory(other, &other_inode)?.is_empty() => {
                        return Err(Error::DirectoryNotEmpty);
                    }
                    _ => Some((other, other_inode)),
                }
            }
            Err(Error::NoSuchEntry) => None,
            Err(err) => return Err(err),
        };
        log::debug!("rename {parent}/{name:?} -> {new_parent}/{new_name:?} inode={id}");

        let replaced_dir = matches!(&replaced, Some((_, other)) if other.is_dir());
        if same {
            old_dir.remove(name)?;
            if replaced.is_some() {
                old_dir.remove(new_name)?;
            }
            old_dir.insert(new_name, id)?;
            if replaced_dir {
                old_inode.links -= 1;
            }
            old_inode.touch(Stamp::Change | Stamp::Modify, now());
            self.store_directory(&old_dir, &mut old_inode)?;
        } else {
            if replaced.is_some() {
                new_dir.remove(new_name)?;
            }
            new_dir.insert(new_name, id)?;
            old_dir.remove(name)?;
            if inode.is_dir() {
                new_inode.links += 1;
                old_inode.links -= 1;
            }
            if replaced_dir {
                new_inode.links -= 1;
            }
            new_inode.touch(Stamp::Change | Stamp::Modify, now());
            old_inode.touch(Stamp::Change | Stamp::Modify, now());
            self.store_directory(&new_dir, &mut new_inode)?;
            self.store_directory(&old_dir, &mut old_inode)?;

            if inode.is_dir() {
                let mut moved = self.load_directory(id, &inode)?;
                moved.set_parent(new_parent);
                self.store_directory(&moved, &mut inode)?;
            }
        }

        inode.touch(Stamp::Change, now());
        self.inodes.set(&self.disk, id, &inode)?;

        match replaced {
            Some((other, other_inode)) if other_inode.is_dir() => self.free(other, other_inode),
            Some((other, _)) => self.unlink(other),
            None => Ok(()),
        }
    }

    /******** attributes ********/

    pub fn chmod(&mut self, id: InodeId, mode: u32) -> Result<Inode> {
        let mut inode = self.get_inode(id)?;
        inode.mode = mode & 0o7777;
        inode.touch(Stamp::Access | Stamp::Change, now());
        self.inodes.set(&self.disk, id, &inode)?;

        Ok(inode)
    }

    pub fn chown(&mut self, id: InodeId, uid: Option<u32>, gid: Option<u32>) -> Result<Inode> {
        let mut inode = self.get_inode(id)?;
        if let Some(uid) = uid {
            inode.uid = uid;
        }
        if let Some(gid) = gid {
            inode.gid = gid;
        }
        inode.touch(Stamp::Access | Stamp::Change, now());
        self.inodes.set(&self.disk, id, &inode)?;

        Ok(inode)
    }

    pub fn set_times(
        &mut self,
        id: InodeId,
        atime: Option<u32>,
        mtime: Option<u32>,
    ) -> Result<Inode> {
        let mut inode = self.get_inode(id)?;
        if let Some(atime) = atime {
            inode.atime = atime;
        }
        if let Some(mtime) = mtime {
            inode.mtime = mtime;
        }
        inode.touch(Stamp::Change, now());
        self.inodes.set(&self.disk, id, &inode)?;

        Ok(inode)
    }

    pub fn statfs(&self) -> Result<StatFs> {
        let (blocks, blocks_free) = self.blocks.statfs();
        Ok(StatFs {
            block_size: self.block_size() as u64,
            blocks,
            blocks_free,
            inodes: self.inodes.count(),
            inodes_free: self.inodes.count_free(&self.disk)?,
            name_max: self.name_max() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use block_dev::MemoryDisk;

    use super::*;

    fn format(block_size: usize, block_count: u64) -> StackFileSystem {
        let dev = Arc::new(MemoryDisk::new(block_size, block_count));
        let options = FormatOptions {
            inode_blocks: 4,
            uid: 0,
            gid: 0,
        };
        StackFileSystem::format(dev, options).unwrap()
    }

    #[test]
    fn root_after_format() {
        let fs = format(512, 64);
        let root = fs.get_inode(InodeId::ROOT).unwrap();
        assert!(root.is_dir());
        assert_eq!(root.links, 2);
        assert_eq!(root.mode, 0o777);

        let dir = fs.directory(InodeId::ROOT).unwrap();
        assert!(dir.is_empty());
        assert_eq!(dir.search("..").unwrap(), InodeId::ROOT);
    }

    #[test]
    fn bad_geometry() {
        let dev = Arc::new(MemoryDisk::new(512, 6));
        let options = FormatOptions {
            inode_blocks: 4,
            uid: 0,
            gid: 0,
        };
        assert!(matches!(
            StackFileSystem::format(dev, options),
            Err(Error::InvalidArgument)
        ));

        let dev = Arc::new(MemoryDisk::new(300, 64));
        let options = FormatOptions {
            inode_blocks: 4,
            uid: 0,
            gid: 0,
        };
        assert!(matches!(
            StackFileSystem::format(dev, options),
            Err(Error::InvalidArgument)
        ));
    }

    #[test]
    fn public_ids_are_checked() {
        let fs = format(512, 64);
        for id in [0, 5, 1 << 40] {
            assert!(matches!(
                fs.get_inode(InodeId::new(id)),
                Err(Error::NoSuchEntry)
            ));
        }
    }

    #[test]
    fn kinds_are_checked() {
        let mut fs = format(512, 64);
        assert!(matches!(
            fs.write(InodeId::ROOT, b"x", 0),
            Err(Error::IsADirectory)
        ));
        let link = fs.symlink(InodeId::ROOT, "l", "/target", 0, 0).unwrap();
        assert!(matches!(fs.truncate(link, 0), Err(Error::NotAFile)));
        assert!(matches!(fs.readlink(InodeId::ROOT), Err(Error::NotASymlink)));
    }
}
