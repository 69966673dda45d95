//! # FUSE adapter
//!
//! Translates kernel requests into [`StackFileSystem`] calls. Inode numbers
//! are handed to the kernel unchanged, FUSE's root (1) being the root
//! directory. The adapter owns the filesystem and `fuser` serves one request
//! at a time through `&mut self`.

use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use stack_fs::{Error, Inode, InodeId, InodeKind, Result, StackFileSystem};

use crate::errno;

const TTL: Duration = Duration::from_secs(1);

/// Bytes per unit of `st_blocks`.
const STAT_BLOCK: u64 = 512;

pub struct FuseAdapter {
    fs: StackFileSystem,
}

impl FuseAdapter {
    pub fn new(fs: StackFileSystem) -> Self {
        Self { fs }
    }

    pub fn attr(&self, id: InodeId, inode: &Inode) -> FileAttr {
        let block_size = self.fs.block_size() as u64;
        FileAttr {
            ino: id.into(),
            size: inode.size,
            blocks: inode.blocks * block_size / STAT_BLOCK,
            atime: system_time(inode.atime),
            mtime: system_time(inode.mtime),
            ctime: system_time(inode.ctime),
            crtime: system_time(inode.ctime),
            kind: file_type(inode.kind),
            perm: (inode.mode & 0o7777) as u16,
            nlink: inode.links.into(),
            uid: inode.uid,
            gid: inode.gid,
            rdev: inode.dev as u32,
            blksize: block_size as u32,
            flags: inode.flags,
        }
    }

    fn attr_of(&self, id: InodeId) -> Result<FileAttr> {
        let inode = self.fs.get_inode(id)?;
        Ok(self.attr(id, &inode))
    }

    fn set_attributes(
        &mut self,
        id: InodeId,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> Result<FileAttr> {
        if let Some(mode) = mode {
            self.fs.chmod(id, mode)?;
        }
        if uid.is_some() || gid.is_some() {
            self.fs.chown(id, uid, gid)?;
        }
        if let Some(size) = size {
            self.fs.truncate(id, size)?;
        }
        if atime.is_some() || mtime.is_some() {
            self.fs
                .set_times(id, atime.map(seconds_of), mtime.map(seconds_of))?;
        }

        self.attr_of(id)
    }

    /// `rename` with its flags. Only `RENAME_NOREPLACE` is understood.
    fn rename_entry(
        &mut self,
        parent: InodeId,
        name: &str,
        new_parent: InodeId,
        new_name: &str,
        flags: u32,
    ) -> Result<()> {
        if flags & !libc::RENAME_NOREPLACE != 0 {
            return Err(Error::InvalidArgument);
        }
        if flags & libc::RENAME_NOREPLACE != 0 && self.fs.lookup(new_parent, new_name).is_ok() {
            return Err(Error::AlreadyExists);
        }
        self.fs.rename(parent, name, new_parent, new_name)
    }
}

impl Filesystem for FuseAdapter {
    fn destroy(&mut self) {
        if let Err(err) = self.fs.sync() {
            log::error!("sync on unmount: {err}");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        log::debug!("lookup parent={parent} name={name:?}");
        let result = utf8(name)
            .and_then(|name| self.fs.lookup(parent.into(), name))
            .and_then(|id| self.attr_of(id));
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(reject("lookup", err)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr_of(ino.into()) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(reject("getattr", err)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        log::debug!("setattr ino={ino} mode={mode:?} uid={uid:?} gid={gid:?} size={size:?}");
        match self.set_attributes(ino.into(), mode, uid, gid, size, atime, mtime) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(reject("setattr", err)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        match self.fs.readlink(ino.into()) {
            Ok(target) => reply.data(&target),
            Err(err) => reply.error(reject("readlink", err)),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        log::debug!("mknod parent={parent} name={name:?} mode={mode:o}");
        let result = utf8(name)
            .and_then(|name| {
                self.fs.mknod(
                    parent.into(),
                    name,
                    mode & !umask,
                    rdev.into(),
                    req.uid(),
                    req.gid(),
                )
            })
            .and_then(|id| self.attr_of(id));
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(reject("mknod", err)),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        log::debug!("mkdir parent={parent} name={name:?} mode={mode:o}");
        let result = utf8(name)
            .and_then(|name| {
                self.fs
                    .mkdir(parent.into(), name, mode & !umask, req.uid(), req.gid())
            })
            .and_then(|id| self.attr_of(id));
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(reject("mkdir", err)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        log::debug!("unlink parent={parent} name={name:?}");
        match utf8(name).and_then(|name| self.fs.remove(parent.into(), name)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(reject("unlink", err)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        log::debug!("rmdir parent={parent} name={name:?}");
        match utf8(name).and_then(|name| self.fs.rmdir(parent.into(), name)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(reject("rmdir", err)),
        }
    }

    fn symlink(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        log::debug!("symlink parent={parent} name={link_name:?} target={target:?}");
        let result = utf8(link_name)
            .and_then(|name| {
                let target = utf8(target.as_os_str())?;
                self.fs
                    .symlink(parent.into(), name, target, req.uid(), req.gid())
            })
            .and_then(|id| self.attr_of(id));
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(reject("symlink", err)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        log::debug!("rename {parent}/{name:?} -> {newparent}/{newname:?} flags={flags:#x}");
        let result = utf8(name).and_then(|name| {
            let newname = utf8(newname)?;
            self.rename_entry(parent.into(), name, newparent.into(), newname, flags)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(reject("rename", err)),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        log::debug!("link ino={ino} -> {newparent}/{newname:?}");
        let result = utf8(newname)
            .and_then(|name| self.fs.link(ino.into(), newparent.into(), name))
            .and_then(|()| self.attr_of(ino.into()));
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(reject("link", err)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.get_inode(ino.into()) {
            Ok(_) => reply.opened(0, 0),
            Err(err) => reply.error(reject("open", err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        log::debug!("read ino={ino} offset={offset} size={size}");
        let mut buf = vec![0; size as usize];
        let result = u64::try_from(offset)
            .map_err(|_| Error::InvalidArgument)
            .and_then(|offset| self.fs.read(ino.into(), &mut buf, offset));
        match result {
            Ok(len) => reply.data(&buf[..len]),
            Err(err) => reply.error(reject("read", err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        log::debug!("write ino={ino} offset={offset} size={}", data.len());
        let result = u64::try_from(offset)
            .map_err(|_| Error::InvalidArgument)
            .and_then(|offset| self.fs.write(ino.into(), data, offset));
        // the kernel expects the request length, not the filler included
        match result {
            Ok(_) => reply.written(data.len() as u32),
            Err(err) => reply.error(reject("write", err)),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.fs.sync() {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(reject("fsync", err)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        log::debug!("readdir ino={ino} offset={offset}");
        let entries = match self.fs.readdir(ino.into()) {
            Ok(entries) => entries,
            Err(err) => return reply.error(reject("readdir", err)),
        };

        // the offset handed back is the index of the next entry
        for (i, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            let next = i as i64 + 1;
            if reply.add(entry.id.into(), next, file_type(entry.kind), &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.fs.statfs() {
            Ok(stat) => reply.statfs(
                stat.blocks,
                stat.blocks_free,
                stat.blocks_free,
                stat.inodes,
                stat.inodes_free,
                stat.block_size as u32,
                stat.name_max as u32,
                stat.block_size as u32,
            ),
            Err(err) => reply.error(reject("statfs", err)),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        log::debug!("create parent={parent} name={name:?} mode={mode:o}");
        let result = utf8(name)
            .and_then(|name| {
                self.fs
                    .mknod(parent.into(), name, mode & !umask, 0, req.uid(), req.gid())
            })
            .and_then(|id| self.attr_of(id));
        match result {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(err) => reply.error(reject("create", err)),
        }
    }
}

/// Logs a failed request and picks its errno.
fn reject(op: &str, err: Error) -> c_int {
    match &err {
        Error::Io(_) => log::error!("{op}: {err}"),
        _ => log::debug!("{op}: {err}"),
    }
    errno(&err)
}

fn utf8(name: &OsStr) -> Result<&str> {
    name.to_str().ok_or(Error::InvalidArgument)
}

pub fn file_type(kind: InodeKind) -> FileType {
    match kind {
        InodeKind::Directory => FileType::Directory,
        InodeKind::Symlink => FileType::Symlink,
        _ => FileType::RegularFile,
    }
}

#[inline]
fn system_time(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.into())
}

fn seconds_of(time: TimeOrNow) -> u32 {
    match time {
        TimeOrNow::SpecificTime(time) => time
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_secs() as u32),
        TimeOrNow::Now => stack_fs::now(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::MemoryDisk;
    use stack_fs::{FormatOptions, ROOT};

    use super::*;

    fn adapter() -> FuseAdapter {
        let dev = Arc::new(MemoryDisk::new(1024, 128));
        let options = FormatOptions {
            inode_blocks: 4,
            uid: 1000,
            gid: 100,
        };
        FuseAdapter::new(StackFileSystem::format(dev, options).unwrap())
    }

    #[test]
    fn root_attributes() {
        let adapter = adapter();
        let attr = adapter.attr_of(ROOT).unwrap();
        assert_eq!(attr.ino, fuser::FUSE_ROOT_ID);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!((attr.perm, attr.nlink), (0o777, 2));
        assert_eq!((attr.uid, attr.gid), (1000, 100));
        assert_eq!(attr.blksize, 1024);
        // one directory block in 512-byte units
        assert_eq!(attr.blocks, 2);
    }

    #[test]
    fn setattr_applies_every_field() {
        let mut adapter = adapter();
        let id = adapter.fs.mknod(ROOT, "f", 0o644, 0, 0, 0).unwrap();

        let mtime = UNIX_EPOCH + Duration::from_secs(1_000);
        let attr = adapter
            .set_attributes(
                id,
                Some(0o100_600),
                Some(5),
                None,
                Some(3000),
                None,
                Some(TimeOrNow::SpecificTime(mtime)),
            )
            .unwrap();
        assert_eq!(attr.perm, 0o600);
        assert_eq!((attr.uid, attr.gid), (5, 0));
        assert_eq!(attr.size, 3000);
        assert_eq!(attr.blocks, 6);
        assert_eq!(attr.mtime, mtime);
        assert_eq!(attr.kind, FileType::RegularFile);
    }

    #[test]
    fn rename_flags() {
        let mut adapter = adapter();
        let a = adapter.fs.mknod(ROOT, "a", 0o644, 0, 0, 0).unwrap();
        let b = adapter.fs.mknod(ROOT, "b", 0o644, 0, 0, 0).unwrap();

        let err = adapter
            .rename_entry(ROOT, "a", ROOT, "b", libc::RENAME_NOREPLACE)
            .unwrap_err();
        assert_eq!(errno(&err), libc::EEXIST);
        assert_eq!(adapter.fs.lookup(ROOT, "b").unwrap(), b);

        let err = adapter
            .rename_entry(ROOT, "a", ROOT, "b", libc::RENAME_EXCHANGE)
            .unwrap_err();
        assert_eq!(errno(&err), libc::EINVAL);

        adapter
            .rename_entry(ROOT, "a", ROOT, "c", libc::RENAME_NOREPLACE)
            .unwrap();
        assert_eq!(adapter.fs.lookup(ROOT, "c").unwrap(), a);
        adapter.rename_entry(ROOT, "c", ROOT, "b", 0).unwrap();
        assert_eq!(adapter.fs.lookup(ROOT, "b").unwrap(), a);
    }

    #[test]
    fn stale_inode_numbers() {
        let adapter = adapter();
        let err = adapter.attr_of(InodeId::new(1 << 40)).unwrap_err();
        assert_eq!(errno(&err), libc::ENOENT);
        assert!(matches!(utf8(OsStr::new("ok")), Ok("ok")));
    }
}
