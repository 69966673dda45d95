//! Format and mount parameters.

use crate::layout::Inode;

const DAY: u32 = 24 * 60 * 60;

/// When reads write the access time back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AtimePolicy {
    /// Reads never touch the inode.
    #[default]
    Never,
    /// Linux `relatime`: only when atime is not newer than mtime or ctime,
    /// or is a day old.
    Relative,
    Always,
}

impl AtimePolicy {
    pub fn should_update(self, inode: &Inode, now: u32) -> bool {
        match self {
            AtimePolicy::Never => false,
            AtimePolicy::Relative => {
                inode.atime <= inode.mtime
                    || inode.atime <= inode.ctime
                    || now.saturating_sub(inode.atime) >= DAY
            }
            AtimePolicy::Always => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Blocks of the inode region.
    pub inode_blocks: u64,
    /// Owner of the root directory.
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Default, Clone)]
pub struct MountOptions {
    pub atime: AtimePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::InodeKind;

    #[test]
    fn relatime_rule() {
        let mut inode = Inode::new(InodeKind::Regular, 0o644, 0, 0, 100);
        assert!(AtimePolicy::Relative.should_update(&inode, 101));

        inode.atime = 200;
        assert!(!AtimePolicy::Relative.should_update(&inode, 300));
        assert!(AtimePolicy::Relative.should_update(&inode, 200 + DAY));
        assert!(!AtimePolicy::Never.should_update(&inode, 200 + DAY));
        assert!(AtimePolicy::Always.should_update(&inode, 201));
    }
}
