//! # 磁盘数据结构
//!
//! stack-fs 的磁盘布局：
//! 超级块 | 索引节点区 | 数据区（空闲栈节点位于其末尾）

mod super_block;
pub use super_block::{SuperBlock, SUPER_BLOCK_SIZE};

mod free_stack;
pub use free_stack::StackAllocator;

mod inode;
pub use inode::{Inode, InodeId, InodeKind, Stamp, INODE_SIZE};

/// 目录项，同样存放在磁盘上
mod dir_entry;
pub use dir_entry::{
    bury_record, find_record, name_max, parse_records, serialize_records, DirRecord, RECORD_HEADER,
};
