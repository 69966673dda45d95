/* stack-fs 的整体架构，自上而下 */

// 文件系统层：文件数据、目录树与属性操作
mod sfs;

// 事务层：数据修改一律写时复制
mod txn;

// 地址转换层：文件内偏移到数据块
mod translate;

// 目录：存放在目录自身数据中的名字到索引节点的映射
mod directory;

// 索引节点表：按编号直接寻址
mod inode_table;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 磁盘块访问层：带越界检查
mod block;

mod error;
mod options;
pub mod path;

pub use self::{
    block::{Block, BlockId, Disk},
    directory::Directory,
    error::{Error, Result},
    layout::{Inode, InodeId, InodeKind, Stamp},
    options::{AtimePolicy, FormatOptions, MountOptions},
    sfs::{now, DirEntry, StackFileSystem, StatFs},
    translate::{block_at, max_file_size},
};

pub const MIN_BLOCK_SIZE: usize = 256;
pub const MAX_BLOCK_SIZE: usize = 65536;
pub const DEFAULT_BLOCK_SIZE: usize = 4096;
pub const ROOT: InodeId = InodeId::ROOT;
