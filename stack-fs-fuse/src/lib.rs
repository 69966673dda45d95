//! Host-side tooling around `stack-fs`: a file-backed block device, the FUSE
//! adapter and the command line pieces shared by `stack-fs-mkfs` and
//! `stack-fs-mount`.

mod adapter;
mod block_file;
pub mod cli;
mod errno;

pub use self::{
    adapter::{file_type, FuseAdapter},
    block_file::BlockFile,
    errno::errno,
};
