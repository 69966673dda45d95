use std::io;

/// Errors a caller of the filesystem can recover from.
///
/// Violated internal invariants (a block or inode index outside its region,
/// a corrupted allocator cursor) are not represented here; they panic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("access denied")]
    AccessDenied,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("file too big")]
    FileTooBig,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("not a regular file")]
    NotAFile,
    #[error("not a symbolic link")]
    NotASymlink,
    #[error("no such file or directory")]
    NoSuchEntry,
    #[error("out of data blocks")]
    OutOfDataBlocks,
    #[error("out of inodes")]
    OutOfInodes,
    #[error("file name too long")]
    NameTooLong,
    #[error("invalid argument")]
    InvalidArgument,
}

impl From<binrw::Error> for Error {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::Io(err) => Self::Io(err),
            other => Self::Io(io::Error::new(io::ErrorKind::InvalidData, other.to_string())),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
