use libc::c_int;
use stack_fs::Error;

/// The errno a failed request is answered with.
pub fn errno(err: &Error) -> c_int {
    match err {
        Error::AccessDenied => libc::EACCES,
        Error::AlreadyExists => libc::EEXIST,
        Error::DirectoryNotEmpty => libc::ENOTEMPTY,
        Error::FileTooBig => libc::EFBIG,
        Error::Io(_) => libc::EIO,
        Error::IsADirectory => libc::EISDIR,
        Error::NotADirectory => libc::ENOTDIR,
        Error::NotAFile | Error::NotASymlink | Error::InvalidArgument => libc::EINVAL,
        Error::NoSuchEntry => libc::ENOENT,
        Error::OutOfDataBlocks | Error::OutOfInodes => libc::ENOSPC,
        Error::NameTooLong => libc::ENAMETOOLONG,
    }
}
