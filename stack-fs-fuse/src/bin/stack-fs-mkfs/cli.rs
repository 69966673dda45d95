use std::path::PathBuf;

use clap::Parser;
use stack_fs_fuse::cli::{Geometry, Verbosity};

/// Formats a disk image with an empty stack-fs filesystem
#[derive(Debug, Parser)]
pub struct Cli {
    /// Image file to create, truncated if it exists
    #[arg(long, short = 'f')]
    pub disk_file: PathBuf,

    #[command(flatten)]
    pub geometry: Geometry,

    #[command(flatten)]
    pub verbosity: Verbosity,
}
