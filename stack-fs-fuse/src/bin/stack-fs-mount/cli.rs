use std::path::PathBuf;

use clap::Parser;
use stack_fs_fuse::cli::{Atime, Geometry, Verbosity};

/// Mounts a stack-fs image, or a fresh in-memory disk, through FUSE
#[derive(Debug, Parser)]
pub struct Cli {
    /// Directory to mount on
    pub mountpoint: PathBuf,

    /// Image file to mount; without it a `--block-count` block memory disk is formatted
    #[arg(long, short = 'f')]
    pub disk_file: Option<PathBuf>,

    #[command(flatten)]
    pub geometry: Geometry,

    /// Accepted for compatibility, requests are served one at a time
    #[arg(long, short)]
    pub parallel: bool,

    /// When reads update the access time
    #[arg(long, value_enum, default_value_t)]
    pub atime: Atime,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from(["mount", "/mnt", "-n", "2048", "-d"]).unwrap();
        assert_eq!(cli.mountpoint, PathBuf::from("/mnt"));
        assert!(cli.disk_file.is_none());
        assert_eq!(cli.atime, Atime::Never);
        assert!(cli.verbosity.debug);

        let cli = Cli::try_parse_from(["mount", "-f", "fs.img", "-p", "--atime", "relative", "/mnt"])
            .unwrap();
        assert!(cli.parallel);
        assert_eq!(cli.atime, Atime::Relative);
        assert!(cli.geometry.check_existing().is_ok());

        assert!(Cli::try_parse_from(["mount"]).is_err());
    }
}
