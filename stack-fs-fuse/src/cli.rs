//! Argument groups shared by the binaries.

use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use log::LevelFilter;
use stack_fs::layout::INODE_SIZE;
use stack_fs::{AtimePolicy, FormatOptions, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

#[derive(Debug, Args)]
pub struct Geometry {
    /// Block size in bytes, a power of two
    #[arg(long, short = 'b', default_value_t = DEFAULT_BLOCK_SIZE, value_parser = parse_block_size)]
    pub block_size: usize,

    /// Total number of blocks (format only)
    #[arg(long, short = 'n')]
    pub block_count: Option<u64>,

    /// Minimum number of inodes (format only)
    #[arg(long, short = 'i')]
    pub inode_count: Option<u64>,
}

impl Geometry {
    pub fn block_count(&self) -> anyhow::Result<u64> {
        self.block_count
            .context("--block-count is required to format a disk")
    }

    /// Inode region size: enough blocks for `--inode-count` inodes, a tenth
    /// of the disk otherwise.
    pub fn inode_blocks(&self, block_count: u64) -> anyhow::Result<u64> {
        let per_block = (self.block_size / INODE_SIZE) as u64;
        let inode_blocks = match self.inode_count {
            Some(count) => count.div_ceil(per_block),
            None => block_count / 10,
        };

        if inode_blocks == 0 {
            bail!("a disk of {block_count} blocks leaves no room for inodes");
        }
        if inode_blocks >= block_count / 2 {
            bail!("too many inode blocks ({inode_blocks} of {block_count})");
        }

        Ok(inode_blocks)
    }

    /// Block count and options for formatting a disk owned by `uid:gid`.
    pub fn format_options(&self, uid: u32, gid: u32) -> anyhow::Result<(u64, FormatOptions)> {
        let block_count = self.block_count()?;
        let options = FormatOptions {
            inode_blocks: self.inode_blocks(block_count)?,
            uid,
            gid,
        };

        Ok((block_count, options))
    }

    /// Refuses the options that only make sense when formatting.
    pub fn check_existing(&self) -> anyhow::Result<()> {
        if self.block_count.is_some() || self.inode_count.is_some() {
            bail!("--block-count and --inode-count only apply when formatting");
        }

        Ok(())
    }
}

fn parse_block_size(arg: &str) -> Result<usize, String> {
    let size: usize = arg.parse().map_err(|err| format!("{err}"))?;
    if !size.is_power_of_two() {
        return Err("block size must be a power of two".to_owned());
    }
    if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&size) {
        return Err(format!(
            "block size must be between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE} bytes"
        ));
    }

    Ok(size)
}

#[derive(Debug, Args)]
pub struct Verbosity {
    /// Log every request
    #[arg(long, short)]
    pub debug: bool,

    /// Only log errors
    #[arg(long, short, conflicts_with = "debug")]
    pub quiet: bool,
}

impl Verbosity {
    pub fn level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Error
        } else {
            LevelFilter::Info
        }
    }

    /// Installs `env_logger` at [`Self::level`]; `RUST_LOG` still wins.
    pub fn init_logger(&self) {
        env_logger::Builder::new()
            .filter_level(self.level())
            .parse_default_env()
            .init();
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Atime {
    /// Reads never update the access time
    #[default]
    Never,
    /// Linux relatime
    Relative,
    /// Every read updates the access time
    Always,
}

impl From<Atime> for AtimePolicy {
    fn from(atime: Atime) -> Self {
        match atime {
            Atime::Never => AtimePolicy::Never,
            Atime::Relative => AtimePolicy::Relative,
            Atime::Always => AtimePolicy::Always,
        }
    }
}

/// Real user and group of this process.
pub fn current_owner() -> (u32, u32) {
    // SAFETY: getuid and getgid cannot fail and touch no memory.
    unsafe { (libc::getuid(), libc::getgid()) }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Probe {
        #[command(flatten)]
        geometry: Geometry,
        #[command(flatten)]
        verbosity: Verbosity,
    }

    fn parse(args: &[&str]) -> Result<Probe, clap::Error> {
        Probe::try_parse_from(std::iter::once("probe").chain(args.iter().copied()))
    }

    #[test]
    fn block_size() {
        assert_eq!(parse(&[]).unwrap().geometry.block_size, 4096);
        assert_eq!(parse(&["-b", "256"]).unwrap().geometry.block_size, 256);
        for bad in ["128", "300", "131072", "x"] {
            assert!(parse(&["--block-size", bad]).is_err(), "{bad}");
        }
    }

    #[test]
    fn inode_blocks() {
        let probe = parse(&["-n", "1000"]).unwrap();
        assert_eq!(probe.geometry.inode_blocks(1000).unwrap(), 100);

        // 16 inodes per 4096-byte block
        let probe = parse(&["-n", "1000", "-i", "33"]).unwrap();
        assert_eq!(probe.geometry.inode_blocks(1000).unwrap(), 3);

        let probe = parse(&["-n", "1000", "-i", "8000"]).unwrap();
        assert!(probe.geometry.inode_blocks(1000).is_err());
        let probe = parse(&["-n", "5"]).unwrap();
        assert!(probe.geometry.inode_blocks(5).is_err());
    }

    #[test]
    fn format_only_options() {
        let probe = parse(&["-b", "512", "-n", "64"]).unwrap();
        let (count, options) = probe.geometry.format_options(7, 8).unwrap();
        assert_eq!((count, options.inode_blocks), (64, 6));
        assert_eq!((options.uid, options.gid), (7, 8));
        assert!(probe.geometry.check_existing().is_err());

        let probe = parse(&[]).unwrap();
        assert!(probe.geometry.format_options(0, 0).is_err());
        assert!(probe.geometry.check_existing().is_ok());
    }

    #[test]
    fn verbosity() {
        assert_eq!(parse(&[]).unwrap().verbosity.level(), LevelFilter::Info);
        assert_eq!(parse(&["-d"]).unwrap().verbosity.level(), LevelFilter::Debug);
        assert_eq!(parse(&["-q"]).unwrap().verbosity.level(), LevelFilter::Error);
        assert!(parse(&["-d", "-q"]).is_err());
    }
}
