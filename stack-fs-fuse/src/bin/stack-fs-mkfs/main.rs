mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use stack_fs::StackFileSystem;
use stack_fs_fuse::cli::current_owner;
use stack_fs_fuse::BlockFile;

use self::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.verbosity.init_logger();

    let (uid, gid) = current_owner();
    let (block_count, options) = cli.geometry.format_options(uid, gid)?;
    let path = &cli.disk_file;
    let dev = BlockFile::create(path, cli.geometry.block_size, block_count)
        .with_context(|| format!("creating {}", path.display()))?;

    let fs = StackFileSystem::format(Arc::new(dev), options)
        .with_context(|| format!("formatting {}", path.display()))?;
    let stat = fs.statfs()?;
    log::info!(
        "path={} blocks={} free={} inodes={}",
        path.display(),
        stat.blocks,
        stat.blocks_free,
        stat.inodes
    );

    Ok(())
}
