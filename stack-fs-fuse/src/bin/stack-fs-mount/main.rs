mod cli;

use std::sync::Arc;

use anyhow::Context;
use block_dev::{BlockDevice, MemoryDisk};
use clap::Parser;
use fuser::MountOption;
use stack_fs::{MountOptions, StackFileSystem};
use stack_fs_fuse::cli::current_owner;
use stack_fs_fuse::{BlockFile, FuseAdapter};

use self::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.verbosity.init_logger();

    if cli.parallel {
        log::warn!("--parallel has no effect, requests are served one at a time");
    }

    let dev: Arc<dyn BlockDevice> = match &cli.disk_file {
        Some(path) => {
            cli.geometry.check_existing()?;
            let dev = BlockFile::open(path, cli.geometry.block_size)
                .with_context(|| format!("opening {}", path.display()))?;
            Arc::new(dev)
        }
        None => {
            let (uid, gid) = current_owner();
            let (block_count, options) = cli.geometry.format_options(uid, gid)?;
            let dev = Arc::new(MemoryDisk::new(cli.geometry.block_size, block_count));
            StackFileSystem::format(dev.clone(), options).context("formatting memory disk")?;
            dev
        }
    };

    let options = MountOptions {
        atime: cli.atime.into(),
    };
    let fs = StackFileSystem::open(dev, options).context("opening filesystem")?;
    let stat = fs.statfs()?;
    log::info!(
        "mountpoint={} blocks={} free={} inodes={} free_inodes={}",
        cli.mountpoint.display(),
        stat.blocks,
        stat.blocks_free,
        stat.inodes,
        stat.inodes_free
    );

    let mount_options = [
        MountOption::RW,
        MountOption::FSName("stack-fs".to_owned()),
        MountOption::DefaultPermissions,
    ];
    fuser::mount2(FuseAdapter::new(fs), &cli.mountpoint, &mount_options)
        .with_context(|| format!("mounting on {}", cli.mountpoint.display()))?;

    Ok(())
}
