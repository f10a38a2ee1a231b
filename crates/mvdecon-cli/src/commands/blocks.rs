use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use mvdecon_core::block::schedule;

use super::{load_config, parse_extent, PartitionArgs};
use crate::summary::print_partition_summary;

#[derive(Args)]
pub struct BlocksArgs {
    /// Volume extent, e.g. "1025x1024x117"
    #[arg(long, default_value = "1025x1024x117")]
    pub image: String,

    /// Kernel extent, e.g. "17x17x5"
    #[arg(long, default_value = "17x17x5")]
    pub kernel: String,

    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Config file (TOML) providing the strategy when none is given
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List every block
    #[arg(long)]
    pub all: bool,
}

pub fn run(args: &BlocksArgs) -> Result<()> {
    let image = parse_extent(&args.image).context("Invalid --image")?;
    let kernel = parse_extent(&args.kernel).context("Invalid --kernel")?;
    let config = load_config(args.config.as_deref())?;
    let partitioner = args.partition.partitioner()?.unwrap_or(config.partitioner);

    let blocks = partitioner
        .partition(&image, &kernel)
        .with_context(|| format!("Cannot partition {image:?} for kernel {kernel:?}"))?;
    let schedule = schedule(&blocks);

    print_partition_summary(&image, &kernel, &partitioner, &blocks, &schedule, args.all);
    Ok(())
}
