use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use mvdecon_core::consts::DEFAULT_PSF_SIGMA;
use mvdecon_core::psf::kernel::gaussian_kernel;
use mvdecon_core::views::{DeconViews, ViewData};
use ndarray::{ArrayD, IxDyn};

use super::{load_config, parse_extent, PartitionArgs, PsfTypeArg};
use crate::summary::print_views_summary;

#[derive(Args)]
pub struct CompoundArgs {
    /// Number of views
    #[arg(long, default_value = "4")]
    pub views: usize,

    /// Volume extent, e.g. "64x64x32"
    #[arg(long, default_value = "64x64x32")]
    pub image: String,

    /// Lateral PSF standard deviation in voxels
    #[arg(long, default_value_t = DEFAULT_PSF_SIGMA)]
    pub sigma: f32,

    /// Axial elongation factor of each view's PSF
    #[arg(long, default_value = "3.0")]
    pub elongation: f32,

    /// Compound kernel strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub psf_type: Option<PsfTypeArg>,

    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long)]
    pub threads: Option<usize>,
}

/// Synthetic PSFs elongated along a different axis for each view, the way
/// views acquired from different angles blur along different directions.
fn synthetic_psf(view: usize, ndim: usize, sigma: f32, elongation: f32) -> Result<ArrayD<f32>> {
    let mut sigmas = vec![sigma; ndim];
    sigmas[view % ndim] *= elongation;
    Ok(gaussian_kernel(&sigmas)?)
}

pub fn run(args: &CompoundArgs) -> Result<()> {
    if args.views == 0 {
        bail!("--views must be at least 1");
    }
    let image = parse_extent(&args.image).context("Invalid --image")?;

    let mut config = load_config(args.config.as_deref())?;
    args.partition.apply(&mut config, args.config.is_some())?;
    if let Some(psf_type) = args.psf_type {
        config.psf_type = psf_type.into();
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }

    let views = (0..args.views)
        .map(|v| {
            let kernel = synthetic_psf(v, image.len(), args.sigma, args.elongation)?;
            Ok(ViewData::unweighted(ArrayD::zeros(IxDyn(&image)), kernel))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut views = DeconViews::new(views, &config).context("Invalid view set")?;
    views
        .initialize()
        .context("Failed to initialize the view set")?;

    print_views_summary(&views);
    Ok(())
}
