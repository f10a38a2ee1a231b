use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use mvdecon_core::consts::DEFAULT_PSF_SIGMA;
use mvdecon_core::fourier::{ConvolutionMode, FourierConvolver};
use mvdecon_core::psf::kernel::gaussian_kernel;
use mvdecon_core::views::{DeconViews, ViewData};
use ndarray::{ArrayD, IxDyn};
use tracing::info;

use super::{load_config, parse_extent, PartitionArgs};
use crate::progress::BarReporter;
use crate::summary::{print_convolution_summary, ConvolutionReport};

#[derive(Args)]
pub struct ConvolveArgs {
    /// Volume extent, e.g. "96x96x48"
    #[arg(long, default_value = "96x96x48")]
    pub image: String,

    /// Number of point sources in the synthetic volume
    #[arg(long, default_value = "200")]
    pub beads: usize,

    /// PSF standard deviation in voxels
    #[arg(long, default_value_t = DEFAULT_PSF_SIGMA)]
    pub sigma: f32,

    /// Seed for bead placement
    #[arg(long, default_value = "42")]
    pub seed: u64,

    #[command(flatten)]
    pub partition: PartitionArgs,

    /// Config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Worker threads
    #[arg(short, long)]
    pub threads: Option<usize>,
}

/// Zero volume with `beads` bright voxels at pseudo-random positions.
fn bead_volume(extent: &[usize], beads: usize, seed: u64) -> ArrayD<f32> {
    let mut volume = ArrayD::<f32>::zeros(IxDyn(extent));
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
    let mut next = || {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (state >> 33) as usize
    };
    let mut pos = vec![0usize; extent.len()];
    for _ in 0..beads {
        for (p, &n) in pos.iter_mut().zip(extent) {
            *p = next() % n;
        }
        let brightness = 0.5 + (next() % 1000) as f32 / 2000.0;
        volume[pos.as_slice()] = brightness;
    }
    volume
}

pub fn run(args: &ConvolveArgs) -> Result<()> {
    let extent = parse_extent(&args.image).context("Invalid --image")?;
    let mut config = load_config(args.config.as_deref())?;
    args.partition.apply(&mut config, args.config.is_some())?;
    if args.threads.is_some() {
        config.threads = args.threads;
    }

    let volume = bead_volume(&extent, args.beads, args.seed);
    let kernel = gaussian_kernel(&vec![args.sigma; extent.len()])?;

    let start = Instant::now();
    let mut views = DeconViews::new(vec![ViewData::unweighted(volume.clone(), kernel)], &config)
        .context("Invalid view set")?;
    views
        .initialize()
        .context("Failed to initialize the view set")?;
    let initialize = start.elapsed();

    let view = views.view(0).context("View set is empty")?;
    let reporter = BarReporter::new("Tiled")?;
    let start = Instant::now();
    let tiled = view.convolve1(&volume.view(), &reporter)?;
    let tiled_time = start.elapsed();

    let start = Instant::now();
    let whole = FourierConvolver::new(config.source_extension).convolve(
        &volume.view(),
        &view.psf().kernel1().view(),
        ConvolutionMode::Convolution,
    )?;
    let whole_time = start.elapsed();

    let max_deviation = tiled
        .iter()
        .zip(whole.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    info!(
        max_deviation,
        tiled_ms = tiled_time.as_millis() as u64,
        whole_ms = whole_time.as_millis() as u64,
        "Compared tiled and whole-volume convolution"
    );

    let schedule = view.schedule()?;
    let report = ConvolutionReport {
        image: extent,
        beads: args.beads,
        kernel: view.psf().kernel_extent().to_vec(),
        blocks: view.blocks()?.len(),
        batches: schedule.batches().len(),
        parallel: schedule.is_parallel(),
        initialize,
        tiled: tiled_time,
        whole: whole_time,
        max_deviation,
    };
    print_convolution_summary(
        views.config(),
        views.pool().threads(),
        views.worker().name(),
        &report,
    );
    Ok(())
}
