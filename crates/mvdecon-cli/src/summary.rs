use std::time::Duration;

use console::Style;
use mvdecon_core::block::{distinct_block_sizes, Block, BlockPartitioner, Schedule};
use mvdecon_core::config::DeconConfig;
use mvdecon_core::psf::kernel::kernel_sum;
use mvdecon_core::views::DeconViews;

/// Blocks listed before the listing is cut short (unless `--all`).
const BLOCK_PREVIEW: usize = 8;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    warning: Style,
    good: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            warning: Style::new().yellow(),
            good: Style::new().green().bold(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(title.chars().count())));
    println!();
}

fn print_schedule(s: &Styles, schedule: &Schedule) {
    println!("  {}", s.header.apply_to("Schedule"));
    if schedule.is_parallel() {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Mode"),
            s.method.apply_to("parallel batches")
        );
    } else {
        println!(
            "    {:<14}{}",
            s.label.apply_to("Mode"),
            s.warning.apply_to("serial (blocks overlap within a batch)")
        );
    }
    for (i, batch) in schedule.batches().iter().enumerate() {
        println!(
            "    {:<14}{}",
            s.label.apply_to(format!("Batch {i}")),
            s.value.apply_to(format!("{} blocks", batch.len()))
        );
    }
    println!();
}

pub fn print_partition_summary(
    image: &[usize],
    kernel: &[usize],
    partitioner: &BlockPartitioner,
    blocks: &[Block],
    schedule: &Schedule,
    show_all: bool,
) {
    let s = Styles::new();
    print_title(&s, "Block Partition");

    println!(
        "  {:<16}{}",
        s.label.apply_to("Image"),
        s.value.apply_to(format!("{image:?}"))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Kernel"),
        s.value.apply_to(format!("{kernel:?}"))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Strategy"),
        s.method.apply_to(partitioner)
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Blocks"),
        s.value.apply_to(blocks.len())
    );
    let sizes = distinct_block_sizes(blocks);
    println!(
        "  {:<16}{}",
        s.label.apply_to("Block extents"),
        s.value.apply_to(format!("{sizes:?}"))
    );
    println!();

    println!("  {}", s.header.apply_to("Blocks"));
    let shown = if show_all { blocks.len() } else { BLOCK_PREVIEW };
    for (i, block) in blocks.iter().enumerate().take(shown) {
        println!(
            "    {:>4}  grid {:<12} offset {:<18} size {:<18} effective {:?} @ {:?}",
            s.label.apply_to(i),
            format!("{:?}", block.grid_index()),
            format!("{:?}", block.offset()),
            format!("{:?}", block.block_size()),
            block.effective_size(),
            block.effective_offset(),
        );
    }
    if blocks.len() > shown {
        println!(
            "    {}",
            s.label
                .apply_to(format!("... {} more (use --all)", blocks.len() - shown))
        );
    }
    println!();

    print_schedule(&s, schedule);
}

pub fn print_views_summary(views: &DeconViews) {
    let s = Styles::new();
    print_title(&s, "Compound Kernels");

    print_config(&s, views.config(), views.pool().threads(), views.worker().name());
    println!(
        "  {:<16}{}",
        s.label.apply_to("Volume"),
        s.value.apply_to(format!("{:?}", views.dimensions()))
    );
    println!();

    for (i, view) in views.views().iter().enumerate() {
        println!("  {}", s.header.apply_to(format!("View {i}")));
        let psf = view.psf();
        println!(
            "    {:<14}{}",
            s.label.apply_to("Kernel"),
            s.value.apply_to(format!(
                "{:?} (peak {:.4})",
                psf.kernel_extent(),
                peak(psf.kernel1().iter())
            ))
        );
        match psf.kernel2() {
            Ok(kernel2) => println!(
                "    {:<14}{}",
                s.label.apply_to("Compound"),
                s.value.apply_to(format!(
                    "{:?} (sum {:.6}, peak {:.4})",
                    kernel2.shape(),
                    kernel_sum(&kernel2.view()),
                    peak(kernel2.iter())
                ))
            ),
            Err(e) => println!(
                "    {:<14}{}",
                s.label.apply_to("Compound"),
                s.warning.apply_to(e)
            ),
        }
        if let (Ok(blocks), Ok(schedule)) = (view.blocks(), view.schedule()) {
            println!(
                "    {:<14}{}",
                s.label.apply_to("Blocks"),
                s.value.apply_to(format!(
                    "{} in {} batch(es), {} extent(s)",
                    blocks.len(),
                    schedule.batches().len(),
                    distinct_block_sizes(blocks).len()
                ))
            );
        }
        println!();
    }
}

pub struct ConvolutionReport {
    pub image: Vec<usize>,
    pub beads: usize,
    pub kernel: Vec<usize>,
    pub blocks: usize,
    pub batches: usize,
    pub parallel: bool,
    pub initialize: Duration,
    pub tiled: Duration,
    pub whole: Duration,
    pub max_deviation: f32,
}

pub fn print_convolution_summary(
    config: &DeconConfig,
    threads: usize,
    worker: &str,
    report: &ConvolutionReport,
) {
    let s = Styles::new();
    print_title(&s, "Tiled Convolution");

    print_config(&s, config, threads, worker);
    println!(
        "  {:<16}{}",
        s.label.apply_to("Volume"),
        s.value.apply_to(format!("{:?}, {} beads", report.image, report.beads))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Kernel"),
        s.value.apply_to(format!("{:?}", report.kernel))
    );
    let mode = if report.parallel { "parallel" } else { "serial" };
    println!(
        "  {:<16}{}",
        s.label.apply_to("Blocks"),
        s.value.apply_to(format!(
            "{} in {} batch(es), {mode}",
            report.blocks, report.batches
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Timings"));
    for (label, d) in [
        ("Initialize", report.initialize),
        ("Tiled", report.tiled),
        ("Whole volume", report.whole),
    ] {
        println!(
            "    {:<14}{}",
            s.label.apply_to(label),
            s.value.apply_to(format!("{:.1} ms", d.as_secs_f64() * 1000.0))
        );
    }
    println!();

    let deviation = format!("{:.3e}", report.max_deviation);
    let styled = if report.max_deviation < 1e-3 {
        s.good.apply_to(deviation)
    } else {
        s.warning.apply_to(deviation)
    };
    println!("  {:<16}{}", s.label.apply_to("Max deviation"), styled);
    println!();
}

fn print_config(s: &Styles, config: &DeconConfig, threads: usize, worker: &str) {
    println!(
        "  {:<16}{}",
        s.label.apply_to("Worker"),
        s.method.apply_to(format!("{worker} ({threads} threads)"))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("PSF type"),
        s.method.apply_to(config.psf_type)
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Strategy"),
        s.method.apply_to(&config.partitioner)
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Extension"),
        s.value.apply_to(config.source_extension)
    );
}

fn peak<'a>(values: impl Iterator<Item = &'a f32>) -> f32 {
    values.copied().fold(0.0, f32::max)
}
