use indicatif::{ProgressBar, ProgressStyle};
use mvdecon_core::views::ProgressReporter;

/// Feeds tiled convolution progress into a terminal progress bar.
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new(label: &str) -> anyhow::Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:12} [{bar:40}] {pos}/{len} blocks")?
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        Ok(Self { bar })
    }
}

impl ProgressReporter for BarReporter {
    fn begin(&self, total_blocks: usize) {
        self.bar.set_length(total_blocks as u64);
        self.bar.set_position(0);
    }

    fn advance(&self, blocks_done: usize) {
        self.bar.set_position(blocks_done as u64);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}
