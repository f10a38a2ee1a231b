use ndarray::{ArrayD, ArrayViewMutD};
use rayon::prelude::*;

use crate::block::{Block, Schedule};
use crate::compute::{BlockComputeWorker, BlockKernel};
use crate::error::{DeconError, Result};
use crate::extend::ExtendedView;
use crate::pool::WorkerPool;
use crate::psf::KernelCache;

/// Progress callbacks for tiled convolution.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// Processing of `total_blocks` blocks has started.
    fn begin(&self, _total_blocks: usize) {}

    /// `blocks_done` blocks have been pasted so far.
    fn advance(&self, _blocks_done: usize) {}

    /// A batch has completed; the next one may start.
    fn batch_done(&self, _batch: usize) {}

    fn finish(&self) {}
}

/// Reporter that ignores every callback.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Everything a tiled convolution needs besides the data.
pub struct TiledContext<'a> {
    pub blocks: &'a [Block],
    pub schedule: &'a Schedule,
    pub kernels: &'a KernelCache,
    pub worker: &'a dyn BlockComputeWorker,
    pub pool: &'a WorkerPool,
}

/// Convolve `source` block by block into `output`.
///
/// Batches run in schedule order with a barrier in between. Inside a
/// parallel batch, blocks are copied and convolved concurrently (at most one
/// block per worker thread in flight) and then pasted; a serial schedule
/// handles copy, convolve and paste one block at a time.
pub fn tiled_convolve(
    source: &ExtendedView<'_>,
    output: &mut ArrayViewMutD<'_, f32>,
    ctx: &TiledContext<'_>,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    if source.shape() != output.shape() {
        return Err(DeconError::ExtentMismatch {
            expected: source.shape().to_vec(),
            actual: output.shape().to_vec(),
        });
    }
    reporter.begin(ctx.blocks.len());
    let mut done = 0usize;

    for (batch_index, batch) in ctx.schedule.batches().iter().enumerate() {
        if ctx.schedule.is_parallel() {
            for group in batch.chunks(ctx.pool.threads().max(1)) {
                let results: Vec<Result<ArrayD<f32>>> = ctx.pool.run("block convolve", || {
                    group
                        .par_iter()
                        .map(|&i| convolve_one(source, &ctx.blocks[i], ctx))
                        .collect()
                })?;
                for (&i, result) in group.iter().zip(results) {
                    ctx.blocks[i].paste(&result?.view(), output, ctx.pool)?;
                    done += 1;
                    reporter.advance(done);
                }
            }
        } else {
            for &i in batch {
                let result = convolve_one(source, &ctx.blocks[i], ctx)?;
                ctx.blocks[i].paste(&result.view(), output, ctx.pool)?;
                done += 1;
                reporter.advance(done);
            }
        }
        reporter.batch_done(batch_index);
    }

    reporter.finish();
    Ok(())
}

fn convolve_one(
    source: &ExtendedView<'_>,
    block: &Block,
    ctx: &TiledContext<'_>,
) -> Result<ArrayD<f32>> {
    let kernel = block_kernel(ctx.kernels, block)?;
    let buffer = block.copy_new(source, ctx.pool)?;
    ctx.worker.convolve_block(&buffer.view(), kernel)
}

fn block_kernel<'a>(kernels: &'a KernelCache, block: &Block) -> Result<&'a BlockKernel> {
    kernels
        .get(block.block_size())
        .ok_or_else(|| DeconError::ExtentMismatch {
            expected: kernels.keys().next().cloned().unwrap_or_default(),
            actual: block.block_size().to_vec(),
        })
}
