//! Multi-view sets: per-view images, weights and PSFs with their block
//! layouts.
//!
//! A [`DeconViews`] is built in two phases. [`DeconViews::new`] validates the
//! inputs; [`DeconViews::initialize`] then computes every compound kernel
//! (which needs all sibling PSFs), partitions each view's volume for its
//! kernel and prepares kernel transforms for every block extent. Anything
//! derived in the second phase reports [`DeconError::NotInitialized`] until
//! it has run.

pub mod tiled;

use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::block::{distinct_block_sizes, schedule, Block, Schedule};
use crate::compute::{create_worker, BlockComputeWorker};
use crate::config::DeconConfig;
use crate::consts::MAX_DIMENSIONS;
use crate::error::{DeconError, Result};
use crate::extend::{ExtendedView, OutOfBounds};
use crate::fourier::FourierConvolver;
use crate::pool::WorkerPool;
use crate::psf::{compound_kernel, KernelCache, ViewPsf};

pub use tiled::{tiled_convolve, NoOpReporter, ProgressReporter, TiledContext};

/// Input for one view.
#[derive(Clone, Debug)]
pub struct ViewData {
    pub image: ArrayD<f32>,
    pub weight: ArrayD<f32>,
    pub kernel: ArrayD<f32>,
}

impl ViewData {
    pub fn new(image: ArrayD<f32>, weight: ArrayD<f32>, kernel: ArrayD<f32>) -> Self {
        Self {
            image,
            weight,
            kernel,
        }
    }

    /// View with a uniform weight of 1.
    pub fn unweighted(image: ArrayD<f32>, kernel: ArrayD<f32>) -> Self {
        let weight = ArrayD::ones(image.raw_dim());
        Self::new(image, weight, kernel)
    }
}

#[derive(Clone, Debug)]
enum Layout {
    Pending,
    Ready { blocks: Vec<Block>, schedule: Schedule },
}

/// One view of a [`DeconViews`] set.
pub struct DeconView {
    image: ArrayD<f32>,
    weight: ArrayD<f32>,
    psf: ViewPsf,
    layout: Layout,
    pool: Arc<WorkerPool>,
    worker: Arc<dyn BlockComputeWorker>,
    source_extension: OutOfBounds,
}

impl DeconView {
    pub fn image(&self) -> &ArrayD<f32> {
        &self.image
    }

    pub fn weight(&self) -> &ArrayD<f32> {
        &self.weight
    }

    pub fn psf(&self) -> &ViewPsf {
        &self.psf
    }

    pub fn blocks(&self) -> Result<&[Block]> {
        match &self.layout {
            Layout::Ready { blocks, .. } => Ok(blocks),
            Layout::Pending => Err(DeconError::NotInitialized),
        }
    }

    pub fn schedule(&self) -> Result<&Schedule> {
        match &self.layout {
            Layout::Ready { schedule, .. } => Ok(schedule),
            Layout::Pending => Err(DeconError::NotInitialized),
        }
    }

    /// Tiled convolution of `source` with this view's PSF.
    pub fn convolve1(
        &self,
        source: &ArrayViewD<'_, f32>,
        reporter: &dyn ProgressReporter,
    ) -> Result<ArrayD<f32>> {
        self.convolve_with(source, self.psf.transforms1()?, reporter)
    }

    /// Tiled convolution of `source` with this view's compound kernel.
    pub fn convolve2(
        &self,
        source: &ArrayViewD<'_, f32>,
        reporter: &dyn ProgressReporter,
    ) -> Result<ArrayD<f32>> {
        self.convolve_with(source, self.psf.transforms2()?, reporter)
    }

    fn convolve_with(
        &self,
        source: &ArrayViewD<'_, f32>,
        kernels: &KernelCache,
        reporter: &dyn ProgressReporter,
    ) -> Result<ArrayD<f32>> {
        if source.shape() != self.image.shape() {
            return Err(DeconError::ExtentMismatch {
                expected: self.image.shape().to_vec(),
                actual: source.shape().to_vec(),
            });
        }
        let ctx = TiledContext {
            blocks: self.blocks()?,
            schedule: self.schedule()?,
            kernels,
            worker: self.worker.as_ref(),
            pool: &self.pool,
        };
        let extended = ExtendedView::new(source.view(), self.source_extension);
        let mut output = ArrayD::<f32>::zeros(source.raw_dim());
        tiled_convolve(&extended, &mut output.view_mut(), &ctx, reporter)?;
        Ok(output)
    }
}

/// An ordered set of views sharing one volume extent, worker pool and
/// block compute worker.
pub struct DeconViews {
    views: Vec<DeconView>,
    dimensions: Vec<usize>,
    pool: Arc<WorkerPool>,
    worker: Arc<dyn BlockComputeWorker>,
    config: DeconConfig,
    initialized: bool,
}

impl DeconViews {
    /// Validate `views` and build the worker pool.
    ///
    /// Every image and weight must have the extent of the first image.
    pub fn new(views: Vec<ViewData>, config: &DeconConfig) -> Result<Self> {
        let Some(first) = views.first() else {
            return Err(DeconError::EmptyViewSet);
        };
        let dimensions = first.image.shape().to_vec();
        let n = dimensions.len();
        if n == 0 || n > MAX_DIMENSIONS {
            return Err(DeconError::UnsupportedDimensionality(n));
        }

        for (i, view) in views.iter().enumerate() {
            for shape in [view.image.shape(), view.weight.shape()] {
                if shape != dimensions.as_slice() {
                    return Err(DeconError::ViewShapeMismatch {
                        view: i,
                        expected: dimensions.clone(),
                        actual: shape.to_vec(),
                    });
                }
            }
            if view.kernel.ndim() != n {
                return Err(DeconError::ExtentMismatch {
                    expected: dimensions.clone(),
                    actual: view.kernel.shape().to_vec(),
                });
            }
        }

        let pool = Arc::new(WorkerPool::new(config.threads)?);
        let worker = create_worker(config.device, config.fft_padding);

        let views = views
            .into_iter()
            .map(|data| {
                Ok(DeconView {
                    image: data.image,
                    weight: data.weight,
                    psf: ViewPsf::new(data.kernel, config.psf_type)?,
                    layout: Layout::Pending,
                    pool: Arc::clone(&pool),
                    worker: Arc::clone(&worker),
                    source_extension: config.source_extension,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            views = views.len(),
            dimensions = ?dimensions,
            threads = pool.threads(),
            worker = worker.name(),
            "Created view set"
        );

        Ok(Self {
            views,
            dimensions,
            pool,
            worker,
            config: config.clone(),
            initialized: false,
        })
    }

    /// Replace the block compute worker used by every view.
    pub fn with_worker(mut self, worker: Arc<dyn BlockComputeWorker>) -> Self {
        for view in &mut self.views {
            view.worker = Arc::clone(&worker);
        }
        self.worker = worker;
        self
    }

    pub fn views(&self) -> &[DeconView] {
        &self.views
    }

    pub fn view(&self, index: usize) -> Option<&DeconView> {
        self.views.get(index)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn config(&self) -> &DeconConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn worker(&self) -> &dyn BlockComputeWorker {
        self.worker.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Compute compound kernels, block layouts and kernel transforms.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(DeconError::AlreadyInitialized);
        }

        let psf_type = self.config.psf_type;
        let convolver = FourierConvolver::new(OutOfBounds::Zero);
        let compound: Vec<ArrayD<f32>> = {
            let kernels: Vec<&ArrayD<f32>> = self.views.iter().map(|v| v.psf.kernel1()).collect();
            self.pool.run("compound kernels", || {
                (0..kernels.len())
                    .into_par_iter()
                    .map(|v| compound_kernel(v, &kernels, psf_type, &convolver))
                    .collect::<Result<Vec<_>>>()
            })??
        };

        // Views are only updated once every one of them has been prepared.
        let worker = self.worker.as_ref();
        let mut prepared = Vec::with_capacity(self.views.len());
        for (i, (view, kernel2)) in self.views.iter().zip(compound).enumerate() {
            let blocks = self
                .config
                .partitioner
                .partition(&self.dimensions, view.psf.kernel_extent())?;
            let schedule = schedule(&blocks);
            let extents = distinct_block_sizes(&blocks);

            let psf = &view.psf;
            let kernels = self.pool.run("kernel transforms", || {
                psf.prepare(kernel2, &extents, worker)
            })??;

            info!(
                view = i,
                kernel = ?view.psf.kernel_extent(),
                blocks = blocks.len(),
                block_extents = extents.len(),
                batches = schedule.batches().len(),
                parallel = schedule.is_parallel(),
                "Prepared view"
            );
            prepared.push((kernels, Layout::Ready { blocks, schedule }));
        }

        for (view, (kernels, layout)) in self.views.iter_mut().zip(prepared) {
            view.psf.install(kernels);
            view.layout = layout;
        }
        self.initialized = true;
        info!(
            views = self.views.len(),
            psf_type = %psf_type,
            partitioner = %self.config.partitioner,
            "View set initialized"
        );
        Ok(())
    }
}
