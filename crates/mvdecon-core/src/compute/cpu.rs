use ndarray::{ArrayD, ArrayViewD};

use crate::error::Result;
use crate::extend::OutOfBounds;
use crate::fourier::{ConvolutionMode, FourierConvolver};

use super::{BlockComputeWorker, BlockKernel, DevicePreference};

/// CPU worker using the Fourier engine, parallelized with Rayon.
pub struct CpuWorker {
    convolver: FourierConvolver,
}

impl CpuWorker {
    /// `padding` extends block buffers into the FFT working extent.
    pub fn new(padding: OutOfBounds) -> Self {
        Self {
            convolver: FourierConvolver::new(padding),
        }
    }

    pub fn convolver(&self) -> &FourierConvolver {
        &self.convolver
    }
}

impl Default for CpuWorker {
    fn default() -> Self {
        Self::new(OutOfBounds::default())
    }
}

impl BlockComputeWorker for CpuWorker {
    fn name(&self) -> &str {
        "CPU/FFT"
    }

    fn device(&self) -> DevicePreference {
        DevicePreference::Cpu
    }

    fn prepare(&self, kernel: &ArrayViewD<'_, f32>, block_extent: &[usize]) -> Result<BlockKernel> {
        let transform = self.convolver.prepare_kernel(kernel, block_extent)?;
        Ok(BlockKernel::new(kernel.to_owned(), transform))
    }

    fn convolve_block(
        &self,
        block: &ArrayViewD<'_, f32>,
        kernel: &BlockKernel,
    ) -> Result<ArrayD<f32>> {
        self.convolver
            .convolve_prepared(block, kernel.transform(), ConvolutionMode::Convolution)
    }
}
