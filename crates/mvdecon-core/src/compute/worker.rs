use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::extend::OutOfBounds;
use crate::fourier::KernelTransform;

use super::cpu::CpuWorker;

/// Which device convolves blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePreference {
    /// Use an accelerator if one is available, otherwise the CPU.
    #[default]
    Auto,
    Cpu,
    /// A specific accelerator by index.
    Device(usize),
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Cpu => write!(f, "CPU"),
            Self::Device(i) => write!(f, "Device {i}"),
        }
    }
}

/// Kernel handed to a worker: the spatial kernel plus its transform,
/// prepared for one block extent. Workers use whichever form they need.
#[derive(Clone, Debug)]
pub struct BlockKernel {
    spatial: ArrayD<f32>,
    transform: KernelTransform,
}

impl BlockKernel {
    pub fn new(spatial: ArrayD<f32>, transform: KernelTransform) -> Self {
        Self { spatial, transform }
    }

    pub fn spatial(&self) -> &ArrayD<f32> {
        &self.spatial
    }

    pub fn transform(&self) -> &KernelTransform {
        &self.transform
    }

    /// Block extent this kernel was prepared for.
    pub fn block_extent(&self) -> &[usize] {
        self.transform.image_extent()
    }
}

/// Convolves block buffers with a kernel.
///
/// The block, partitioner and scheduler layers only move data in and out of
/// the buffers they hand to a worker, so a device implementation (taking a
/// flat buffer, the kernel and its device index) can replace the CPU path
/// without changing them.
pub trait BlockComputeWorker: Send + Sync {
    /// Human-readable name (e.g. "CPU/FFT").
    fn name(&self) -> &str;

    /// Device this worker runs on.
    fn device(&self) -> DevicePreference;

    /// Prepare `kernel` for blocks of `block_extent`.
    fn prepare(&self, kernel: &ArrayViewD<'_, f32>, block_extent: &[usize]) -> Result<BlockKernel>;

    /// Convolve one block buffer; the result has the block's extent.
    fn convolve_block(
        &self,
        block: &ArrayViewD<'_, f32>,
        kernel: &BlockKernel,
    ) -> Result<ArrayD<f32>>;
}

/// Create a worker for the requested device. Accelerator requests fall back
/// to the CPU worker when no device implementation is available.
pub fn create_worker(
    preference: DevicePreference,
    padding: OutOfBounds,
) -> Arc<dyn BlockComputeWorker> {
    match preference {
        DevicePreference::Cpu | DevicePreference::Auto => Arc::new(CpuWorker::new(padding)),
        DevicePreference::Device(index) => {
            warn!(device = index, "No device worker available, falling back to CPU");
            Arc::new(CpuWorker::new(padding))
        }
    }
}
