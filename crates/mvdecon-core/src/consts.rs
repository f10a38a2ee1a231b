/// Highest dimensionality handled by the block and Fourier machinery.
pub const MAX_DIMENSIONS: usize = 3;

/// Copy/paste split their iteration domain into this many tasks per worker
/// thread, so a slow slab does not leave the rest of the pool idle.
pub const TASKS_PER_THREAD: usize = 2;

/// Minimum voxel count to transform FFT lanes in parallel.
pub const PARALLEL_VOXEL_THRESHOLD: usize = 32_768;

/// Prime factors for which rustfft has fast butterflies. Working extents
/// are rounded up to a product of these.
pub const FAST_FFT_FACTORS: [usize; 4] = [2, 3, 5, 7];

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// Default fixed block extent per dimension.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Default standard deviation (in voxels) of synthetic Gaussian PSFs.
pub const DEFAULT_PSF_SIGMA: f32 = 1.5;

/// Synthetic Gaussian PSFs are truncated at this many sigmas from the centre.
pub const GAUSSIAN_TRUNCATION_SIGMAS: f32 = 3.0;
