#![allow(dead_code)]

use ndarray::{ArrayD, IxDyn};

use mvdecon_core::block::Block;
use mvdecon_core::extend::{ExtendedView, OutOfBounds};

/// Deterministic pseudo-random volume in `[0, 1)`.
pub fn noise_volume(shape: &[usize], seed: u64) -> ArrayD<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    ArrayD::from_shape_fn(IxDyn(shape), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 40) as f32) / (1u64 << 24) as f32
    })
}

/// Volume whose value is its flat index, so every voxel is distinct.
pub fn index_volume(shape: &[usize]) -> ArrayD<f32> {
    let mut i = 0.0f32;
    ArrayD::from_shape_fn(IxDyn(shape), |_| {
        i += 1.0;
        i
    })
}

/// Single 1 at the centre (`extent / 2`) of a zero kernel.
pub fn delta_kernel(shape: &[usize]) -> ArrayD<f32> {
    let mut kernel = ArrayD::zeros(IxDyn(shape));
    let centre: Vec<usize> = shape.iter().map(|s| s / 2).collect();
    kernel[centre.as_slice()] = 1.0;
    kernel
}

/// Reference spatial-domain convolution with the kernel centred at
/// `extent / 2`. Reads outside the image follow `policy`.
pub fn direct_convolve(
    image: &ArrayD<f32>,
    kernel: &ArrayD<f32>,
    policy: OutOfBounds,
) -> ArrayD<f32> {
    let source = ExtendedView::new(image.view(), policy);
    let n = image.ndim();
    let centre: Vec<isize> = kernel.shape().iter().map(|&k| (k / 2) as isize).collect();
    let mut out = ArrayD::zeros(image.raw_dim());
    let mut pos = vec![0isize; n];
    for (p, v) in out.indexed_iter_mut() {
        let mut acc = 0.0f64;
        for (j, &k) in kernel.indexed_iter() {
            for d in 0..n {
                pos[d] = p[d] as isize + centre[d] - j[d] as isize;
            }
            acc += k as f64 * source.get(&pos) as f64;
        }
        *v = acc as f32;
    }
    out
}

pub fn max_abs_diff(a: &ArrayD<f32>, b: &ArrayD<f32>) -> f32 {
    assert_eq!(a.shape(), b.shape(), "shape mismatch");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, f32::max)
}

/// How many blocks cover each voxel with their effective region.
pub fn effective_coverage(blocks: &[Block], extent: &[usize]) -> ArrayD<u32> {
    let mut count = ArrayD::<u32>::zeros(IxDyn(extent));
    for block in blocks {
        let mut region = count.slice_each_axis_mut(|ax| {
            let d = ax.axis.index();
            let lo = block.effective_offset()[d];
            ndarray::Slice::from(lo..lo + block.effective_size()[d])
        });
        region.mapv_inplace(|c| c + 1);
    }
    count
}
