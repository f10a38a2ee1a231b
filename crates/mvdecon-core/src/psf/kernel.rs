use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::consts::{EPSILON, GAUSSIAN_TRUNCATION_SIGMAS, MAX_DIMENSIONS};
use crate::error::{DeconError, Result};

pub fn kernel_sum(kernel: &ArrayViewD<'_, f32>) -> f64 {
    kernel.iter().map(|&v| v as f64).sum()
}

/// Scale `kernel` in place so its values sum to 1.
pub fn normalize(kernel: &mut ArrayD<f32>) -> Result<()> {
    let sum = kernel_sum(&kernel.view());
    if !sum.is_finite() || sum.abs() <= EPSILON as f64 {
        return Err(DeconError::InvalidKernel(format!(
            "cannot normalize kernel with sum {sum}"
        )));
    }
    let inv = (1.0 / sum) as f32;
    kernel.mapv_inplace(|v| v * inv);
    Ok(())
}

pub fn normalized(mut kernel: ArrayD<f32>) -> Result<ArrayD<f32>> {
    normalize(&mut kernel)?;
    Ok(kernel)
}

/// Reverse the coordinates of `kernel` in every dimension.
pub fn mirror(kernel: &ArrayViewD<'_, f32>) -> ArrayD<f32> {
    let mut view = kernel.view();
    for axis in 0..view.ndim() {
        view.invert_axis(Axis(axis));
    }
    view.as_standard_layout().into_owned()
}

/// Check that `kernel` is usable as a point-spread function.
pub fn validate(kernel: &ArrayViewD<'_, f32>) -> Result<()> {
    let n = kernel.ndim();
    if n == 0 || n > MAX_DIMENSIONS {
        return Err(DeconError::UnsupportedDimensionality(n));
    }
    if kernel.is_empty() {
        return Err(DeconError::InvalidKernel("kernel is empty".to_string()));
    }
    if kernel.iter().any(|v| !v.is_finite()) {
        return Err(DeconError::InvalidKernel(
            "kernel contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Normalized Gaussian centred in an odd extent of `2 * ceil(3 sigma) + 1`
/// per dimension. One sigma per dimension.
pub fn gaussian_kernel(sigmas: &[f32]) -> Result<ArrayD<f32>> {
    if sigmas.is_empty() || sigmas.len() > MAX_DIMENSIONS {
        return Err(DeconError::UnsupportedDimensionality(sigmas.len()));
    }
    if sigmas.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
        return Err(DeconError::InvalidKernel(format!(
            "Gaussian sigmas must be positive, got {sigmas:?}"
        )));
    }
    let radii: Vec<usize> = sigmas
        .iter()
        .map(|&s| (GAUSSIAN_TRUNCATION_SIGMAS * s).ceil() as usize)
        .collect();
    let extent: Vec<usize> = radii.iter().map(|r| 2 * r + 1).collect();

    let kernel = ArrayD::from_shape_fn(IxDyn(&extent), |idx| {
        let mut exponent = 0.0f64;
        for d in 0..sigmas.len() {
            let x = idx[d] as f64 - radii[d] as f64;
            let s = sigmas[d] as f64;
            exponent += x * x / (2.0 * s * s);
        }
        (-exponent).exp() as f32
    });
    normalized(kernel)
}
