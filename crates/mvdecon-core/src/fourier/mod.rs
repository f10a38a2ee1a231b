//! Linear convolution via the Fourier convolution theorem.
//!
//! Both operands are padded into a common working extent of at least
//! `image + kernel - 1` per dimension (rounded up to a size rustfft handles
//! quickly), so the circular convolution computed in the transform domain
//! equals the linear one over the image interval. The image is centred in
//! the working extent with padding values drawn from an [`OutOfBounds`]
//! policy; the kernel is zero padded with its centre (`extent / 2`) moved to
//! the origin. The result is cropped back to the image interval.

pub mod fft;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice, Zip};
use num_complex::Complex32;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::MAX_DIMENSIONS;
use crate::error::{DeconError, Result};
use crate::extend::{ExtendedView, OutOfBounds};

pub use fft::{fft_nd, next_fast_len, FftPlans};

/// Whether the kernel spectrum is used as is or conjugated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvolutionMode {
    #[default]
    Convolution,
    /// Multiply by the conjugate kernel spectrum. For kernels of odd extent
    /// this equals convolving with the mirrored kernel.
    Correlation,
}

/// Working extent for convolving an image of `image` extent with a kernel
/// of `kernel` extent.
pub fn working_extent(image: &[usize], kernel: &[usize]) -> Vec<usize> {
    image
        .iter()
        .zip(kernel)
        .map(|(&i, &k)| next_fast_len(i + k - 1))
        .collect()
}

/// Spectrum of a kernel padded for one particular image extent.
#[derive(Clone, Debug)]
pub struct KernelTransform {
    spectrum: ArrayD<Complex32>,
    image_extent: Vec<usize>,
    kernel_extent: Vec<usize>,
}

impl KernelTransform {
    pub fn image_extent(&self) -> &[usize] {
        &self.image_extent
    }

    pub fn kernel_extent(&self) -> &[usize] {
        &self.kernel_extent
    }

    pub fn working_extent(&self) -> &[usize] {
        self.spectrum.shape()
    }

    pub fn spectrum(&self) -> &ArrayD<Complex32> {
        &self.spectrum
    }
}

/// Fourier convolution engine. Holds the FFT plan cache and the padding
/// policy used to extend images into the working extent.
pub struct FourierConvolver {
    plans: FftPlans,
    padding: OutOfBounds,
}

impl Default for FourierConvolver {
    fn default() -> Self {
        Self::new(OutOfBounds::default())
    }
}

impl FourierConvolver {
    pub fn new(padding: OutOfBounds) -> Self {
        Self {
            plans: FftPlans::new(),
            padding,
        }
    }

    pub fn padding(&self) -> OutOfBounds {
        self.padding
    }

    /// Transform `kernel` for convolving images of `image_extent`.
    pub fn prepare_kernel(
        &self,
        kernel: &ArrayViewD<'_, f32>,
        image_extent: &[usize],
    ) -> Result<KernelTransform> {
        check_operands(image_extent, kernel.shape())?;
        let working = working_extent(image_extent, kernel.shape());

        let mut padded = ArrayD::<Complex32>::zeros(IxDyn(&working));
        let mut target = vec![0usize; working.len()];
        for (idx, &v) in kernel.indexed_iter() {
            for d in 0..working.len() {
                let centre = kernel.shape()[d] / 2;
                target[d] = (idx[d] + working[d] - centre) % working[d];
            }
            padded[target.as_slice()] = Complex32::new(v, 0.0);
        }
        fft_nd(&mut padded, &self.plans, false);

        Ok(KernelTransform {
            spectrum: padded,
            image_extent: image_extent.to_vec(),
            kernel_extent: kernel.shape().to_vec(),
        })
    }

    /// Centre `image` in `working` and transform it.
    pub fn transform_image(
        &self,
        image: &ArrayViewD<'_, f32>,
        working: &[usize],
    ) -> Result<ArrayD<Complex32>> {
        if working.len() != image.ndim() || working.iter().zip(image.shape()).any(|(w, i)| w < i) {
            return Err(DeconError::ExtentMismatch {
                expected: working.to_vec(),
                actual: image.shape().to_vec(),
            });
        }
        let before = pad_before(image.shape(), working);

        let mut padded = ArrayD::<Complex32>::zeros(IxDyn(working));
        if self.padding == OutOfBounds::Zero {
            let mut inner = padded.slice_each_axis_mut(|ax| {
                let d = ax.axis.index();
                Slice::from(before[d]..before[d] + image.shape()[d])
            });
            Zip::from(&mut inner)
                .and(image)
                .par_for_each(|c, &v| *c = Complex32::new(v, 0.0));
        } else {
            let extended = ExtendedView::new(image.view(), self.padding);
            let n = before.len();
            padded
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(|(i, mut plane)| {
                    let mut pos = [0isize; MAX_DIMENSIONS];
                    pos[0] = i as isize - before[0] as isize;
                    for (idx, c) in plane.indexed_iter_mut() {
                        for d in 1..n {
                            pos[d] = idx[d - 1] as isize - before[d] as isize;
                        }
                        *c = Complex32::new(extended.get(&pos[..n]), 0.0);
                    }
                });
        }
        fft_nd(&mut padded, &self.plans, false);
        Ok(padded)
    }

    /// Convolve `image` with a kernel prepared for the image's extent.
    pub fn convolve_prepared(
        &self,
        image: &ArrayViewD<'_, f32>,
        kernel: &KernelTransform,
        mode: ConvolutionMode,
    ) -> Result<ArrayD<f32>> {
        if image.shape() != kernel.image_extent() {
            return Err(DeconError::ExtentMismatch {
                expected: kernel.image_extent.clone(),
                actual: image.shape().to_vec(),
            });
        }
        let spectrum = self.transform_image(image, kernel.working_extent())?;
        Ok(self.multiply_and_invert(spectrum, &kernel.spectrum, mode, image.shape()))
    }

    /// One-shot convolution; the output has the extent of `image`.
    pub fn convolve(
        &self,
        image: &ArrayViewD<'_, f32>,
        kernel: &ArrayViewD<'_, f32>,
        mode: ConvolutionMode,
    ) -> Result<ArrayD<f32>> {
        let prepared = self.prepare_kernel(kernel, image.shape())?;
        self.convolve_prepared(image, &prepared, mode)
    }

    /// Multiply two spectra of the same working extent, invert, and crop to
    /// `image_extent` centred the way [`Self::transform_image`] placed it.
    pub(crate) fn multiply_and_invert(
        &self,
        mut image_spectrum: ArrayD<Complex32>,
        kernel_spectrum: &ArrayD<Complex32>,
        mode: ConvolutionMode,
        image_extent: &[usize],
    ) -> ArrayD<f32> {
        let conjugate = mode == ConvolutionMode::Correlation;
        Zip::from(&mut image_spectrum)
            .and(kernel_spectrum)
            .par_for_each(|a, &b| *a *= if conjugate { b.conj() } else { b });

        fft_nd(&mut image_spectrum, &self.plans, true);

        let working = image_spectrum.shape().to_vec();
        let scale = 1.0 / working.iter().product::<usize>() as f32;
        let before = pad_before(image_extent, &working);
        image_spectrum
            .slice_each_axis(|ax| {
                let d = ax.axis.index();
                Slice::from(before[d]..before[d] + image_extent[d])
            })
            .mapv(|c| c.re * scale)
    }
}

/// One-shot convolution with mirror padding.
pub fn convolve(
    image: &ArrayViewD<'_, f32>,
    kernel: &ArrayViewD<'_, f32>,
    mode: ConvolutionMode,
) -> Result<ArrayD<f32>> {
    FourierConvolver::default().convolve(image, kernel, mode)
}

fn pad_before(image: &[usize], working: &[usize]) -> Vec<usize> {
    image.iter().zip(working).map(|(&i, &w)| (w - i) / 2).collect()
}

fn check_operands(image: &[usize], kernel: &[usize]) -> Result<()> {
    let n = image.len();
    if n == 0 || n > MAX_DIMENSIONS {
        return Err(DeconError::UnsupportedDimensionality(n));
    }
    if kernel.len() != n {
        return Err(DeconError::ExtentMismatch {
            expected: image.to_vec(),
            actual: kernel.to_vec(),
        });
    }
    if image.iter().chain(kernel).any(|&s| s == 0) {
        return Err(DeconError::InvalidKernel(format!(
            "empty operand (image {image:?}, kernel {kernel:?})"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stateful convolution with opt-in transform reuse
// ---------------------------------------------------------------------------

/// Convolution of a changing image and kernel that can keep either
/// operand's transform between calls.
///
/// Setting an operand drops its cached transform. A cached transform is
/// also dropped when the other operand changes extent.
pub struct FftConvolution<'e> {
    engine: &'e FourierConvolver,
    image: Option<ArrayD<f32>>,
    kernel: Option<ArrayD<f32>>,
    mode: ConvolutionMode,
    keep_image_fft: bool,
    keep_kernel_fft: bool,
    image_fft: Option<ArrayD<Complex32>>,
    kernel_fft: Option<KernelTransform>,
}

impl<'e> FftConvolution<'e> {
    pub fn new(engine: &'e FourierConvolver) -> Self {
        Self {
            engine,
            image: None,
            kernel: None,
            mode: ConvolutionMode::Convolution,
            keep_image_fft: false,
            keep_kernel_fft: false,
            image_fft: None,
            kernel_fft: None,
        }
    }

    pub fn set_image(&mut self, image: ArrayD<f32>) {
        self.image = Some(image);
        self.image_fft = None;
    }

    pub fn set_kernel(&mut self, kernel: ArrayD<f32>) {
        self.kernel = Some(kernel);
        self.kernel_fft = None;
    }

    pub fn set_mode(&mut self, mode: ConvolutionMode) {
        self.mode = mode;
    }

    pub fn set_keep_image_fft(&mut self, keep: bool) {
        self.keep_image_fft = keep;
        if !keep {
            self.image_fft = None;
        }
    }

    pub fn set_keep_kernel_fft(&mut self, keep: bool) {
        self.keep_kernel_fft = keep;
        if !keep {
            self.kernel_fft = None;
        }
    }

    pub fn has_image_fft(&self) -> bool {
        self.image_fft.is_some()
    }

    pub fn has_kernel_fft(&self) -> bool {
        self.kernel_fft.is_some()
    }

    /// Convolve the current image with the current kernel.
    pub fn convolve(&mut self) -> Result<ArrayD<f32>> {
        let (Some(image), Some(kernel)) = (self.image.as_ref(), self.kernel.as_ref()) else {
            return Err(DeconError::Config(
                "image and kernel must be set before convolving".to_string(),
            ));
        };

        let kernel_fft = match self.kernel_fft.take() {
            Some(k) if k.image_extent() == image.shape() => k,
            _ => self.engine.prepare_kernel(&kernel.view(), image.shape())?,
        };
        let working = kernel_fft.working_extent().to_vec();

        let image_fft = match self.image_fft.take() {
            Some(f) if f.shape() == working.as_slice() => f,
            _ => self.engine.transform_image(&image.view(), &working)?,
        };

        let spectrum = if self.keep_image_fft {
            let copy = image_fft.clone();
            self.image_fft = Some(image_fft);
            copy
        } else {
            image_fft
        };
        let result = self
            .engine
            .multiply_and_invert(spectrum, kernel_fft.spectrum(), self.mode, image.shape());

        if self.keep_kernel_fft {
            self.kernel_fft = Some(kernel_fft);
        }
        Ok(result)
    }
}
