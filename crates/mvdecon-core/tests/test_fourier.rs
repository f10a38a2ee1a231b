mod common;

use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn};

use mvdecon_core::error::DeconError;
use mvdecon_core::extend::OutOfBounds;
use mvdecon_core::fourier::{
    convolve, next_fast_len, working_extent, ConvolutionMode, FftConvolution, FourierConvolver,
};
use mvdecon_core::psf::kernel::mirror;

use common::{delta_kernel, direct_convolve, max_abs_diff, noise_volume};

// ---------------------------------------------------------------------------
// Working extent
// ---------------------------------------------------------------------------

#[test]
fn test_next_fast_len() {
    assert_eq!(next_fast_len(0), 1);
    assert_eq!(next_fast_len(1), 1);
    assert_eq!(next_fast_len(7), 7);
    assert_eq!(next_fast_len(11), 12);
    assert_eq!(next_fast_len(13), 14);
    assert_eq!(next_fast_len(17), 18);
    assert_eq!(next_fast_len(97), 98);
    assert_eq!(next_fast_len(121), 125);
    assert_eq!(next_fast_len(1024), 1024);
}

#[test]
fn test_working_extent_covers_linear_convolution() {
    let working = working_extent(&[10, 31, 100], &[5, 17, 1]);
    assert_eq!(working, vec![14, 48, 100]);
}

#[test]
fn test_prepared_kernel_reports_extents() {
    let engine = FourierConvolver::default();
    let kernel = delta_kernel(&[5, 3]);
    let prepared = engine.prepare_kernel(&kernel.view(), &[20, 11]).unwrap();
    assert_eq!(prepared.image_extent(), &[20, 11]);
    assert_eq!(prepared.kernel_extent(), &[5, 3]);
    assert_eq!(prepared.working_extent(), &[24, 14]);
}

// ---------------------------------------------------------------------------
// Identity and reference convolution
// ---------------------------------------------------------------------------

#[test]
fn test_delta_kernel_is_identity() {
    let shapes: [(&[usize], &[usize]); 4] = [
        (&[33], &[7]),
        (&[16, 9], &[4, 3]),
        (&[12, 10, 8], &[3, 5, 3]),
        (&[6, 6, 6], &[1, 1, 1]),
    ];
    for (shape, kshape) in shapes {
        let image = noise_volume(shape, 3);
        let kernel = delta_kernel(kshape);
        let result = convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution).unwrap();
        assert_eq!(result.shape(), image.shape());
        let diff = max_abs_diff(&result, &image);
        assert!(diff < 1e-5, "identity failed for {shape:?} / {kshape:?}: {diff}");
    }
}

#[test]
fn test_matches_direct_convolution_zero_padding() {
    let engine = FourierConvolver::new(OutOfBounds::Zero);
    let image = noise_volume(&[19, 14], 11);
    let kernel = noise_volume(&[5, 3], 12);
    let result = engine
        .convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution)
        .unwrap();
    let expected = direct_convolve(&image, &kernel, OutOfBounds::Zero);
    assert_abs_diff_eq!(max_abs_diff(&result, &expected), 0.0, epsilon = 1e-4);
}

#[test]
fn test_matches_direct_convolution_mirror_padding_3d() {
    let engine = FourierConvolver::new(OutOfBounds::MirrorSingle);
    let image = noise_volume(&[9, 11, 7], 5);
    let kernel = noise_volume(&[3, 5, 3], 6);
    let result = engine
        .convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution)
        .unwrap();
    let expected = direct_convolve(&image, &kernel, OutOfBounds::MirrorSingle);
    assert_abs_diff_eq!(max_abs_diff(&result, &expected), 0.0, epsilon = 1e-4);
}

#[test]
fn test_matches_direct_convolution_padding_policies_1d_2d() {
    let policies = [
        OutOfBounds::Periodic,
        OutOfBounds::MirrorDouble,
        OutOfBounds::Value(0.5),
    ];
    for policy in policies {
        let engine = FourierConvolver::new(policy);
        for (image_shape, kernel_shape) in [(vec![13], vec![5]), (vec![10, 7], vec![3, 5])] {
            let image = noise_volume(&image_shape, 11);
            let kernel = noise_volume(&kernel_shape, 12);
            let result = engine
                .convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution)
                .unwrap();
            let expected = direct_convolve(&image, &kernel, policy);
            let diff = max_abs_diff(&result, &expected);
            assert!(diff < 1e-4, "{policy} {image_shape:?}: deviation {diff}");
        }
    }
}

#[test]
fn test_matches_direct_convolution_even_kernel() {
    let engine = FourierConvolver::new(OutOfBounds::Border);
    let image = noise_volume(&[25], 8);
    let kernel = noise_volume(&[6], 9);
    let result = engine
        .convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution)
        .unwrap();
    let expected = direct_convolve(&image, &kernel, OutOfBounds::Border);
    assert_abs_diff_eq!(max_abs_diff(&result, &expected), 0.0, epsilon = 1e-4);
}

#[test]
fn test_shifted_delta_shifts_image() {
    // A 1 one voxel right of centre moves content one voxel right.
    let engine = FourierConvolver::new(OutOfBounds::Zero);
    let image = ArrayD::from_shape_vec(IxDyn(&[6]), vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let kernel = ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.0f32, 0.0, 1.0]).unwrap();
    let result = engine
        .convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution)
        .unwrap();
    let expected = [0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0];
    for (got, want) in result.iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-5);
    }
}

// ---------------------------------------------------------------------------
// Correlation
// ---------------------------------------------------------------------------

#[test]
fn test_correlation_equals_convolution_with_mirrored_kernel() {
    let engine = FourierConvolver::new(OutOfBounds::MirrorSingle);
    let image = noise_volume(&[15, 12], 21);
    let kernel = noise_volume(&[5, 3], 22);
    let correlated = engine
        .convolve(&image.view(), &kernel.view(), ConvolutionMode::Correlation)
        .unwrap();
    let mirrored = engine
        .convolve(
            &image.view(),
            &mirror(&kernel.view()).view(),
            ConvolutionMode::Convolution,
        )
        .unwrap();
    assert_abs_diff_eq!(max_abs_diff(&correlated, &mirrored), 0.0, epsilon = 1e-4);
}

// ---------------------------------------------------------------------------
// Stateful convolution and caching
// ---------------------------------------------------------------------------

#[test]
fn test_fft_convolution_keeps_requested_transforms() {
    let engine = FourierConvolver::default();
    let image = noise_volume(&[20, 20], 31);
    let kernel = noise_volume(&[5, 5], 32);
    let reference = engine
        .convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution)
        .unwrap();

    let mut conv = FftConvolution::new(&engine);
    conv.set_image(image.clone());
    conv.set_kernel(kernel.clone());
    conv.set_keep_kernel_fft(true);

    let first = conv.convolve().unwrap();
    assert!(conv.has_kernel_fft());
    assert!(!conv.has_image_fft());
    assert_abs_diff_eq!(max_abs_diff(&first, &reference), 0.0, epsilon = 1e-5);

    // Reusing the cached kernel with a new image.
    let other = noise_volume(&[20, 20], 33);
    conv.set_image(other.clone());
    let second = conv.convolve().unwrap();
    let expected = engine
        .convolve(&other.view(), &kernel.view(), ConvolutionMode::Convolution)
        .unwrap();
    assert_abs_diff_eq!(max_abs_diff(&second, &expected), 0.0, epsilon = 1e-5);

    conv.set_keep_image_fft(true);
    let _ = conv.convolve().unwrap();
    assert!(conv.has_image_fft());

    conv.set_kernel(delta_kernel(&[5, 5]));
    assert!(!conv.has_kernel_fft());
    assert!(conv.has_image_fft());
    let identity = conv.convolve().unwrap();
    assert!(max_abs_diff(&identity, &other) < 1e-5);

    conv.set_keep_image_fft(false);
    assert!(!conv.has_image_fft());
}

#[test]
fn test_fft_convolution_requires_operands() {
    let engine = FourierConvolver::default();
    let mut conv = FftConvolution::new(&engine);
    assert!(matches!(conv.convolve(), Err(DeconError::Config(_))));
}

#[test]
fn test_prepared_kernel_rejects_other_extent() {
    let engine = FourierConvolver::default();
    let kernel = delta_kernel(&[3, 3]);
    let prepared = engine.prepare_kernel(&kernel.view(), &[10, 10]).unwrap();
    let image = noise_volume(&[10, 11], 1);
    let err = engine
        .convolve_prepared(&image.view(), &prepared, ConvolutionMode::Convolution)
        .unwrap_err();
    assert!(matches!(err, DeconError::ExtentMismatch { .. }));
}

#[test]
fn test_kernel_dimensionality_must_match() {
    let image = noise_volume(&[10, 10], 1);
    let kernel = delta_kernel(&[3]);
    let err = convolve(&image.view(), &kernel.view(), ConvolutionMode::Convolution).unwrap_err();
    assert!(matches!(err, DeconError::ExtentMismatch { .. }));
}
