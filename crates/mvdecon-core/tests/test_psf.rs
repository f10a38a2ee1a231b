mod common;

use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn};

use mvdecon_core::error::DeconError;
use mvdecon_core::extend::OutOfBounds;
use mvdecon_core::fourier::FourierConvolver;
use mvdecon_core::psf::kernel::{gaussian_kernel, kernel_sum, mirror, normalize};
use mvdecon_core::psf::{compound_kernel, PsfType, ViewPsf};

use common::{direct_convolve, noise_volume};

const ALL_TYPES: [PsfType; 4] = [
    PsfType::Independent,
    PsfType::EfficientBayesian,
    PsfType::OptimizationI,
    PsfType::OptimizationII,
];

fn view_kernels(count: usize, shape: &[usize]) -> Vec<ArrayD<f32>> {
    (0..count)
        .map(|i| {
            let mut k = noise_volume(shape, 100 + i as u64);
            k.mapv_inplace(|v| v + 0.05);
            normalize(&mut k).unwrap();
            k
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Kernel helpers
// ---------------------------------------------------------------------------

#[test]
fn test_mirror_reverses_every_axis() {
    let kernel = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])
        .unwrap();
    let mirrored = mirror(&kernel.view());
    let values: Vec<f32> = mirrored.iter().copied().collect();
    assert_eq!(values, vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0]);
    assert_eq!(mirror(&mirrored.view()), kernel);
}

#[test]
fn test_normalize_rejects_zero_sum() {
    let mut kernel = ArrayD::<f32>::zeros(IxDyn(&[3, 3]));
    assert!(matches!(
        normalize(&mut kernel),
        Err(DeconError::InvalidKernel(_))
    ));
}

#[test]
fn test_gaussian_kernel_shape_and_sum() {
    let kernel = gaussian_kernel(&[1.0, 1.5, 0.5]).unwrap();
    assert_eq!(kernel.shape(), &[7, 11, 5]);
    assert_abs_diff_eq!(kernel_sum(&kernel.view()), 1.0, epsilon = 1e-5);

    let peak = kernel.iter().copied().fold(f32::MIN, f32::max);
    assert_eq!(kernel[[3, 5, 2]], peak);
    assert_abs_diff_eq!(kernel[[0, 5, 2]], kernel[[6, 5, 2]], epsilon = 1e-9);
}

#[test]
fn test_gaussian_kernel_rejects_bad_sigma() {
    assert!(matches!(
        gaussian_kernel(&[1.0, 0.0]),
        Err(DeconError::InvalidKernel(_))
    ));
    assert!(matches!(
        gaussian_kernel(&[]),
        Err(DeconError::UnsupportedDimensionality(0))
    ));
}

// ---------------------------------------------------------------------------
// ViewPsf
// ---------------------------------------------------------------------------

#[test]
fn test_view_psf_normalizes_kernel() {
    let kernel = ArrayD::from_elem(IxDyn(&[3, 3]), 2.0f32);
    let psf = ViewPsf::new(kernel, PsfType::default()).unwrap();
    assert_abs_diff_eq!(kernel_sum(&psf.kernel1().view()), 1.0, epsilon = 1e-6);
    assert_eq!(psf.kernel_extent(), &[3, 3]);
    assert_eq!(psf.psf_type(), PsfType::EfficientBayesian);
}

#[test]
fn test_view_psf_compound_state_before_initialization() {
    let psf = ViewPsf::new(gaussian_kernel(&[1.0]).unwrap(), PsfType::Independent).unwrap();
    assert!(!psf.is_initialized());
    assert!(matches!(psf.kernel2(), Err(DeconError::NotInitialized)));
    assert!(matches!(psf.transform1(&[16]), Err(DeconError::NotInitialized)));
    assert!(matches!(psf.transform2(&[16]), Err(DeconError::NotInitialized)));
}

#[test]
fn test_view_psf_rejects_invalid_kernels() {
    let empty = ArrayD::<f32>::zeros(IxDyn(&[0, 3]));
    assert!(matches!(
        ViewPsf::new(empty, PsfType::Independent),
        Err(DeconError::InvalidKernel(_))
    ));

    let zero = ArrayD::<f32>::zeros(IxDyn(&[3]));
    assert!(matches!(
        ViewPsf::new(zero, PsfType::Independent),
        Err(DeconError::InvalidKernel(_))
    ));

    let four_d = ArrayD::<f32>::ones(IxDyn(&[1, 1, 1, 1]));
    assert!(matches!(
        ViewPsf::new(four_d, PsfType::Independent),
        Err(DeconError::UnsupportedDimensionality(4))
    ));

    let nan = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0f32, f32::NAN, 1.0]).unwrap();
    assert!(matches!(
        ViewPsf::new(nan, PsfType::Independent),
        Err(DeconError::InvalidKernel(_))
    ));
}

#[test]
fn test_view_psf_rejects_even_extents() {
    let even_1d = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.1f32, 0.2, 0.3, 0.4]).unwrap();
    assert!(matches!(
        ViewPsf::new(even_1d, PsfType::Independent),
        Err(DeconError::InvalidKernel(_))
    ));

    let even_axis = ArrayD::from_elem(IxDyn(&[5, 5, 2]), 1.0f32);
    let err = ViewPsf::new(even_axis, PsfType::EfficientBayesian).unwrap_err();
    assert!(matches!(err, DeconError::InvalidKernel(_)), "unexpected error: {err}");

    let odd = ArrayD::from_elem(IxDyn(&[5, 3, 1]), 1.0f32);
    assert!(ViewPsf::new(odd, PsfType::EfficientBayesian).is_ok());
}

// ---------------------------------------------------------------------------
// Compound kernels
// ---------------------------------------------------------------------------

#[test]
fn test_single_view_compound_is_mirror_for_every_type() {
    let convolver = FourierConvolver::new(OutOfBounds::Zero);
    let kernels = view_kernels(1, &[5, 3, 3]);
    let refs: Vec<&ArrayD<f32>> = kernels.iter().collect();
    for psf_type in ALL_TYPES {
        let kernel2 = compound_kernel(0, &refs, psf_type, &convolver).unwrap();
        assert_eq!(kernel2, mirror(&kernels[0].view()), "{psf_type}");
    }
}

#[test]
fn test_independent_compound_is_mirror_with_many_views() {
    let convolver = FourierConvolver::new(OutOfBounds::Zero);
    let kernels = view_kernels(3, &[5, 5]);
    let refs: Vec<&ArrayD<f32>> = kernels.iter().collect();
    for view in 0..3 {
        let kernel2 = compound_kernel(view, &refs, PsfType::Independent, &convolver).unwrap();
        assert_eq!(kernel2, mirror(&kernels[view].view()));
    }
}

#[test]
fn test_compound_kernels_are_normalized_and_non_negative() {
    let convolver = FourierConvolver::new(OutOfBounds::Zero);
    let kernels = view_kernels(3, &[7, 5, 3]);
    let refs: Vec<&ArrayD<f32>> = kernels.iter().collect();
    for psf_type in ALL_TYPES {
        for view in 0..3 {
            let kernel2 = compound_kernel(view, &refs, psf_type, &convolver).unwrap();
            assert_eq!(kernel2.shape(), &[7, 5, 3]);
            let sum = kernel_sum(&kernel2.view());
            assert!(
                (sum - 1.0).abs() < 1e-4,
                "{psf_type} view {view}: kernel2 sums to {sum}"
            );
            assert!(kernel2.iter().all(|&v| v >= 0.0), "{psf_type} has negative values");
        }
    }
}

fn others(kernels: &[ArrayD<f32>], view: usize) -> impl Iterator<Item = &ArrayD<f32>> {
    kernels
        .iter()
        .enumerate()
        .filter(move |&(w, _)| w != view)
        .map(|(_, k)| k)
}

fn assert_kernels_close(got: &ArrayD<f32>, want: &ArrayD<f32>, what: &str) {
    assert_eq!(got.shape(), want.shape(), "{what}");
    for (g, w) in got.iter().zip(want.iter()) {
        assert_abs_diff_eq!(*g, *w, epsilon = 1e-5);
    }
}

#[test]
fn test_efficient_bayesian_matches_spatial_reference() {
    let convolver = FourierConvolver::new(OutOfBounds::Zero);
    let kernels = view_kernels(3, &[5, 3, 3]);
    let refs: Vec<&ArrayD<f32>> = kernels.iter().collect();

    for view in 0..3 {
        let inverted = mirror(&kernels[view].view());
        let mut expected = inverted.clone();
        for other in others(&kernels, view) {
            let blurred = direct_convolve(&inverted, other, OutOfBounds::Zero);
            expected *= &direct_convolve(&blurred, &mirror(&other.view()), OutOfBounds::Zero);
        }
        normalize(&mut expected).unwrap();

        let kernel2 = compound_kernel(view, &refs, PsfType::EfficientBayesian, &convolver).unwrap();
        assert_kernels_close(&kernel2, &expected, &format!("view {view}"));
    }
}

#[test]
fn test_optimization_i_matches_spatial_reference() {
    let convolver = FourierConvolver::new(OutOfBounds::Zero);
    let kernels = view_kernels(3, &[3, 5, 3]);
    let refs: Vec<&ArrayD<f32>> = kernels.iter().collect();

    for view in 0..3 {
        let own = &kernels[view];
        let mut product = own.clone();
        for other in others(&kernels, view) {
            product *= &direct_convolve(own, &mirror(&other.view()), OutOfBounds::Zero);
        }
        normalize(&mut product).unwrap();
        let expected = mirror(&product.view());

        let kernel2 = compound_kernel(view, &refs, PsfType::OptimizationI, &convolver).unwrap();
        assert_kernels_close(&kernel2, &expected, &format!("view {view}"));
    }
}

#[test]
fn test_optimization_ii_is_normalized_power() {
    let convolver = FourierConvolver::new(OutOfBounds::Zero);
    let kernels = view_kernels(2, &[5]);
    let refs: Vec<&ArrayD<f32>> = kernels.iter().collect();
    let kernel2 = compound_kernel(0, &refs, PsfType::OptimizationII, &convolver).unwrap();

    let mut expected = kernels[0].mapv(|v| v * v);
    normalize(&mut expected).unwrap();
    let expected = mirror(&expected.view());
    for (got, want) in kernel2.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*got, *want, epsilon = 1e-6);
    }
}

#[test]
fn test_compound_view_out_of_range() {
    let convolver = FourierConvolver::default();
    let kernels = view_kernels(2, &[3]);
    let refs: Vec<&ArrayD<f32>> = kernels.iter().collect();
    let err = compound_kernel(2, &refs, PsfType::EfficientBayesian, &convolver).unwrap_err();
    assert!(matches!(err, DeconError::Config(_)));
}

// ---------------------------------------------------------------------------
// PsfType
// ---------------------------------------------------------------------------

#[test]
fn test_psf_type_display() {
    assert_eq!(format!("{}", PsfType::Independent), "Independent");
    assert_eq!(format!("{}", PsfType::EfficientBayesian), "Efficient Bayesian");
    assert_eq!(format!("{}", PsfType::OptimizationI), "Optimization I");
    assert_eq!(format!("{}", PsfType::OptimizationII), "Optimization II");
}
