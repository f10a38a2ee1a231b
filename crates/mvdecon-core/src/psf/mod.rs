//! Per-view point-spread functions and their compound kernels.
//!
//! Each view keeps its measured PSF (`kernel1`) and a derived `kernel2`
//! used in the second half of a multi-view iteration. How `kernel2`
//! combines the blur of all views depends on the [`PsfType`]:
//!
//! | type | `kernel2` |
//! |---|---|
//! | `Independent` | `mirror(k1)` |
//! | `EfficientBayesian` | `normalize(mirror(k1) × ∏_w (mirror(k1) ⊛ k_w) ⊛ mirror(k_w))` |
//! | `OptimizationI` | `mirror(normalize(k1 × ∏_w k1 ⊛ mirror(k_w)))` |
//! | `OptimizationII` | `mirror(normalize(k1 ^ views))` |
//!
//! Products run over every other view `w`. With a single view every type
//! reduces to `Independent`.

pub mod kernel;

use std::collections::BTreeMap;
use std::fmt;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compute::{BlockComputeWorker, BlockKernel};
use crate::error::{DeconError, Result};
use crate::fourier::{ConvolutionMode, FourierConvolver};

use kernel::{mirror, normalize, normalized, validate};

/// Strategy for building a view's compound kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsfType {
    Independent,
    #[default]
    EfficientBayesian,
    OptimizationI,
    OptimizationII,
}

impl fmt::Display for PsfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Independent => write!(f, "Independent"),
            Self::EfficientBayesian => write!(f, "Efficient Bayesian"),
            Self::OptimizationI => write!(f, "Optimization I"),
            Self::OptimizationII => write!(f, "Optimization II"),
        }
    }
}

/// Prepared kernels keyed by block extent.
pub type KernelCache = BTreeMap<Vec<usize>, BlockKernel>;

/// A compound kernel plus both kernels prepared for every block extent of
/// a view.
#[derive(Clone, Debug)]
pub(crate) struct PreparedKernels {
    kernel2: ArrayD<f32>,
    transforms1: KernelCache,
    transforms2: KernelCache,
}

#[derive(Clone, Debug)]
enum Compound {
    Pending,
    Ready(PreparedKernels),
}

/// One view's PSF with its lazily computed compound kernel.
#[derive(Clone, Debug)]
pub struct ViewPsf {
    kernel1: ArrayD<f32>,
    psf_type: PsfType,
    compound: Compound,
}

impl ViewPsf {
    /// Validate and normalize `kernel`. The compound kernel is computed later
    /// by the owning view set, once every sibling view exists.
    ///
    /// Every extent must be odd: blocks are padded by `extent / 2` on both
    /// sides of their effective region, which only matches the kernel's
    /// reach when the centre sits in the middle.
    pub fn new(kernel: ArrayD<f32>, psf_type: PsfType) -> Result<Self> {
        validate(&kernel.view())?;
        if kernel.shape().iter().any(|&k| k % 2 == 0) {
            return Err(DeconError::InvalidKernel(format!(
                "kernel extent {:?} must be odd in every dimension",
                kernel.shape()
            )));
        }
        let kernel1 = normalized(kernel.as_standard_layout().into_owned())?;
        Ok(Self {
            kernel1,
            psf_type,
            compound: Compound::Pending,
        })
    }

    pub fn kernel1(&self) -> &ArrayD<f32> {
        &self.kernel1
    }

    pub fn psf_type(&self) -> PsfType {
        self.psf_type
    }

    pub fn kernel_extent(&self) -> &[usize] {
        self.kernel1.shape()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.compound, Compound::Ready(_))
    }

    pub fn kernel2(&self) -> Result<&ArrayD<f32>> {
        match &self.compound {
            Compound::Ready(k) => Ok(&k.kernel2),
            Compound::Pending => Err(DeconError::NotInitialized),
        }
    }

    /// `kernel1` prepared for blocks of `block_extent`.
    pub fn transform1(&self, block_extent: &[usize]) -> Result<&BlockKernel> {
        match &self.compound {
            Compound::Ready(k) => lookup(&k.transforms1, block_extent),
            Compound::Pending => Err(DeconError::NotInitialized),
        }
    }

    /// `kernel2` prepared for blocks of `block_extent`.
    pub fn transform2(&self, block_extent: &[usize]) -> Result<&BlockKernel> {
        match &self.compound {
            Compound::Ready(k) => lookup(&k.transforms2, block_extent),
            Compound::Pending => Err(DeconError::NotInitialized),
        }
    }

    pub(crate) fn transforms1(&self) -> Result<&KernelCache> {
        match &self.compound {
            Compound::Ready(k) => Ok(&k.transforms1),
            Compound::Pending => Err(DeconError::NotInitialized),
        }
    }

    pub(crate) fn transforms2(&self) -> Result<&KernelCache> {
        match &self.compound {
            Compound::Ready(k) => Ok(&k.transforms2),
            Compound::Pending => Err(DeconError::NotInitialized),
        }
    }

    /// Prepare `kernel1` and the compound `kernel2` for every block extent
    /// the view will use. Nothing changes until [`Self::install`].
    pub(crate) fn prepare(
        &self,
        kernel2: ArrayD<f32>,
        block_extents: &[Vec<usize>],
        worker: &dyn BlockComputeWorker,
    ) -> Result<PreparedKernels> {
        let mut transforms1 = KernelCache::new();
        let mut transforms2 = KernelCache::new();
        for extent in block_extents {
            transforms1.insert(extent.clone(), worker.prepare(&self.kernel1.view(), extent)?);
            transforms2.insert(extent.clone(), worker.prepare(&kernel2.view(), extent)?);
        }
        Ok(PreparedKernels {
            kernel2,
            transforms1,
            transforms2,
        })
    }

    pub(crate) fn install(&mut self, kernels: PreparedKernels) {
        self.compound = Compound::Ready(kernels);
    }
}

fn lookup<'a>(cache: &'a KernelCache, extent: &[usize]) -> Result<&'a BlockKernel> {
    cache.get(extent).ok_or_else(|| DeconError::ExtentMismatch {
        expected: cache.keys().next().cloned().unwrap_or_default(),
        actual: extent.to_vec(),
    })
}

/// Compound kernel of view `view` given the normalized `kernel1` of every
/// view in the set.
pub fn compound_kernel(
    view: usize,
    kernels: &[&ArrayD<f32>],
    psf_type: PsfType,
    convolver: &FourierConvolver,
) -> Result<ArrayD<f32>> {
    let own = kernels
        .get(view)
        .copied()
        .ok_or_else(|| DeconError::Config(format!("view {view} out of range")))?;
    let others = kernels
        .iter()
        .enumerate()
        .filter(|&(w, _)| w != view)
        .map(|(_, k)| *k);

    if kernels.len() == 1 || psf_type == PsfType::Independent {
        return Ok(mirror(&own.view()));
    }

    let kernel2 = match psf_type {
        PsfType::Independent => mirror(&own.view()),
        PsfType::EfficientBayesian => {
            let inverted = mirror(&own.view());
            let mut product = inverted.clone();
            for other in others {
                let blurred = convolve_kernels(convolver, &inverted, other)?;
                let compound = convolve_kernels(convolver, &blurred, &mirror(&other.view()))?;
                product *= &compound;
            }
            normalized(product)?
        }
        PsfType::OptimizationI => {
            let mut product = own.clone();
            for other in others {
                let blurred = convolve_kernels(convolver, own, &mirror(&other.view()))?;
                product *= &blurred;
            }
            normalize(&mut product)?;
            mirror(&product.view())
        }
        PsfType::OptimizationII => {
            let exponent = kernels.len() as i32;
            let mut power = own.mapv(|v| v.powi(exponent));
            normalize(&mut power)?;
            mirror(&power.view())
        }
    };

    debug!(
        view,
        psf_type = %psf_type,
        extent = ?kernel2.shape(),
        "Computed compound kernel"
    );
    Ok(kernel2)
}

/// `a ⊛ b` over the extent of `a`, with FFT round-off below zero removed.
fn convolve_kernels(
    convolver: &FourierConvolver,
    a: &ArrayD<f32>,
    b: &ArrayD<f32>,
) -> Result<ArrayD<f32>> {
    let mut result = convolver.convolve(&a.view(), &b.view(), ConvolutionMode::Convolution)?;
    result.mapv_inplace(|v| v.max(0.0));
    Ok(result)
}
