use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::{ArrayD, Axis, Zip};
use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::consts::{FAST_FFT_FACTORS, PARALLEL_VOXEL_THRESHOLD};

/// Smallest length `>= n` whose prime factors are all in [`FAST_FFT_FACTORS`].
pub fn next_fast_len(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let mut candidate = n;
    loop {
        let mut rest = candidate;
        for &f in &FAST_FFT_FACTORS {
            while rest % f == 0 {
                rest /= f;
            }
        }
        if rest == 1 {
            return candidate;
        }
        candidate += 1;
    }
}

/// Thread-safe cache of 1-D FFT plans, keyed by length and direction.
///
/// Plans are shared across worker threads; repeated transforms of the same
/// working extent reuse their twiddle tables.
#[derive(Default)]
pub struct FftPlans {
    plans: Mutex<HashMap<(usize, bool), Arc<dyn Fft<f32>>>>,
}

impl FftPlans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&self, len: usize, inverse: bool) -> Arc<dyn Fft<f32>> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        plans
            .entry((len, inverse))
            .or_insert_with(|| {
                let mut planner = FftPlanner::new();
                if inverse {
                    planner.plan_fft_inverse(len)
                } else {
                    planner.plan_fft_forward(len)
                }
            })
            .clone()
    }
}

/// In-place n-dimensional FFT, one axis at a time. The inverse transform
/// is left unnormalized.
pub fn fft_nd(data: &mut ArrayD<Complex32>, plans: &FftPlans, inverse: bool) {
    let parallel = data.len() >= PARALLEL_VOXEL_THRESHOLD;
    for axis in 0..data.ndim() {
        let len = data.len_of(Axis(axis));
        if len <= 1 {
            continue;
        }
        let fft = plans.plan(len, inverse);
        if parallel {
            Zip::from(data.lanes_mut(Axis(axis))).par_for_each(|lane| process_lane(&*fft, lane));
        } else {
            for lane in data.lanes_mut(Axis(axis)) {
                process_lane(&*fft, lane);
            }
        }
    }
}

fn process_lane(fft: &dyn Fft<f32>, mut lane: ndarray::ArrayViewMut1<'_, Complex32>) {
    if let Some(slice) = lane.as_slice_mut() {
        fft.process(slice);
        return;
    }
    let mut buffer: Vec<Complex32> = lane.iter().copied().collect();
    fft.process(&mut buffer);
    for (dst, src) in lane.iter_mut().zip(buffer) {
        *dst = src;
    }
}
