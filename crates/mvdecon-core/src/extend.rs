//! Out-of-bounds extension of volumes.
//!
//! Blocks near the volume border read beyond the nominal domain. The owner of
//! the source decides what those reads return by wrapping it in an
//! [`ExtendedView`] with an [`OutOfBounds`] policy.

use std::fmt;

use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

use crate::consts::MAX_DIMENSIONS;

/// Value policy for coordinates outside `[0, extent)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum OutOfBounds {
    /// Constant zero.
    Zero,
    /// Constant value.
    Value(f32),
    /// Repeat the nearest edge sample.
    Border,
    /// Mirror without repeating the edge sample: `.. 2 1 [0 1 2 ..]`.
    #[default]
    MirrorSingle,
    /// Mirror repeating the edge sample: `.. 1 0 [0 1 2 ..]`.
    MirrorDouble,
    /// Wrap around.
    Periodic,
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "Zero"),
            Self::Value(v) => write!(f, "Value ({v})"),
            Self::Border => write!(f, "Border"),
            Self::MirrorSingle => write!(f, "Mirror (single)"),
            Self::MirrorDouble => write!(f, "Mirror (double)"),
            Self::Periodic => write!(f, "Periodic"),
        }
    }
}

impl OutOfBounds {
    /// Map a coordinate along an axis of length `size` into `[0, size)`.
    /// `None` means the policy yields its constant instead of a sample.
    pub fn map_index(&self, idx: isize, size: usize) -> Option<usize> {
        if idx >= 0 && (idx as usize) < size {
            return Some(idx as usize);
        }
        if size == 0 {
            return None;
        }
        let n = size as isize;
        match self {
            Self::Zero | Self::Value(_) => None,
            Self::Border => Some(idx.clamp(0, n - 1) as usize),
            Self::MirrorSingle => {
                if size == 1 {
                    return Some(0);
                }
                let period = 2 * n - 2;
                let m = idx.rem_euclid(period);
                Some(if m < n { m } else { period - m } as usize)
            }
            Self::MirrorDouble => {
                let period = 2 * n;
                let m = idx.rem_euclid(period);
                Some(if m < n { m } else { period - 1 - m } as usize)
            }
            Self::Periodic => Some(idx.rem_euclid(n) as usize),
        }
    }

    fn constant(&self) -> f32 {
        match self {
            Self::Value(v) => *v,
            _ => 0.0,
        }
    }
}

/// A volume that can be sampled at any integer coordinate.
#[derive(Clone, Debug)]
pub struct ExtendedView<'a> {
    data: ArrayViewD<'a, f32>,
    policy: OutOfBounds,
}

impl<'a> ExtendedView<'a> {
    pub fn new(data: ArrayViewD<'a, f32>, policy: OutOfBounds) -> Self {
        Self { data, policy }
    }

    pub fn data(&self) -> &ArrayViewD<'a, f32> {
        &self.data
    }

    pub fn policy(&self) -> OutOfBounds {
        self.policy
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Sample at `pos`, applying the out-of-bounds policy per axis.
    pub fn get(&self, pos: &[isize]) -> f32 {
        let n = pos.len().min(MAX_DIMENSIONS);
        let shape = self.data.shape();
        let mut idx = [0usize; MAX_DIMENSIONS];
        for d in 0..n {
            match self.policy.map_index(pos[d], shape[d]) {
                Some(i) => idx[d] = i,
                None => return self.policy.constant(),
            }
        }
        self.data[&idx[..n]]
    }

    /// Whether the box `[offset, offset + size)` lies inside the nominal domain.
    pub fn contains(&self, offset: &[isize], size: &[usize]) -> bool {
        offset
            .iter()
            .zip(size)
            .zip(self.data.shape())
            .all(|((&o, &s), &n)| o >= 0 && o as usize + s <= n)
    }
}
