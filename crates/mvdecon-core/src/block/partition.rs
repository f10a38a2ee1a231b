//! Strategies for dividing a volume into overlapping blocks.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{DEFAULT_BLOCK_SIZE, MAX_DIMENSIONS};
use crate::error::{DeconError, Result};

use super::Block;

/// How a volume is divided into blocks for a given kernel.
///
/// Per-dimension parameters may hold a single value, which then applies to
/// every dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockPartitioner {
    /// Every block has the same `block_size`; the last block per dimension
    /// only keeps the remainder of the volume as its effective region.
    FixedSizePrecise { block_size: Vec<usize> },
    /// `num_blocks` blocks per dimension with equal effective size (the
    /// remainder goes to the last one), padded on both sides by the kernel.
    VariableSizePrecise { num_blocks: Vec<usize> },
    /// Like [`Self::VariableSizePrecise`], but blocks at the volume edge are
    /// padded on their inner side only, and a single block is not padded.
    ///
    /// Edge blocks carry no context beyond the volume border, so results
    /// there follow the convolution engine's padding rather than the
    /// source's out-of-bounds policy.
    VariableSizeSimple { num_blocks: Vec<usize> },
}

impl Default for BlockPartitioner {
    fn default() -> Self {
        Self::FixedSizePrecise {
            block_size: vec![DEFAULT_BLOCK_SIZE],
        }
    }
}

impl fmt::Display for BlockPartitioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedSizePrecise { block_size } => {
                write!(f, "Fixed size precise (block size {block_size:?})")
            }
            Self::VariableSizePrecise { num_blocks } => {
                write!(f, "Variable size precise ({num_blocks:?} blocks)")
            }
            Self::VariableSizeSimple { num_blocks } => {
                write!(f, "Variable size simple ({num_blocks:?} blocks)")
            }
        }
    }
}

/// Placement of one block along a single axis.
#[derive(Clone, Copy, Debug)]
struct AxisSpan {
    offset: isize,
    size: usize,
    effective_size: usize,
    effective_local_offset: usize,
}

impl BlockPartitioner {
    /// Divide `image_extent` into blocks sized for `kernel_extent`.
    ///
    /// The effective regions of the returned blocks tile `[0, image_extent)`
    /// exactly. Blocks are ordered row-major over the block grid.
    pub fn partition(&self, image_extent: &[usize], kernel_extent: &[usize]) -> Result<Vec<Block>> {
        let n = image_extent.len();
        if n == 0 || n > MAX_DIMENSIONS {
            return Err(DeconError::UnsupportedDimensionality(n));
        }
        if kernel_extent.len() != n {
            return Err(DeconError::ExtentMismatch {
                expected: image_extent.to_vec(),
                actual: kernel_extent.to_vec(),
            });
        }
        if let Some(d) = kernel_extent.iter().position(|&k| k == 0) {
            return Err(DeconError::InvalidKernel(format!(
                "kernel extent is zero in dimension {d}"
            )));
        }
        if let Some(d) = image_extent.iter().position(|&s| s == 0) {
            return Err(DeconError::InvalidBlockCount {
                dim: d,
                blocks: 0,
                image: 0,
            });
        }

        let axes = (0..n)
            .map(|d| match self {
                Self::FixedSizePrecise { block_size } => {
                    let bs = per_dimension(block_size, n, d)?;
                    fixed_precise_axis(d, image_extent[d], kernel_extent[d], bs)
                }
                Self::VariableSizePrecise { num_blocks } => {
                    let nb = per_dimension(num_blocks, n, d)?;
                    variable_precise_axis(d, image_extent[d], kernel_extent[d], nb)
                }
                Self::VariableSizeSimple { num_blocks } => {
                    let nb = per_dimension(num_blocks, n, d)?;
                    variable_simple_axis(d, image_extent[d], kernel_extent[d], nb)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if matches!(self, Self::VariableSizeSimple { .. }) {
            debug!("Edge blocks are padded on their inner side only");
        }
        let blocks = assemble(&axes);
        debug!(
            strategy = %self,
            image = ?image_extent,
            kernel = ?kernel_extent,
            grid = ?axes.iter().map(Vec::len).collect::<Vec<_>>(),
            blocks = blocks.len(),
            "Partitioned volume into blocks"
        );
        Ok(blocks)
    }
}

/// Distinct working extents among `blocks`, in sorted order.
pub fn distinct_block_sizes(blocks: &[Block]) -> Vec<Vec<usize>> {
    blocks
        .iter()
        .map(|b| b.block_size().to_vec())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn per_dimension(values: &[usize], n: usize, d: usize) -> Result<usize> {
    match values.len() {
        1 => Ok(values[0]),
        len if len == n => Ok(values[d]),
        _ => Err(DeconError::Config(format!(
            "expected 1 or {n} per-dimension values, got {values:?}"
        ))),
    }
}

fn fixed_precise_axis(
    dim: usize,
    image: usize,
    kernel: usize,
    block: usize,
) -> Result<Vec<AxisSpan>> {
    let effective = block as i64 - kernel as i64 + 1;
    if effective <= 0 {
        return Err(DeconError::InvalidEffectiveSize {
            dim,
            block: block as i64,
            kernel,
            effective,
        });
    }
    let effective = effective as usize;
    let count = image.div_ceil(effective);
    let radius = kernel / 2;

    Ok((0..count)
        .map(|i| {
            let start = i * effective;
            AxisSpan {
                offset: start as isize - radius as isize,
                size: block,
                effective_size: effective.min(image - start),
                effective_local_offset: radius,
            }
        })
        .collect())
}

fn check_block_count(dim: usize, image: usize, blocks: usize) -> Result<usize> {
    if blocks == 0 || blocks > image {
        return Err(DeconError::InvalidBlockCount { dim, blocks, image });
    }
    Ok(image / blocks)
}

fn variable_precise_axis(
    dim: usize,
    image: usize,
    kernel: usize,
    blocks: usize,
) -> Result<Vec<AxisSpan>> {
    let effective = check_block_count(dim, image, blocks)?;
    let radius = kernel / 2;

    Ok((0..blocks)
        .map(|i| {
            let start = i * effective;
            let effective_size = if i + 1 == blocks { image - start } else { effective };
            AxisSpan {
                offset: start as isize - radius as isize,
                size: effective_size + kernel - 1,
                effective_size,
                effective_local_offset: radius,
            }
        })
        .collect())
}

fn variable_simple_axis(
    dim: usize,
    image: usize,
    kernel: usize,
    blocks: usize,
) -> Result<Vec<AxisSpan>> {
    let effective = check_block_count(dim, image, blocks)?;
    if blocks == 1 {
        return Ok(vec![AxisSpan {
            offset: 0,
            size: image,
            effective_size: image,
            effective_local_offset: 0,
        }]);
    }
    let radius = kernel / 2;

    Ok((0..blocks)
        .map(|i| {
            let start = i * effective;
            let last = i + 1 == blocks;
            let effective_size = if last { image - start } else { effective };
            if i == 0 {
                AxisSpan {
                    offset: 0,
                    size: effective_size + radius,
                    effective_size,
                    effective_local_offset: 0,
                }
            } else if last {
                AxisSpan {
                    offset: start as isize - radius as isize,
                    size: effective_size + radius,
                    effective_size,
                    effective_local_offset: radius,
                }
            } else {
                AxisSpan {
                    offset: start as isize - radius as isize,
                    size: effective_size + kernel - 1,
                    effective_size,
                    effective_local_offset: radius,
                }
            }
        })
        .collect())
}

/// Cartesian product of per-axis spans, last axis varying fastest.
fn assemble(axes: &[Vec<AxisSpan>]) -> Vec<Block> {
    let n = axes.len();
    let total: usize = axes.iter().map(Vec::len).product();
    let mut blocks = Vec::with_capacity(total);
    let mut index = vec![0usize; n];

    for _ in 0..total {
        let spans: Vec<AxisSpan> = (0..n).map(|d| axes[d][index[d]]).collect();
        blocks.push(Block::new(
            spans.iter().map(|s| s.size).collect(),
            spans.iter().map(|s| s.offset).collect(),
            spans.iter().map(|s| s.effective_size).collect(),
            spans.iter().map(|s| s.effective_local_offset).collect(),
            index.clone(),
        ));

        for d in (0..n).rev() {
            index[d] += 1;
            if index[d] < axes[d].len() {
                break;
            }
            index[d] = 0;
        }
    }

    blocks
}
