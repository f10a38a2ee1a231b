//! Overlapping blocks of a large volume.
//!
//! A [`Block`] is a pure geometric descriptor: where its working buffer sits
//! in the volume, and which part of that buffer holds a valid convolution
//! result once the buffer has been convolved with a kernel. The buffers
//! themselves belong to the caller.

pub mod partition;
pub mod schedule;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn, Slice};
use rayon::prelude::*;

use crate::error::{DeconError, Result};
use crate::extend::ExtendedView;
use crate::pool::{chunk_len, WorkerPool};

pub use partition::{distinct_block_sizes, BlockPartitioner};
pub use schedule::{schedule, Schedule};

/// One sub-region of a volume plus the valid core of its convolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    block_size: Vec<usize>,
    offset: Vec<isize>,
    effective_size: Vec<usize>,
    effective_offset: Vec<usize>,
    effective_local_offset: Vec<usize>,
    grid_index: Vec<usize>,
}

impl Block {
    /// `effective_offset` is derived as `offset + effective_local_offset`.
    pub(crate) fn new(
        block_size: Vec<usize>,
        offset: Vec<isize>,
        effective_size: Vec<usize>,
        effective_local_offset: Vec<usize>,
        grid_index: Vec<usize>,
    ) -> Self {
        let effective_offset = offset
            .iter()
            .zip(&effective_local_offset)
            .map(|(&o, &l)| (o + l as isize) as usize)
            .collect();
        Self {
            block_size,
            offset,
            effective_size,
            effective_offset,
            effective_local_offset,
            grid_index,
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.block_size.len()
    }

    /// Extent of the working buffer.
    pub fn block_size(&self) -> &[usize] {
        &self.block_size
    }

    /// Position of the buffer origin in volume coordinates (may be negative).
    pub fn offset(&self) -> &[isize] {
        &self.offset
    }

    pub fn effective_size(&self) -> &[usize] {
        &self.effective_size
    }

    /// Position of the valid region in volume coordinates.
    pub fn effective_offset(&self) -> &[usize] {
        &self.effective_offset
    }

    /// Position of the valid region inside the buffer.
    pub fn effective_local_offset(&self) -> &[usize] {
        &self.effective_local_offset
    }

    /// Position of this block in the per-dimension block grid.
    pub fn grid_index(&self) -> &[usize] {
        &self.grid_index
    }

    pub fn num_voxels(&self) -> usize {
        self.block_size.iter().product()
    }

    pub fn num_effective_voxels(&self) -> usize {
        self.effective_size.iter().product()
    }

    /// Whether the full buffer regions of two blocks overlap.
    pub fn intersects(&self, other: &Block) -> bool {
        (0..self.num_dimensions()).all(|d| {
            let a0 = self.offset[d];
            let a1 = a0 + self.block_size[d] as isize;
            let b0 = other.offset[d];
            let b1 = b0 + other.block_size[d] as isize;
            a0 < b1 && b0 < a1
        })
    }

    /// Whether the effective regions of two blocks overlap.
    pub fn effective_intersects(&self, other: &Block) -> bool {
        (0..self.num_dimensions()).all(|d| {
            let a0 = self.effective_offset[d];
            let a1 = a0 + self.effective_size[d];
            let b0 = other.effective_offset[d];
            let b1 = b0 + other.effective_size[d];
            a0 < b1 && b0 < a1
        })
    }

    /// Fill `destination` (shaped like the block) from `source` at
    /// `offset + local`. Reads outside the source go through its
    /// out-of-bounds policy.
    pub fn copy(
        &self,
        source: &ExtendedView<'_>,
        destination: &mut ArrayViewMutD<'_, f32>,
        pool: &WorkerPool,
    ) -> Result<()> {
        self.check_extent(destination.shape())?;
        self.check_ndim(source.ndim())?;

        let parts = pool.num_tasks();
        let inside = source.contains(&self.offset, &self.block_size);
        if inside && self.num_dimensions() == 3 {
            if let (Some(src), Some(dst)) =
                (source.data().as_slice(), destination.as_slice_mut())
            {
                let origin = [
                    self.offset[0] as usize,
                    self.offset[1] as usize,
                    self.offset[2] as usize,
                ];
                let src_shape = source.shape();
                return pool.run("block copy", || {
                    copy_3d_dense(src, src_shape, &origin, dst, &self.block_size, parts)
                });
            }
        }

        let len = chunk_len(self.block_size[0], parts);
        let chunks: Vec<(usize, ArrayViewMutD<'_, f32>)> = destination
            .axis_chunks_iter_mut(Axis(0), len)
            .enumerate()
            .collect();
        let offset = &self.offset;
        pool.run("block copy", || {
            chunks.into_par_iter().for_each(|(i, mut chunk)| {
                let start = (i * len) as isize;
                let mut pos = vec![0isize; offset.len()];
                for (local, v) in chunk.indexed_iter_mut() {
                    for d in 0..offset.len() {
                        pos[d] = offset[d] + local[d] as isize;
                    }
                    pos[0] += start;
                    *v = source.get(&pos);
                }
            })
        })
    }

    /// Allocate a buffer of the block's extent and fill it from `source`.
    pub fn copy_new(&self, source: &ExtendedView<'_>, pool: &WorkerPool) -> Result<ArrayD<f32>> {
        let mut buffer = ArrayD::<f32>::zeros(IxDyn(&self.block_size));
        self.copy(source, &mut buffer.view_mut(), pool)?;
        Ok(buffer)
    }

    /// Write the effective region of `block_data` into `destination`.
    /// Nothing outside the effective region is touched.
    pub fn paste(
        &self,
        block_data: &ArrayViewD<'_, f32>,
        destination: &mut ArrayViewMutD<'_, f32>,
        pool: &WorkerPool,
    ) -> Result<()> {
        self.check_extent(block_data.shape())?;
        self.check_ndim(destination.ndim())?;
        for d in 0..self.num_dimensions() {
            if self.effective_offset[d] + self.effective_size[d] > destination.shape()[d] {
                return Err(DeconError::ExtentMismatch {
                    expected: self
                        .effective_offset
                        .iter()
                        .zip(&self.effective_size)
                        .map(|(o, s)| o + s)
                        .collect(),
                    actual: destination.shape().to_vec(),
                });
            }
        }

        let parts = pool.num_tasks();
        if self.num_dimensions() == 3 {
            let dst_shape = destination.shape().to_vec();
            if let (Some(src), Some(dst)) = (block_data.as_slice(), destination.as_slice_mut()) {
                return pool.run("block paste", || {
                    paste_3d_dense(self, src, dst, &dst_shape, parts)
                });
            }
        }

        let src = block_data.slice_each_axis(|ax| {
            let d = ax.axis.index();
            let lo = self.effective_local_offset[d];
            Slice::from(lo..lo + self.effective_size[d])
        });
        let mut dst = destination.slice_each_axis_mut(|ax| {
            let d = ax.axis.index();
            let lo = self.effective_offset[d];
            Slice::from(lo..lo + self.effective_size[d])
        });

        let len = chunk_len(self.effective_size[0], parts);
        let dst_chunks: Vec<ArrayViewMutD<'_, f32>> =
            dst.axis_chunks_iter_mut(Axis(0), len).collect();
        let src_chunks: Vec<ArrayViewD<'_, f32>> = src.axis_chunks_iter(Axis(0), len).collect();
        pool.run("block paste", || {
            dst_chunks
                .into_par_iter()
                .zip(src_chunks.into_par_iter())
                .for_each(|(mut d, s)| d.assign(&s));
        })
    }

    fn check_extent(&self, shape: &[usize]) -> Result<()> {
        if shape != self.block_size.as_slice() {
            return Err(DeconError::ExtentMismatch {
                expected: self.block_size.clone(),
                actual: shape.to_vec(),
            });
        }
        Ok(())
    }

    fn check_ndim(&self, ndim: usize) -> Result<()> {
        if ndim != self.num_dimensions() {
            return Err(DeconError::UnsupportedDimensionality(ndim));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dense 3-D fast paths (standard layout, row copies)
// ---------------------------------------------------------------------------

fn copy_3d_dense(
    src: &[f32],
    src_shape: &[usize],
    origin: &[usize; 3],
    dst: &mut [f32],
    size: &[usize],
    parts: usize,
) {
    let (sy, sx) = (src_shape[1], src_shape[2]);
    let (ny, nx) = (size[1], size[2]);
    let plane = ny * nx;
    if plane == 0 {
        return;
    }
    dst.par_chunks_mut(plane)
        .enumerate()
        .with_min_len(chunk_len(size[0], parts))
        .for_each(|(z, dst_plane)| {
            let sz = origin[0] + z;
            for (y, row) in dst_plane.chunks_exact_mut(nx).enumerate() {
                let base = (sz * sy + origin[1] + y) * sx + origin[2];
                row.copy_from_slice(&src[base..base + nx]);
            }
        });
}

fn paste_3d_dense(block: &Block, src: &[f32], dst: &mut [f32], dst_shape: &[usize], parts: usize) {
    let (dy, dx) = (dst_shape[1], dst_shape[2]);
    let (by, bx) = (block.block_size[1], block.block_size[2]);
    let eo = &block.effective_offset;
    let el = &block.effective_local_offset;
    let es = &block.effective_size;
    let plane = dy * dx;
    if plane == 0 {
        return;
    }
    dst.par_chunks_mut(plane)
        .skip(eo[0])
        .take(es[0])
        .enumerate()
        .with_min_len(chunk_len(es[0], parts))
        .for_each(|(z, dst_plane)| {
            let bz = el[0] + z;
            for y in 0..es[1] {
                let d = (eo[1] + y) * dx + eo[2];
                let s = (bz * by + el[1] + y) * bx + el[2];
                dst_plane[d..d + es[2]].copy_from_slice(&src[s..s + es[2]]);
            }
        });
}
