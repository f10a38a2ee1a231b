//! Grouping blocks into batches that can run concurrently.
//!
//! Blocks are grouped by the parity of their grid position in every
//! dimension, so neighbouring blocks never share a batch. As long as a
//! block's padding is narrower than its neighbour's effective region, the
//! blocks of one batch cover pairwise disjoint parts of the volume.

use tracing::{debug, warn};

use super::Block;

/// Ordered batches of block indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    batches: Vec<Vec<usize>>,
    parallel: bool,
}

impl Schedule {
    /// One batch holding every block, to be processed one block at a time.
    pub fn serial(num_blocks: usize) -> Self {
        Self {
            batches: vec![(0..num_blocks).collect()],
            parallel: false,
        }
    }

    pub fn batches(&self) -> &[Vec<usize>] {
        &self.batches
    }

    /// Whether blocks inside a batch may be processed concurrently.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn num_blocks(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// Build the batch schedule for `blocks`.
///
/// Falls back to [`Schedule::serial`] when the batches do not account for
/// every block exactly once, or when two blocks of a batch overlap.
pub fn schedule(blocks: &[Block]) -> Schedule {
    let Some(first) = blocks.first() else {
        return Schedule {
            batches: Vec::new(),
            parallel: true,
        };
    };
    let n = first.num_dimensions();

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); 1 << n];
    for (i, block) in blocks.iter().enumerate() {
        let parity = block
            .grid_index()
            .iter()
            .enumerate()
            .fold(0usize, |acc, (d, &g)| acc | ((g & 1) << d));
        groups[parity].push(i);
    }
    let batches: Vec<Vec<usize>> = groups.into_iter().filter(|g| !g.is_empty()).collect();

    let scheduled: usize = batches.iter().map(Vec::len).sum();
    if scheduled != blocks.len() {
        warn!(
            scheduled,
            total = blocks.len(),
            "Batch sizes do not add up to the block count, processing blocks serially"
        );
        return Schedule::serial(blocks.len());
    }

    if let Some((a, b)) = batches.iter().find_map(|batch| first_overlap(blocks, batch)) {
        warn!(
            first = a,
            second = b,
            "Blocks in one batch overlap (kernel wider than effective size), \
             processing blocks serially"
        );
        return Schedule::serial(blocks.len());
    }

    debug!(
        batches = batches.len(),
        blocks = blocks.len(),
        "Scheduled blocks into batches"
    );
    Schedule {
        batches,
        parallel: true,
    }
}

/// First pair of blocks in `batch` whose full buffers overlap.
///
/// Full buffers are compared rather than effective regions: disjoint
/// buffers keep a batch correct even when the driver reads from and writes
/// to the same volume, since no block reads voxels another block of the
/// batch writes.
fn first_overlap(blocks: &[Block], batch: &[usize]) -> Option<(usize, usize)> {
    for (pos, &i) in batch.iter().enumerate() {
        for &j in &batch[pos + 1..] {
            if blocks[i].intersects(&blocks[j]) {
                return Some((i, j));
            }
        }
    }
    None
}
