use serde::{Deserialize, Serialize};

use crate::block::BlockPartitioner;
use crate::compute::DevicePreference;
use crate::extend::OutOfBounds;
use crate::psf::PsfType;

/// Settings shared by every view of a [`crate::views::DeconViews`] set.
///
/// Every field falls back to its default when missing from a config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeconConfig {
    /// Compound kernel strategy shared by all views.
    #[serde(default)]
    pub psf_type: PsfType,
    /// Out-of-bounds policy used when blocks read beyond the volume.
    #[serde(default)]
    pub source_extension: OutOfBounds,
    /// Padding of block buffers into the FFT working extent.
    #[serde(default)]
    pub fft_padding: OutOfBounds,
    #[serde(default)]
    pub device: DevicePreference,
    /// Worker threads (default: one per available processing unit).
    #[serde(default)]
    pub threads: Option<usize>,
    /// How each view's volume is divided into blocks.
    #[serde(default)]
    pub partitioner: BlockPartitioner,
}

impl Default for DeconConfig {
    fn default() -> Self {
        Self {
            psf_type: PsfType::default(),
            source_extension: OutOfBounds::MirrorSingle,
            fft_padding: OutOfBounds::MirrorSingle,
            device: DevicePreference::Auto,
            threads: None,
            partitioner: BlockPartitioner::default(),
        }
    }
}
