use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeconError {
    #[error(
        "Block size in dimension {dim} ({block}) is too small for the kernel ({kernel}): \
         effective size would be {effective}"
    )]
    InvalidEffectiveSize {
        dim: usize,
        block: i64,
        kernel: usize,
        effective: i64,
    },

    #[error("Cannot split dimension {dim} of extent {image} into {blocks} blocks")]
    InvalidBlockCount {
        dim: usize,
        blocks: usize,
        image: usize,
    },

    #[error("Unsupported dimensionality: {0} (expected 1 to 3)")]
    UnsupportedDimensionality(usize),

    #[error("Extent mismatch: expected {expected:?}, got {actual:?}")]
    ExtentMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("View {view} has shape {actual:?}, expected {expected:?}")]
    ViewShapeMismatch {
        view: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("View set is empty")]
    EmptyViewSet,

    #[error("View set has not been initialized")]
    NotInitialized,

    #[error("View set is already initialized")]
    AlreadyInitialized,

    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),

    #[error("Worker interrupted: {0}")]
    Interrupted(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DeconError>;
