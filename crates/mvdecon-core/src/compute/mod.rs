mod worker;
pub mod cpu;

pub use worker::{create_worker, BlockComputeWorker, BlockKernel, DevicePreference};
