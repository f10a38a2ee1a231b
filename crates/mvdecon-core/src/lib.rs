pub mod block;
pub mod compute;
pub mod config;
pub mod consts;
pub mod error;
pub mod extend;
pub mod fourier;
pub mod pool;
pub mod psf;
pub mod views;
