pub mod types;
pub mod config;
pub mod error_handling;
pub mod hasher;
pub mod backend;
pub mod cpu;
#[cfg(feature = "opencl")]
pub mod cl_kernels;
#[cfg(feature = "opencl")]
pub mod gpu;
pub mod work;
pub mod submit;
pub mod metrics;
pub mod prometheus_metrics;
pub mod health;
pub mod server;
pub mod miner;
pub mod logging;

#[cfg(test)]
mod test_support;
