//! Batched hash compute.
//!
//! A [`HashBackend`] owns one compute device for its whole lifetime and turns
//! an input template plus a start nonce into exactly `batch_size` results,
//! ordered by nonce. Dropping the backend releases the device.

use tracing::{info, warn};

use crate::config::Config;
use crate::cpu::CpuBackend;
use crate::error_handling::DeviceError;
use crate::hasher;
use crate::types::{DevicePreference, HashResult, InputTemplate};

pub trait HashBackend: Send {
    fn device_name(&self) -> &str;

    fn batch_size(&self) -> usize;

    /// Hashes `[start_nonce, start_nonce + batch_size)`.
    ///
    /// `result[i].nonce == start_nonce + i` for every `i`.
    fn compute_batch(
        &mut self,
        template: &InputTemplate,
        start_nonce: u64,
    ) -> Result<Vec<HashResult>, DeviceError>;
}

/// Opens a fresh backend; called again after a device failure.
pub type BackendFactory = Box<dyn FnMut() -> Result<Box<dyn HashBackend>, DeviceError> + Send>;

pub fn factory(config: &Config) -> BackendFactory {
    let config = config.clone();
    Box::new(move || open_backend(&config))
}

/// Picks a device: OpenCL GPU, then OpenCL CPU, then the native CPU pool.
/// Both hash algorithms have an OpenCL kernel.
pub fn open_backend(config: &Config) -> Result<Box<dyn HashBackend>, DeviceError> {
    if config.device_preference == DevicePreference::Gpu {
        #[cfg(feature = "opencl")]
        match crate::gpu::OclBackend::open(config.hash_algorithm, config.batch_size) {
            Ok(backend) => {
                info!(device = backend.device_name(), "Using OpenCL backend");
                return Ok(Box::new(backend));
            }
            Err(e) => warn!(error = %e, "No usable OpenCL device, falling back to CPU"),
        }
        #[cfg(not(feature = "opencl"))]
        warn!("Built without the opencl feature, falling back to CPU");
    }

    let pow = hasher::for_algorithm(config.hash_algorithm)?;
    let backend = CpuBackend::new(pow, config.batch_size, config.cpu_threads)?;
    info!(device = backend.device_name(), "Using CPU backend");
    Ok(Box::new(backend))
}

/// Enforces the batch shape contract on results coming back from a device.
pub fn check_batch(
    results: &[HashResult],
    start_nonce: u64,
    batch_size: usize,
) -> Result<(), DeviceError> {
    if results.len() != batch_size {
        return Err(DeviceError::MalformedBatch { expected: batch_size, got: results.len() });
    }
    for (i, r) in results.iter().enumerate() {
        if r.nonce != start_nonce.wrapping_add(i as u64) {
            return Err(DeviceError::Compute(format!(
                "result {i} carries nonce {} instead of {}",
                r.nonce,
                start_nonce.wrapping_add(i as u64)
            )));
        }
    }
    Ok(())
}
