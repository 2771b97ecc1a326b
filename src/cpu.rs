use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::backend::HashBackend;
use crate::error_handling::DeviceError;
use crate::hasher::PowHash;
use crate::types::{HashResult, InputTemplate};

/// General-purpose processor device: a private rayon pool hashing one nonce
/// per task.
pub struct CpuBackend {
    name: String,
    batch_size: usize,
    pow: Arc<dyn PowHash>,
    pool: ThreadPool,
}

impl CpuBackend {
    pub fn new(
        pow: Arc<dyn PowHash>,
        batch_size: usize,
        threads: Option<usize>,
    ) -> Result<Self, DeviceError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("pow-cpu-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| DeviceError::Unavailable(format!("cpu thread pool: {e}")))?;
        let name = format!("cpu ({} threads, {})", pool.current_num_threads(), pow.algorithm());
        Ok(Self { name, batch_size, pow, pool })
    }
}

impl HashBackend for CpuBackend {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn compute_batch(
        &mut self,
        template: &InputTemplate,
        start_nonce: u64,
    ) -> Result<Vec<HashResult>, DeviceError> {
        if template.is_empty() {
            return Err(DeviceError::EmptyTemplate);
        }
        let pow = &self.pow;
        let batch = self.batch_size as u64;
        // Indexed parallel collect keeps nonce order.
        self.pool.install(|| {
            (0..batch)
                .into_par_iter()
                .map(|i| -> Result<HashResult, DeviceError> {
                    let nonce = start_nonce.wrapping_add(i);
                    let digest = pow.digest(&template.candidate(nonce))?;
                    Ok(HashResult { nonce, digest })
                })
                .collect()
        })
    }
}
