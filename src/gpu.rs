use ocl::flags::{DeviceType, MemFlags, DEVICE_TYPE_CPU, DEVICE_TYPE_GPU};
use ocl::{Buffer, Context, Device, Kernel, Platform, Program, Queue};
use tracing::{debug, info};

use crate::backend::HashBackend;
use crate::cl_kernels::{SCRYPT, SCRYPT_ENTRY, SCRYPT_SCRATCH_WORDS, XOR_FOLD, XOR_FOLD_ENTRY};
use crate::error_handling::DeviceError;
use crate::types::{HashAlgorithm, HashResult, InputTemplate, DIGEST_LEN, MAX_TEMPLATE_LEN};

/// OpenCL device running one hash kernel over one batch per dispatch.
///
/// Every field is an owning ocl handle released on drop; fields drop in
/// declaration order, which is the reverse of acquisition.
pub struct OclBackend {
    kernel: Kernel,
    output: Buffer<u8>,
    _scratch: Option<Buffer<u32>>,
    input: Buffer<u8>,
    _program: Program,
    queue: Queue,
    _context: Context,
    name: String,
    batch_size: usize,
}

fn first_device(device_type: DeviceType) -> Option<(Platform, Device)> {
    Platform::list().into_iter().find_map(|platform| {
        Device::list(&platform, Some(device_type))
            .ok()
            .and_then(|devices| devices.into_iter().next())
            .map(|device| (platform, device))
    })
}

impl OclBackend {
    pub fn open(algorithm: HashAlgorithm, batch_size: usize) -> Result<Self, DeviceError> {
        let (src, entry) = match algorithm {
            HashAlgorithm::Scrypt => (SCRYPT, SCRYPT_ENTRY),
            HashAlgorithm::XorFold => (XOR_FOLD, XOR_FOLD_ENTRY),
        };

        // GPU on any platform first, then an OpenCL CPU device
        let (platform, device) = first_device(DEVICE_TYPE_GPU)
            .or_else(|| first_device(DEVICE_TYPE_CPU))
            .ok_or_else(|| DeviceError::Unavailable("no OpenCL GPU or CPU device".into()))?;
        let name = device.name().unwrap_or_else(|_| "unknown OpenCL device".into());
        debug!(device = %name, "Selected OpenCL device");

        let context = Context::builder()
            .platform(platform)
            .devices(device.clone())
            .build()
            .map_err(|e| DeviceError::Context(e.to_string()))?;
        let queue = Queue::new(&context, device.clone(), None)
            .map_err(|e| DeviceError::Context(e.to_string()))?;
        let program = Program::builder()
            .src(src)
            .devices(device)
            .build(&context)
            .map_err(|e| DeviceError::Program(e.to_string()))?;

        let input: Buffer<u8> = Buffer::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().read_only())
            .len(MAX_TEMPLATE_LEN)
            .build()?;
        let output: Buffer<u8> = Buffer::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().write_only())
            .len(batch_size * DIGEST_LEN)
            .build()?;

        // scrypt keeps a ROMix table per work-item in global memory
        let scratch: Option<Buffer<u32>> = match algorithm {
            HashAlgorithm::Scrypt => Some(
                Buffer::builder()
                    .queue(queue.clone())
                    .flags(MemFlags::new().read_write())
                    .len(batch_size * SCRYPT_SCRATCH_WORDS)
                    .build()?,
            ),
            HashAlgorithm::XorFold => None,
        };

        let kernel = {
            let mut builder = Kernel::builder();
            builder
                .program(&program)
                .name(entry)
                .queue(queue.clone())
                .global_work_size(batch_size)
                .arg(&input)
                .arg_named("input_len", &0u32)
                .arg_named("start_nonce", &0u64);
            if let Some(scratch) = &scratch {
                builder.arg(scratch);
            }
            builder.arg(&output);
            builder.build().map_err(|e| DeviceError::Program(e.to_string()))?
        };

        info!(device = %name, %algorithm, batch_size, "OpenCL backend ready");
        Ok(Self {
            kernel,
            output,
            _scratch: scratch,
            input,
            _program: program,
            queue,
            _context: context,
            name: format!("opencl ({name}, {algorithm})"),
            batch_size,
        })
    }
}

impl HashBackend for OclBackend {
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
        if template.len() > MAX_TEMPLATE_LEN {
            return Err(DeviceError::TemplateTooLarge {
                len: template.len(),
                capacity: MAX_TEMPLATE_LEN,
            });
        }

        self.input.write(template.as_bytes()).enq()?;
        self.kernel.set_arg("input_len", &(template.len() as u32))?;
        self.kernel.set_arg("start_nonce", &start_nonce)?;

        unsafe {
            self.kernel.enq()?;
        }
        self.queue.finish()?;

        let mut raw = vec![0u8; self.batch_size * DIGEST_LEN];
        self.output.read(&mut raw).enq()?;

        Ok(raw
            .chunks_exact(DIGEST_LEN)
            .enumerate()
            .map(|(i, chunk)| {
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(chunk);
                HashResult { nonce: start_nonce.wrapping_add(i as u64), digest }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{xor_fold, PowHash, ScryptHash};

    // Needs an OpenCL runtime; skipped quietly when none is installed.
    #[test]
    fn kernel_matches_host_xor_fold() {
        let Ok(mut backend) = OclBackend::open(HashAlgorithm::XorFold, 64) else {
            return;
        };
        let tpl = InputTemplate::from_bytes(b"local_slotLocalWallet123local_poh".to_vec());
        let out = backend.compute_batch(&tpl, u64::from(u32::MAX) - 3).unwrap();
        assert_eq!(out.len(), 64);
        for r in &out {
            assert_eq!(r.digest, xor_fold(&tpl.candidate(r.nonce)));
        }
    }

    #[test]
    fn kernel_matches_host_scrypt() {
        let Ok(mut backend) = OclBackend::open(HashAlgorithm::Scrypt, 4) else {
            return;
        };
        let host = ScryptHash::new().unwrap();
        // one key shorter than an HMAC block, one that gets hashed first
        let short = InputTemplate::from_bytes(b"local_slotW1local_poh".to_vec());
        let long = InputTemplate::from_bytes(vec![b'a'; 120]);
        for tpl in [short, long] {
            let out = backend.compute_batch(&tpl, 7).unwrap();
            assert_eq!(out.len(), 4);
            for r in &out {
                assert_eq!(r.digest, host.digest(&tpl.candidate(r.nonce)).unwrap());
            }
        }
    }

    #[test]
    fn oversized_template_is_refused_before_dispatch() {
        let Ok(mut backend) = OclBackend::open(HashAlgorithm::XorFold, 4) else {
            return;
        };
        let tpl = InputTemplate::from_bytes(vec![1u8; MAX_TEMPLATE_LEN + 1]);
        assert!(matches!(
            backend.compute_batch(&tpl, 0),
            Err(DeviceError::TemplateTooLarge { .. })
        ));
    }
}
