//! OpenCL backend for gpudot.
//!
//! Runs the multiply and reduce kernels from `kernels/dot.cl` on an OpenCL
//! device. Programs are built per element type and group size with
//! `-DELEM=... -DGROUP_SIZE=...`; build failures carry the driver's build
//! log in [`BackendError::Compile`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌─────────────┐
//! │  Host (CPU)  │────▶│    OpenCL Device     │────▶│  Host (CPU) │
//! │  A, B padded │     │ multiply, then       │     │  scalar +   │
//! │              │     │ reduce pass per G^k  │     │  verify     │
//! └──────────────┘     └──────────────────────┘     └─────────────┘
//! ```
//!
//! # Feature Gate
//!
//! This module is only available when compiled with the `opencl` feature:
//! ```bash
//! cargo build --features opencl
//! ```

use std::collections::HashMap;
use std::ptr;
use std::sync::{Arc, Mutex};

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{get_all_devices, Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_GPU};
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE, CL_MEM_WRITE_ONLY};
use opencl3::program::Program;
use opencl3::types::{cl_device_type, cl_mem_flags, CL_BLOCKING};
use tracing::{debug, info};

use crate::backend::{Access, Backend, BackendError, LaunchArgs, LaunchRanges, Operation};
use crate::element::{Element, ElementKind};


/// Embedded OpenCL kernel source: multiply and group reduce.
const DOT_KERNEL_SOURCE: &str = include_str!("../../kernels/dot.cl");

/// Information about a discovered OpenCL device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Human-readable device name (e.g. "NVIDIA GeForce RTX 3080").
    pub name: String,
    /// Device vendor string.
    pub vendor: String,
    /// Whether this is a GPU device (vs CPU or accelerator).
    pub is_gpu: bool,
    /// Maximum work-group size supported by the device.
    pub max_work_group_size: usize,
    /// Global memory size in bytes.
    pub global_mem_size: u64,
}

/// Probe all available OpenCL devices without creating an engine.
///
/// Returns an empty vec if no OpenCL runtime is installed or no
/// devices are found (never errors).
pub fn probe_devices() -> Vec<DeviceInfo> {
    let device_ids = match get_all_devices(CL_DEVICE_TYPE_ALL) {
        Ok(ids) => ids,
        Err(_) => return Vec::new(),
    };

    device_ids
        .into_iter()
        .map(|id| {
            let dev = Device::new(id);
            let dev_type: cl_device_type = dev.dev_type().unwrap_or(0);
            DeviceInfo {
                name: dev.name().unwrap_or_default().trim().to_string(),
                vendor: dev.vendor().unwrap_or_default().trim().to_string(),
                is_gpu: (dev_type & CL_DEVICE_TYPE_GPU) != 0,
                max_work_group_size: dev.max_work_group_size().unwrap_or(1),
                global_mem_size: dev.global_mem_size().unwrap_or(0),
            }
        })
        .collect()
}

/// Return the number of available OpenCL devices.
///
/// Returns 0 if OpenCL is not available.
pub fn device_count() -> usize {
    get_all_devices(CL_DEVICE_TYPE_ALL)
        .map(|ids| ids.len())
        .unwrap_or(0)
}

/// Compiled kernels for one (element type, group size) pair.
struct DotKernels {
    multiply: Kernel,
    reduce: Kernel,
}

/// Device-resident vector.
pub struct ClBuffer<T> {
    buf: Buffer<T>,
    len: usize,
}

impl<T> ClBuffer<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// OpenCL compute engine.
///
/// Owns the device, context, command queue, and a cache of built kernels.
/// Create one engine and reuse it across runs.
///
/// Note: `Debug` is implemented manually because the OpenCL handle
/// types from `opencl3` don't implement `Debug`.
pub struct OpenClEngine {
    _device: Device,
    context: Context,
    queue: CommandQueue,
    kernels: Mutex<HashMap<(ElementKind, usize), Arc<DotKernels>>>,
    /// Device name for diagnostics.
    device_name: String,
    /// Maximum work-group size.
    max_work_group_size: usize,
    /// Whether the selected device is a CPU (vs GPU/accelerator).
    is_cpu: bool,
}

// SAFETY: OpenCL 1.2+ guarantees thread safety for context, command queue,
// kernel and memory objects. Kernel argument setting is serialized by the
// `kernels` mutex being held for the whole launch.
unsafe impl Send for OpenClEngine {}
unsafe impl Sync for OpenClEngine {}

impl std::fmt::Debug for OpenClEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClEngine")
            .field("device_name", &self.device_name)
            .field("max_work_group_size", &self.max_work_group_size)
            .finish_non_exhaustive()
    }
}

impl OpenClEngine {
    /// Create a new engine, selecting the best available GPU device.
    ///
    /// Prefers GPU devices over CPU/accelerator. Falls back to the first
    /// available device if no GPU is found.
    pub fn new() -> Result<Self, BackendError> {
        Self::with_device_preference(true)
    }

    /// Create a new engine with explicit GPU preference.
    pub fn with_device_preference(prefer_gpu: bool) -> Result<Self, BackendError> {
        let all_ids = get_all_devices(CL_DEVICE_TYPE_ALL)
            .map_err(|e| BackendError::Unsupported(format!("no OpenCL runtime: {e}")))?;
        if all_ids.is_empty() {
            return Err(BackendError::Unsupported("no OpenCL devices".into()));
        }

        // Among GPUs, pick the one with the most global memory (discrete
        // before integrated). Try each candidate in order since some drivers
        // fail context creation for listed devices.
        let gpu_ids = if prefer_gpu {
            let mut ids = get_all_devices(CL_DEVICE_TYPE_GPU).unwrap_or_default();
            ids.sort_by_key(|id| std::cmp::Reverse(Device::new(*id).global_mem_size().unwrap_or(0)));
            ids
        } else {
            Vec::new()
        };

        let mut selected = None;
        for id in gpu_ids.iter().chain(all_ids.iter()).copied() {
            let dev = Device::new(id);
            let Ok(ctx) = Context::from_device(&dev) else {
                continue;
            };
            // OpenCL 1.2 API; macOS has no 2.0 queue properties.
            #[allow(deprecated)]
            let Ok(queue) = CommandQueue::create_default(&ctx, 0) else {
                continue;
            };
            selected = Some((dev, ctx, queue));
            break;
        }
        let (device, context, queue) = selected
            .ok_or_else(|| BackendError::Unsupported("no OpenCL device accepted a context".into()))?;

        let device_name = device.name().unwrap_or_default().trim().to_string();
        let max_work_group_size = device.max_work_group_size().unwrap_or(1);
        let dev_type: cl_device_type = device.dev_type().unwrap_or(0);
        let is_cpu = (dev_type & CL_DEVICE_TYPE_GPU) == 0;

        info!(device = %device_name, max_work_group_size, "opencl engine ready");

        Ok(OpenClEngine {
            _device: device,
            context,
            queue,
            kernels: Mutex::new(HashMap::new()),
            device_name,
            max_work_group_size,
            is_cpu,
        })
    }

    /// Return the name of the selected compute device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Return the maximum work-group size for the device.
    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    /// Check if the selected device is a CPU (not a GPU or accelerator).
    pub fn is_cpu_device(&self) -> bool {
        self.is_cpu
    }

    /// Build options defining the element type and group size.
    fn build_options(kind: ElementKind, group_size: usize) -> String {
        let mut flags = format!("-DELEM={} -DGROUP_SIZE={group_size}", kind.opencl_type());
        if kind == ElementKind::I32 {
            flags.push_str(" -DELEM_IS_INT");
        }
        flags
    }

    fn build_kernels(&self, kind: ElementKind, group_size: usize) -> Result<DotKernels, BackendError> {
        let t0 = std::time::Instant::now();
        let options = Self::build_options(kind, group_size);
        let program = Program::create_and_build_from_source(&self.context, DOT_KERNEL_SOURCE, &options)
            .map_err(|log| BackendError::Compile {
                kernel: format!("dot.cl ({options})"),
                log,
            })?;
        let kernel = |name: &str| {
            Kernel::create(&program, name).map_err(|e| BackendError::Compile {
                kernel: name.to_string(),
                log: e.to_string(),
            })
        };
        let kernels = DotKernels {
            multiply: kernel("multiply")?,
            reduce: kernel("reduce")?,
        };
        let ms = t0.elapsed().as_secs_f64() * 1000.0;
        debug!(elem = %kind, group_size, "built dot.cl in {ms:.3} ms");
        Ok(kernels)
    }
}

fn mem_flags(access: Access) -> cl_mem_flags {
    match access {
        Access::ReadOnly => CL_MEM_READ_ONLY,
        Access::WriteOnly => CL_MEM_WRITE_ONLY,
        Access::ReadWrite => CL_MEM_READ_WRITE,
    }
}

impl<T: Element> Backend<T> for OpenClEngine {
    type Buffer = ClBuffer<T>;

    fn name(&self) -> &str {
        &self.device_name
    }

    fn max_group_size(&self) -> usize {
        self.max_work_group_size
    }

    /// The tree combine halves its stride, so groups must be powers of two.
    fn check_group_size(&self, group_size: usize) -> Result<(), BackendError> {
        if !group_size.is_power_of_two() || group_size > self.max_work_group_size {
            return Err(BackendError::Unsupported(format!(
                "group size {group_size} must be a power of two no larger than {}",
                self.max_work_group_size
            )));
        }
        Ok(())
    }

    fn alloc(&self, len: usize, access: Access) -> Result<ClBuffer<T>, BackendError> {
        if len == 0 {
            return Err(BackendError::Allocation("zero-length buffer".into()));
        }
        let buf = unsafe {
            Buffer::<T>::create(&self.context, mem_flags(access), len, ptr::null_mut())
                .map_err(|e| BackendError::Allocation(e.to_string()))?
        };
        Ok(ClBuffer { buf, len })
    }

    fn write(&self, buf: &mut ClBuffer<T>, offset: usize, data: &[T]) -> Result<(), BackendError> {
        if offset + data.len() > buf.len {
            return Err(BackendError::Transfer(format!(
                "write of {} elements at {offset} past buffer end {}",
                data.len(),
                buf.len
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        let event = unsafe {
            self.queue
                .enqueue_write_buffer(
                    &mut buf.buf,
                    CL_BLOCKING,
                    offset * std::mem::size_of::<T>(),
                    data,
                    &[],
                )
                .map_err(|e| BackendError::Transfer(e.to_string()))?
        };
        event.wait().map_err(|e| BackendError::Transfer(e.to_string()))
    }

    fn read(&self, buf: &ClBuffer<T>, offset: usize, len: usize) -> Result<Vec<T>, BackendError> {
        if offset + len > buf.len {
            return Err(BackendError::Transfer(format!(
                "read of {len} elements at {offset} past buffer end {}",
                buf.len
            )));
        }
        let mut out = vec![T::zero(); len];
        if len == 0 {
            return Ok(out);
        }
        let event = unsafe {
            self.queue
                .enqueue_read_buffer(
                    &buf.buf,
                    CL_BLOCKING,
                    offset * std::mem::size_of::<T>(),
                    &mut out,
                    &[],
                )
                .map_err(|e| BackendError::Transfer(e.to_string()))?
        };
        event.wait().map_err(|e| BackendError::Transfer(e.to_string()))?;
        Ok(out)
    }

    fn launch(
        &self,
        op: Operation,
        ranges: LaunchRanges,
        args: LaunchArgs<'_, ClBuffer<T>>,
    ) -> Result<(), BackendError> {
        <Self as Backend<T>>::check_group_size(self, ranges.group)?;
        if ranges.global % ranges.group != 0 {
            return Err(BackendError::Launch(format!(
                "global range {} is not a multiple of group range {}",
                ranges.global, ranges.group
            )));
        }
        let n = args
            .scalars
            .first()
            .copied()
            .ok_or_else(|| BackendError::Launch("missing length scalar".into()))?;

        // Held for the whole launch: kernel arguments are shared state.
        let mut cache = self
            .kernels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let key = (T::KIND, ranges.group);
        if !cache.contains_key(&key) {
            let built = self.build_kernels(T::KIND, ranges.group)?;
            cache.insert(key, Arc::new(built));
        }
        let kernels = cache
            .get(&key)
            .cloned()
            .ok_or_else(|| BackendError::Launch("kernel cache miss".into()))?;

        let event = match (op, args.inputs) {
            (Operation::Multiply, [lhs, rhs]) => unsafe {
                ExecuteKernel::new(&kernels.multiply)
                    .set_arg(&lhs.buf)
                    .set_arg(&rhs.buf)
                    .set_arg(&args.output.buf)
                    .set_arg(&n)
                    .set_global_work_size(ranges.global)
                    .set_local_work_size(ranges.group)
                    .enqueue_nd_range(&self.queue)
            },
            (Operation::Reduce, [src]) => unsafe {
                ExecuteKernel::new(&kernels.reduce)
                    .set_arg(&src.buf)
                    .set_arg(&args.output.buf)
                    .set_arg_local_buffer(ranges.group * std::mem::size_of::<T>())
                    .set_arg(&n)
                    .set_global_work_size(ranges.global)
                    .set_local_work_size(ranges.group)
                    .enqueue_nd_range(&self.queue)
            },
            (op, inputs) => {
                return Err(BackendError::Launch(format!(
                    "{} does not take {} inputs",
                    op.name(),
                    inputs.len()
                )))
            }
        }
        .map_err(|e| BackendError::Launch(e.to_string()))?;
        drop(event);
        debug!(op = op.name(), groups = ranges.groups(), "enqueued");
        Ok(())
    }

    fn barrier(&self) -> Result<(), BackendError> {
        self.queue
            .finish()
            .map_err(|e| BackendError::Sync(e.to_string()))
    }
}
