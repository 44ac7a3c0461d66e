//! WebGPU (wgpu) backend for gpudot.
//!
//! Runs the multiply and reduce kernels from `kernels/dot.wgsl` through the
//! cross-platform wgpu library, which supports Vulkan, Metal, DX12, and
//! WebGPU backends.
//!
//! # Feature Gate
//!
//! This module is only available when compiled with the `webgpu` feature:
//! ```bash
//! cargo build --features webgpu
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "webgpu")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use gpudot::pipeline::{DotConfig, DotEngine};
//! use gpudot::webgpu::WebGpuEngine;
//!
//! let gpu = WebGpuEngine::new()?;
//! println!("Using device: {}", gpu.device_name());
//!
//! let a = vec![1.0f32; 1 << 20];
//! let outcome = DotEngine::new(&gpu, DotConfig::default()).run(&a, &a)?;
//! println!("{} ({})", outcome.value, outcome.verdict);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::backend::{Access, Backend, BackendError, LaunchArgs, LaunchRanges, Operation};
use crate::element::{Element, ElementKind};


/// Embedded WGSL kernel source with `{{ELEM}}` / `{{GROUP_SIZE}}` placeholders.
const DOT_KERNEL_SOURCE: &str = include_str!("../../kernels/dot.wgsl");

/// Every supported element type is 4 bytes wide.
const ELEM_BYTES: u64 = 4;

/// Kernel uniform block, matching `Params` in dot.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    n: u32,
    dispatch_width: u32,
    _pad: [u32; 2],
}

/// Information about a discovered WebGPU adapter.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Human-readable adapter name.
    pub name: String,
    /// Backend API (Vulkan, Metal, ...).
    pub backend: String,
    /// Whether this is a GPU (discrete or integrated).
    pub is_gpu: bool,
    /// Maximum workgroup size along x.
    pub max_work_group_size: usize,
}

/// Probe all available WebGPU adapters without creating an engine.
pub fn probe_devices() -> Vec<DeviceInfo> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .map(|adapter| {
            let info = adapter.get_info();
            let limits = adapter.limits();
            DeviceInfo {
                name: info.name.clone(),
                backend: format!("{:?}", info.backend),
                is_gpu: matches!(
                    info.device_type,
                    wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu
                ),
                max_work_group_size: limits.max_compute_workgroup_size_x as usize,
            }
        })
        .collect()
}

/// Return the number of available WebGPU adapters.
pub fn device_count() -> usize {
    probe_devices().len()
}

/// Compiled pipelines for one (element type, group size) pair.
struct DotPipelines {
    multiply: wgpu::ComputePipeline,
    reduce: wgpu::ComputePipeline,
}

/// Device-resident vector.
#[derive(Debug)]
pub struct GpuBuffer {
    buf: wgpu::Buffer,
    len: usize,
}

impl GpuBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// WebGPU compute engine.
///
/// Owns the wgpu device and queue plus a cache of compiled pipelines.
/// Create one engine and reuse it across runs; pipelines are compiled on
/// first use for each element type and group size.
pub struct WebGpuEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: Mutex<HashMap<(ElementKind, usize), Arc<DotPipelines>>>,
    /// Device name for diagnostics.
    device_name: String,
    /// Largest usable workgroup size along x.
    max_work_group_size: usize,
    /// Maximum workgroups per dispatch dimension (typically 65535).
    max_workgroups_per_dim: u32,
    /// Maximum storage buffer binding size in bytes.
    max_buffer_size: u64,
    /// Whether the selected adapter is a software/CPU implementation.
    is_cpu: bool,
}

impl std::fmt::Debug for WebGpuEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebGpuEngine")
            .field("device_name", &self.device_name)
            .field("max_work_group_size", &self.max_work_group_size)
            .finish_non_exhaustive()
    }
}

impl WebGpuEngine {
    /// Create a new engine, selecting the best available GPU.
    pub fn new() -> Result<Self, BackendError> {
        Self::with_device_preference(true)
    }

    /// Create a new engine with explicit GPU preference.
    ///
    /// With `prefer_gpu`, software adapters are rejected; otherwise any
    /// adapter is accepted.
    pub fn with_device_preference(prefer_gpu: bool) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = if prefer_gpu {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::None
        };

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|e| BackendError::Unsupported(format!("no WebGPU adapter: {e}")))?;

        let info = adapter.get_info();
        let is_cpu = matches!(info.device_type, wgpu::DeviceType::Cpu);
        if prefer_gpu && is_cpu {
            return Err(BackendError::Unsupported(format!(
                "only a software adapter is available ({})",
                info.name
            )));
        }

        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("gpudot-webgpu"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| BackendError::Unsupported(format!("device request failed: {e}")))?;

        let max_work_group_size = (limits.max_compute_workgroup_size_x)
            .min(limits.max_compute_invocations_per_workgroup)
            as usize;

        info!(device = %info.name, backend = ?info.backend, "webgpu engine ready");

        Ok(WebGpuEngine {
            device,
            queue,
            pipelines: Mutex::new(HashMap::new()),
            device_name: info.name,
            max_work_group_size,
            max_workgroups_per_dim: limits.max_compute_workgroups_per_dimension,
            max_buffer_size: u64::from(limits.max_storage_buffer_binding_size),
            is_cpu,
        })
    }

    /// Return the name of the selected device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Return the maximum work-group size for the device.
    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    /// Check if the selected adapter is a CPU (software) implementation.
    pub fn is_cpu_device(&self) -> bool {
        self.is_cpu
    }

    /// Block the host until all submitted GPU work completes.
    fn poll_wait(&self) -> Result<(), BackendError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| BackendError::Sync(e.to_string()))
    }

    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Compute 2D tiling dimensions for a given workgroup count.
    fn tile_workgroups(&self, workgroups: u32) -> Result<(u32, u32), BackendError> {
        let max = self.max_workgroups_per_dim;
        if workgroups <= max {
            Ok((workgroups, 1))
        } else {
            let wy = workgroups.div_ceil(max);
            if wy > max {
                return Err(BackendError::Launch(format!(
                    "{workgroups} workgroups exceed the 2D dispatch limit"
                )));
            }
            Ok((max, wy))
        }
    }

    /// Compile (or fetch from cache) the pipelines for `kind` and `group_size`.
    fn pipelines(&self, kind: ElementKind, group_size: usize) -> Arc<DotPipelines> {
        let mut cache = self
            .pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry((kind, group_size))
            .or_insert_with(|| {
                let t0 = std::time::Instant::now();
                let source = DOT_KERNEL_SOURCE
                    .replace("{{ELEM}}", kind.wgsl_type())
                    .replace("{{GROUP_SIZE}}", &group_size.to_string());
                let module = self
                    .device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some("dot"),
                        source: wgpu::ShaderSource::Wgsl(source.into()),
                    });
                let make = |label, entry| {
                    self.device
                        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                            label: Some(label),
                            layout: None,
                            module: &module,
                            entry_point: Some(entry),
                            compilation_options: Default::default(),
                            cache: None,
                        })
                };
                let group = DotPipelines {
                    multiply: make("dot_multiply", "multiply"),
                    reduce: make("dot_reduce", "reduce"),
                };
                let ms = t0.elapsed().as_secs_f64() * 1000.0;
                debug!(elem = %kind, group_size, "compiled dot.wgsl in {ms:.3} ms");
                Arc::new(group)
            })
            .clone()
    }
}

impl<T: Element> Backend<T> for WebGpuEngine {
    type Buffer = GpuBuffer;

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

    fn alloc(&self, len: usize, _access: Access) -> Result<GpuBuffer, BackendError> {
        let size = len as u64 * ELEM_BYTES;
        if len == 0 || size > self.max_buffer_size {
            return Err(BackendError::Allocation(format!(
                "{size} bytes (limit {})",
                self.max_buffer_size
            )));
        }
        // Storage buffers are bound read_write by the reduce kernel's output,
        // so every buffer carries the same usage regardless of `access`.
        let buf = self.create_buffer(
            "dot_vec",
            size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );
        Ok(GpuBuffer { buf, len })
    }

    fn write(&self, buf: &mut GpuBuffer, offset: usize, data: &[T]) -> Result<(), BackendError> {
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
        self.queue.write_buffer(
            &buf.buf,
            offset as u64 * ELEM_BYTES,
            bytemuck::cast_slice(data),
        );
        self.queue.submit(std::iter::empty());
        self.poll_wait()
    }

    fn read(&self, buf: &GpuBuffer, offset: usize, len: usize) -> Result<Vec<T>, BackendError> {
        if offset + len > buf.len {
            return Err(BackendError::Transfer(format!(
                "read of {len} elements at {offset} past buffer end {}",
                buf.len
            )));
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        let size = len as u64 * ELEM_BYTES;
        let staging = self.create_buffer(
            "staging",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_buffer"),
            });
        encoder.copy_buffer_to_buffer(&buf.buf, offset as u64 * ELEM_BYTES, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.poll_wait()?;
        rx.recv()
            .map_err(|e| BackendError::Transfer(e.to_string()))?
            .map_err(|e| BackendError::Transfer(e.to_string()))?;

        // The mapped range carries no alignment guarantee for T.
        let data = bytemuck::pod_collect_to_vec::<u8, T>(&slice.get_mapped_range());
        staging.unmap();
        Ok(data)
    }

    fn launch(
        &self,
        op: Operation,
        ranges: LaunchRanges,
        args: LaunchArgs<'_, GpuBuffer>,
    ) -> Result<(), BackendError> {
        <Self as Backend<T>>::check_group_size(self, ranges.group)?;
        if ranges.global % ranges.group != 0 {
            return Err(BackendError::Launch(format!(
                "global range {} is not a multiple of group range {}",
                ranges.global, ranges.group
            )));
        }
        let pipelines = self.pipelines(T::KIND, ranges.group);
        let workgroups = u32::try_from(ranges.groups())
            .map_err(|_| BackendError::Launch("too many workgroups".into()))?;
        let (wx, wy) = self.tile_workgroups(workgroups)?;
        let n = args
            .scalars
            .first()
            .copied()
            .ok_or_else(|| BackendError::Launch("missing length scalar".into()))?;
        let params = Params {
            n,
            dispatch_width: wx * ranges.group as u32,
            _pad: [0; 2],
        };
        let params_buf = {
            use wgpu::util::DeviceExt;
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("dot_params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        };

        let (pipeline, entries): (&wgpu::ComputePipeline, Vec<wgpu::BindGroupEntry<'_>>) =
            match (op, args.inputs) {
                (Operation::Multiply, [lhs, rhs]) => (
                    &pipelines.multiply,
                    vec![
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: lhs.buf.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: rhs.buf.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: args.output.buf.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: params_buf.as_entire_binding(),
                        },
                    ],
                ),
                (Operation::Reduce, [src]) => (
                    &pipelines.reduce,
                    vec![
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: src.buf.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: args.output.buf.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: params_buf.as_entire_binding(),
                        },
                    ],
                ),
                (op, inputs) => {
                    return Err(BackendError::Launch(format!(
                        "{} does not take {} inputs",
                        op.name(),
                        inputs.len()
                    )))
                }
            };

        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(op.name()),
            layout: &layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(op.name()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(op.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wx, wy, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        debug!(op = op.name(), workgroups, wx, wy, "dispatched");
        Ok(())
    }

    fn barrier(&self) -> Result<(), BackendError> {
        self.poll_wait()
    }
}
