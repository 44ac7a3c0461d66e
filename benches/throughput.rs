//! End-to-end dot-product throughput per backend.
//!
//! Each iteration includes padding, upload, multiply, every reduction pass
//! and host verification. Device backends are only measured when their
//! feature is enabled and a device is present.
//!
//! All groups enforce warm_up_time(2s) + measurement_time(5s) + sample_size(10)
//! to keep total runtime bounded.

#[path = "stages_common.rs"]
mod stages_common;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stages_common::{cap, get_test_pair, SIZES_ALL};

use gpudot::cpu::CpuBackend;
use gpudot::pipeline::{DotConfig, DotEngine};

fn bench_dot(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot");
    cap(&mut group);

    let cpu = CpuBackend::new();
    #[cfg(feature = "webgpu")]
    let webgpu = gpudot::webgpu::WebGpuEngine::new().ok();
    #[cfg(feature = "opencl")]
    let opencl = gpudot::opencl::OpenClEngine::new().ok();

    for &size in SIZES_ALL {
        let (a, b) = get_test_pair::<f32>(size);
        group.throughput(Throughput::Bytes((2 * size * std::mem::size_of::<f32>()) as u64));

        let engine = DotEngine::new(&cpu, DotConfig::default());
        group.bench_function(BenchmarkId::new("cpu", size), |bench| {
            bench.iter(|| engine.run(&a[..], &b[..]).unwrap());
        });

        #[cfg(feature = "webgpu")]
        if let Some(ref webgpu) = webgpu {
            let engine = DotEngine::new(webgpu, DotConfig::default());
            group.bench_function(BenchmarkId::new("webgpu", size), |bench| {
                bench.iter(|| engine.run(&a[..], &b[..]).unwrap());
            });
        }

        #[cfg(feature = "opencl")]
        if let Some(ref opencl) = opencl {
            let engine = DotEngine::new(opencl, DotConfig::default());
            group.bench_function(BenchmarkId::new("opencl", size), |bench| {
                bench.iter(|| engine.run(&a[..], &b[..]).unwrap());
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_dot);
criterion_main!(benches);
