//! Per-stage benchmarks on the CPU backend: pad, plan, multiply, reduce.

#[path = "stages_common.rs"]
mod stages_common;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stages_common::{cap, get_test_pair, SIZES_ALL};

use gpudot::backend::{Access, Backend};
use gpudot::cpu::{CpuBackend, HostBuffer};
use gpudot::multiply::multiply;
use gpudot::padding::{pad, padded_len};
use gpudot::reduce::{plan_passes, ReductionScheduler};

const GROUP_SIZES: &[usize] = &[64, 256, 1024];

fn bench_pad(c: &mut Criterion) {
    let mut group = c.benchmark_group("pad");
    cap(&mut group);
    for &size in SIZES_ALL {
        // One short of a multiple so every call appends.
        let (a, _) = get_test_pair::<f32>(size - 1);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("f32", size), &a, |b, a| {
            b.iter(|| pad(&a[..], 256));
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for &g in GROUP_SIZES {
        group.bench_with_input(BenchmarkId::new("passes", g), &g, |b, &g| {
            b.iter(|| plan_passes(1_000_000_007, g).unwrap());
        });
    }
    group.finish();
}

fn bench_multiply(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiply");
    cap(&mut group);
    let cpu = CpuBackend::new();
    for &size in SIZES_ALL {
        let (a, b) = get_test_pair::<f32>(size);
        group.throughput(Throughput::Elements(size as u64));
        let len = padded_len(size, 256);
        let mut a_buf: HostBuffer<f32> = cpu.alloc(len, Access::ReadOnly).unwrap();
        let mut b_buf: HostBuffer<f32> = cpu.alloc(len, Access::ReadOnly).unwrap();
        cpu.write(&mut a_buf, 0, &pad(&a[..], 256)).unwrap();
        cpu.write(&mut b_buf, 0, &pad(&b[..], 256)).unwrap();
        group.bench_function(BenchmarkId::new("cpu", size), |bench| {
            bench.iter(|| multiply::<f32, _>(&cpu, &a_buf, &b_buf, len, 256).unwrap());
        });
    }
    group.finish();
}

fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");
    cap(&mut group);
    let cpu = CpuBackend::new();
    for &size in SIZES_ALL {
        let (a, _) = get_test_pair::<f32>(size);
        group.throughput(Throughput::Elements(size as u64));
        for &g in GROUP_SIZES {
            let id = BenchmarkId::new(format!("g{g}"), size);
            group.bench_with_input(id, &a, |bench, a| {
                bench.iter(|| {
                    let mut buf: HostBuffer<f32> =
                        cpu.alloc(padded_len(a.len(), g), Access::ReadWrite).unwrap();
                    cpu.write(&mut buf, 0, &a[..]).unwrap();
                    ReductionScheduler::new(&cpu, g)
                        .reduce::<f32>(buf, a.len())
                        .unwrap()
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_pad, bench_plan, bench_multiply, bench_reduce);
criterion_main!(benches);
